//! Object storage access and download planning for raw vendor files

use crate::category::{Category, FILE_PREFIXES};
use crate::data::SourceFile;
use crate::error::{EtlError, Result};
use crate::types::{Lookback, ProcessingWindow, OUTPUT_DATE_FORMAT};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Source of raw files addressed by bucket key
pub trait ObjectStore {
    /// Copy the object at `key` to `dest`
    fn fetch(&self, key: &str, dest: &Path) -> Result<()>;

    /// Every key starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Store backed by a local directory laid out like the bucket
pub struct LocalMirrorStore {
    root: PathBuf,
}

impl LocalMirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for LocalMirrorStore {
    fn fetch(&self, key: &str, dest: &Path) -> Result<()> {
        let source = self.root.join(key);
        if !source.is_file() {
            return Err(EtlError::Download {
                key: key.to_string(),
                reason: "no such object".to_string(),
            });
        }
        let tmp = partial_path(dest);
        fs::copy(&source, &tmp)?;
        fs::rename(&tmp, dest)?;
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Only the folder part of the prefix needs walking
        let folder = prefix.rfind('/').map_or("", |i| &prefix[..i]);
        let base = self.root.join(folder);
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&base) {
            let entry = entry.map_err(|e| EtlError::Download {
                key: prefix.to_string(),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) && !key.ends_with(".part") {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("mirror {}", self.root.display())
    }
}

/// Store reached over HTTP at `{endpoint}/{bucket}/{key}`
#[cfg(feature = "remote")]
pub struct HttpObjectStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    bucket: String,
}

#[cfg(feature = "remote")]
impl HttpObjectStore {
    pub fn new(endpoint: &str, bucket: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| EtlError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[cfg(feature = "remote")]
impl ObjectStore for HttpObjectStore {
    fn fetch(&self, key: &str, dest: &Path) -> Result<()> {
        let download_error = |reason: String| EtlError::Download {
            key: key.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(self.url(key))
            .send()
            .map_err(|e| download_error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(download_error(format!("HTTP {}", status)));
        }

        let body = resp.bytes().map_err(|e| download_error(e.to_string()))?;
        let tmp = partial_path(dest);
        fs::write(&tmp, &body)?;
        fs::rename(&tmp, dest)?;
        Ok(())
    }

    /// Paged `ListObjectsV2` over the bucket
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let list_error = |reason: String| EtlError::Download {
            key: prefix.to_string(),
            reason,
        };

        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![("list-type", "2".to_string()), ("prefix", prefix.to_string())];
            if let Some(token) = &token {
                query.push(("continuation-token", token.clone()));
            }

            let resp = self
                .client
                .get(format!("{}/{}", self.endpoint, self.bucket))
                .query(&query)
                .send()
                .map_err(|e| list_error(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(list_error(format!("HTTP {}", status)));
            }

            let body = resp.text().map_err(|e| list_error(e.to_string()))?;
            let page = parse_list_page(&body)?;
            keys.extend(page.keys);

            match page.next_token {
                Some(next) if page.truncated => token = Some(next),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }
}

/// One page of a bucket listing
#[cfg(feature = "remote")]
#[derive(Debug, Default, PartialEq, Eq)]
struct ListPage {
    keys: Vec<String>,
    next_token: Option<String>,
    truncated: bool,
}

#[cfg(feature = "remote")]
fn parse_list_page(xml: &str) -> Result<ListPage> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = ListPage::default();
    let mut element: Option<Vec<u8>> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => element = Some(e.local_name().as_ref().to_vec()),
            Ok(Event::End(_)) => element = None,
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| EtlError::ParseError(format!("Invalid bucket listing text: {}", e)))?
                    .into_owned();
                match element.as_deref() {
                    Some(b"Key") => page.keys.push(text),
                    Some(b"NextContinuationToken") => page.next_token = Some(text),
                    Some(b"IsTruncated") => page.truncated = text.eq_ignore_ascii_case("true"),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(EtlError::ParseError(format!("Invalid bucket listing: {}", e))),
        }
        buf.clear();
    }

    Ok(page)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// `{file_prefix}_{YYYYMMDD}.csv`
pub fn file_name(file_prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", file_prefix, date.format(OUTPUT_DATE_FORMAT))
}

/// `{category_key_prefix}/{file_prefix}_{YYYYMMDD}.csv`
pub fn remote_key(category: Category, file_prefix: &str, date: NaiveDate) -> String {
    format!("{}/{}", category.key_prefix(), file_name(file_prefix, date))
}

/// One raw file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub file_prefix: &'static str,
    pub category: Category,
    pub lookback: Option<Lookback>,
    pub date: NaiveDate,
}

/// Every business day in the window times every file prefix
pub fn plan_downloads(window: &ProcessingWindow) -> Vec<DownloadRequest> {
    let dates = window.business_days();
    let mut plan = Vec::with_capacity(dates.len() * FILE_PREFIXES.len());

    for &date in &dates {
        for &(file_prefix, days, category) in FILE_PREFIXES {
            plan.push(DownloadRequest {
                file_prefix,
                category,
                lookback: days.map(Lookback),
                date,
            });
        }
    }

    plan
}

/// Fetches planned files into a flat staging directory
pub struct Downloader {
    store: Box<dyn ObjectStore>,
    staging_dir: PathBuf,
}

impl Downloader {
    pub fn new(store: Box<dyn ObjectStore>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Fetch one request. A staged file counts as downloaded; a failed fetch
    /// is logged and yields None.
    pub fn download(&self, request: &DownloadRequest, sequence: usize) -> Option<SourceFile> {
        let name = file_name(request.file_prefix, request.date);
        let path = self.staging_dir.join(&name);
        let source = SourceFile {
            path: path.clone(),
            category: request.category,
            lookback: request.lookback,
            date: request.date,
            sequence,
        };

        if path.exists() {
            log::info!("File already exists: {}", name);
            return Some(source);
        }

        let key = remote_key(request.category, request.file_prefix, request.date);
        match self.store.fetch(&key, &path) {
            Ok(()) => {
                log::info!("Finished downloading: {}", name);
                Some(source)
            }
            Err(e) => {
                log::warn!("Failed to download {}: {}", name, e);
                None
            }
        }
    }

    /// Fetch a whole plan, calling `on_progress` after each request
    pub fn download_all_with(
        &self,
        plan: &[DownloadRequest],
        mut on_progress: impl FnMut(&DownloadRequest),
    ) -> Result<Vec<SourceFile>> {
        fs::create_dir_all(&self.staging_dir)?;
        log::info!("Downloading {} files from {}", plan.len(), self.store.describe());

        let mut files = Vec::new();
        for request in plan {
            if let Some(file) = self.download(request, files.len()) {
                files.push(file);
            }
            on_progress(request);
        }

        log::info!("{} of {} planned files available", files.len(), plan.len());
        Ok(files)
    }

    pub fn download_all(&self, plan: &[DownloadRequest]) -> Result<Vec<SourceFile>> {
        self.download_all_with(plan, |_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::is_business_day;
    use tempfile::tempdir;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, m, d).unwrap()
    }

    #[test]
    fn test_remote_key() {
        assert_eq!(
            remote_key(Category::Sentiment, "sentimentDays7", date(2, 1)),
            "BSI/sentimentDays7_20210201.csv"
        );
        assert_eq!(
            remote_key(Category::ReportDiff10K, "differences_10k", date(2, 1)),
            "BLMCF_V2/differences_10k_20210201.csv"
        );
    }

    #[test]
    fn test_plan_covers_business_days() {
        // Mon 2021-02-01 .. Sun 2021-02-07: five business days
        let window = ProcessingWindow::new(date(2, 1), date(2, 7));
        let plan = plan_downloads(&window);

        assert_eq!(plan.len(), 5 * FILE_PREFIXES.len());
        assert!(plan.iter().all(|r| window.contains(r.date) && is_business_day(r.date)));
        assert_eq!(plan.iter().filter(|r| r.category.is_report()).count(), 5 * 4);
        assert_eq!(plan[0].date, date(2, 1));
    }

    #[test]
    fn test_download_copies_from_mirror() {
        let mirror = tempdir().unwrap();
        let staging = tempdir().unwrap();
        fs::create_dir_all(mirror.path().join("BLMCF_V2")).unwrap();
        fs::write(mirror.path().join("BLMCF_V2/metrics_all_20210201.csv"), "TICKER\n").unwrap();

        let downloader = Downloader::new(Box::new(LocalMirrorStore::new(mirror.path())), staging.path());
        let request = DownloadRequest {
            file_prefix: "metrics_all",
            category: Category::ReportAll,
            lookback: None,
            date: date(2, 1),
        };

        let file = downloader.download(&request, 3).unwrap();
        assert_eq!(file.date, date(2, 1));
        assert_eq!(file.sequence, 3);
        assert!(staging.path().join("metrics_all_20210201.csv").exists());
        assert!(!staging.path().join("metrics_all_20210201.csv.part").exists());

        let missing = DownloadRequest { date: date(2, 2), ..request };
        assert!(downloader.download(&missing, 4).is_none());
    }

    #[test]
    fn test_staged_file_skips_fetch() {
        let staging = tempdir().unwrap();
        fs::write(staging.path().join("mlAlpha2Days_20210201.csv"), "TICKER,ML_ALPHA\n").unwrap();

        // Empty mirror: only the staged copy can satisfy the request
        let mirror = tempdir().unwrap();
        let downloader = Downloader::new(Box::new(LocalMirrorStore::new(mirror.path())), staging.path());
        let plan = vec![
            DownloadRequest {
                file_prefix: "mlAlpha2Days",
                category: Category::Rankings,
                lookback: Some(Lookback(2)),
                date: date(2, 1),
            },
            DownloadRequest {
                file_prefix: "mlAlpha3Days",
                category: Category::Rankings,
                lookback: Some(Lookback(3)),
                date: date(2, 1),
            },
        ];

        let mut progress = 0;
        let files = downloader.download_all_with(&plan, |_| progress += 1).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].lookback, Some(Lookback(2)));
        assert_eq!(progress, 2);
    }

    #[test]
    fn test_mirror_lists_keys_under_prefix() {
        let mirror = tempdir().unwrap();
        fs::create_dir_all(mirror.path().join("BWPV/nested")).unwrap();
        fs::create_dir_all(mirror.path().join("BSI")).unwrap();
        fs::write(mirror.path().join("BWPV/metrics_20240503.csv"), "").unwrap();
        fs::write(mirror.path().join("BWPV/metrics_20240502.csv"), "").unwrap();
        fs::write(mirror.path().join("BWPV/readme.txt"), "").unwrap();
        fs::write(mirror.path().join("BWPV/nested/metrics_x.csv"), "").unwrap();
        fs::write(mirror.path().join("BSI/metrics_20240502.csv"), "").unwrap();

        let store = LocalMirrorStore::new(mirror.path());
        assert_eq!(
            store.list("BWPV/metrics_").unwrap(),
            vec!["BWPV/metrics_20240502.csv", "BWPV/metrics_20240503.csv"]
        );
        assert_eq!(store.list("BWPV/").unwrap().len(), 4);
        assert!(store.list("BLMECT/").unwrap().is_empty());
    }

    #[test]
    #[cfg(feature = "remote")]
    fn test_parse_list_page() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>brain</Name>
  <Prefix>BWPV/</Prefix>
  <IsTruncated>true</IsTruncated>
  <Contents><Key>BWPV/metrics_20240502.csv</Key><Size>10</Size></Contents>
  <Contents><Key>BWPV/metrics_20240503.csv</Key><Size>12</Size></Contents>
  <NextContinuationToken>abc&amp;123</NextContinuationToken>
</ListBucketResult>"#;

        let page = parse_list_page(xml).unwrap();
        assert_eq!(page.keys, vec!["BWPV/metrics_20240502.csv", "BWPV/metrics_20240503.csv"]);
        assert_eq!(page.next_token.as_deref(), Some("abc&123"));
        assert!(page.truncated);

        let last = parse_list_page("<ListBucketResult><IsTruncated>false</IsTruncated></ListBucketResult>").unwrap();
        assert!(last.keys.is_empty());
        assert!(!last.truncated);
    }
}
