//! Converters for the earnings-call (BLMECT) and Wikipedia
//! page-view (BWPV) feeds
//!
//! Both write `{output_root}/{dataset}/{ticker}.csv`, merging with whatever
//! the file already holds. A run converts one deployment date or replays
//! every date found in the store.

use crate::error::{EtlError, Result};
use crate::storage::ObjectStore;
use crate::types::{parse_compact_date, OUTPUT_DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use hashbrown::{HashMap, HashSet};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Minimum fields of a usable earnings-call metrics row
const METRICS_MIN_FIELDS: usize = 29;
/// Minimum fields of a usable earnings-call difference row
const DIFF_MIN_FIELDS: usize = 47;
/// Fields appended from a difference row, or blanks when there is none
const DIFF_OUTPUT_FIELDS: usize = 41;
/// Minimum fields of a usable page-view row
const PAGE_VIEW_MIN_FIELDS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConverterDataset {
    /// Language metrics on earnings calls
    Blmect,
    /// Wikipedia page views
    Bwpv,
}

impl ConverterDataset {
    /// Bucket folder of the raw files
    pub fn key_prefix(&self) -> &'static str {
        match self {
            ConverterDataset::Blmect => "BLMECT",
            ConverterDataset::Bwpv => "BWPV",
        }
    }

    pub fn output_dir(&self) -> &'static str {
        match self {
            ConverterDataset::Blmect => "blmect",
            ConverterDataset::Bwpv => "bwpv",
        }
    }

    /// File name prefixes whose keys carry a deployment date
    fn dated_prefixes(&self) -> &'static [&'static str] {
        match self {
            ConverterDataset::Blmect => &["differences_earnings_call_", "metrics_earnings_call_"],
            ConverterDataset::Bwpv => &["metrics_"],
        }
    }

    fn metrics_file(&self, date: NaiveDate) -> String {
        match self {
            ConverterDataset::Blmect => format!("metrics_earnings_call_{}.csv", date.format(OUTPUT_DATE_FORMAT)),
            ConverterDataset::Bwpv => format!("metrics_{}.csv", date.format(OUTPUT_DATE_FORMAT)),
        }
    }
}

impl fmt::Display for ConverterDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_prefix())
    }
}

impl FromStr for ConverterDataset {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blmect" => Ok(ConverterDataset::Blmect),
            "bwpv" => Ok(ConverterDataset::Bwpv),
            _ => Err(EtlError::UnknownCategory(s.to_string())),
        }
    }
}

/// Downloads one date's raw files and folds them into the per-ticker outputs
pub struct DataConverter<'a> {
    dataset: ConverterDataset,
    store: &'a dyn ObjectStore,
    staging_dir: PathBuf,
    output_root: PathBuf,
}

impl<'a> DataConverter<'a> {
    pub fn new(
        dataset: ConverterDataset,
        store: &'a dyn ObjectStore,
        staging_dir: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dataset,
            store,
            staging_dir: staging_dir.into(),
            output_root: output_root.into(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_root.join(self.dataset.output_dir())
    }

    /// Convert every file of `date`; returns the number of tickers written.
    /// A missing metrics file is an error.
    pub fn process_date(&self, date: NaiveDate) -> Result<usize> {
        let rows = match self.dataset {
            ConverterDataset::Blmect => self.earnings_call_rows(date)?,
            ConverterDataset::Bwpv => self.page_view_rows(date)?,
        };

        let output_dir = self.output_dir();
        fs::create_dir_all(&output_dir)?;
        for (ticker, lines) in &rows {
            save_content(&output_dir, ticker, lines)?;
        }

        log::info!(
            "[{}] Completed {}: {} symbols written",
            self.dataset,
            date.format(OUTPUT_DATE_FORMAT),
            rows.len()
        );
        Ok(rows.len())
    }

    /// Distinct deployment dates present in the store, ascending
    pub fn history_dates(&self) -> Result<Vec<NaiveDate>> {
        let folder = format!("{}/", self.dataset.key_prefix());
        let mut dates = BTreeSet::new();

        for key in self.store.list(&folder)? {
            let Some(name) = key.strip_prefix(&folder) else {
                continue;
            };
            let date = self
                .dataset
                .dated_prefixes()
                .iter()
                .find_map(|prefix| name.strip_prefix(prefix))
                .and_then(|rest| rest.get(..8))
                .and_then(parse_compact_date);
            match date {
                Some(date) => {
                    dates.insert(date);
                }
                None => log::trace!("[{}] Ignoring key {}", self.dataset, key),
            }
        }

        log::info!("[{}] Found {} unique deployment dates", self.dataset, dates.len());
        Ok(dates.into_iter().collect())
    }

    /// Convert every deployment date in the store, oldest first. Stops at the
    /// first date that fails; returns the number of dates converted.
    pub fn process_history(&self) -> Result<usize> {
        let dates = self.history_dates()?;
        for &date in &dates {
            self.process_date(date)?;
        }
        Ok(dates.len())
    }

    fn fetch(&self, file: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.staging_dir)?;
        let dest = self.staging_dir.join(format!("{}_{}", self.dataset.key_prefix(), file));
        if !dest.exists() {
            let key = format!("{}/{}", self.dataset.key_prefix(), file);
            self.store.fetch(&key, &dest)?;
        }
        Ok(dest)
    }

    fn earnings_call_rows(&self, date: NaiveDate) -> Result<BTreeMap<String, Vec<String>>> {
        let file_date = date.format(OUTPUT_DATE_FORMAT).to_string();

        let diff_file = format!("differences_earnings_call_{}.csv", file_date);
        let mut diff_by_ticker: HashMap<String, Vec<String>> = HashMap::new();
        match self.fetch(&diff_file) {
            Ok(path) => {
                for parts in read_delimited(&path)? {
                    if parts.len() < DIFF_MIN_FIELDS {
                        log::trace!("[{}] Diff row skipped, {} columns", self.dataset, parts.len());
                        continue;
                    }
                    let ticker = parts[1].trim().to_string();
                    if !ticker.is_empty() {
                        diff_by_ticker.insert(ticker, parts);
                    }
                }
            }
            Err(e) => log::debug!("[{}] Optional diff file missing for {}: {}", self.dataset, file_date, e),
        }

        let metrics_path = self.fetch(&self.dataset.metrics_file(date))?;
        let mut rows: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for parts in read_delimited(&metrics_path)? {
            if parts.len() < METRICS_MIN_FIELDS {
                log::trace!("[{}] Metrics row skipped, {} columns", self.dataset, parts.len());
                continue;
            }
            let ticker = parts[1].trim();
            if ticker.is_empty() {
                continue;
            }
            let line = earnings_call_row(&file_date, &parts, diff_by_ticker.get(ticker));
            rows.entry(ticker.to_string()).or_default().push(line);
        }
        Ok(rows)
    }

    fn page_view_rows(&self, date: NaiveDate) -> Result<BTreeMap<String, Vec<String>>> {
        let path = self.fetch(&self.dataset.metrics_file(date))?;
        let mut rows: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for parts in read_delimited(&path)? {
            if parts.len() < PAGE_VIEW_MIN_FIELDS {
                continue;
            }
            let ticker = parts[1].trim();
            if ticker.is_empty() {
                continue;
            }
            let Some(day) = parse_loose_date(&parts[2]) else {
                continue;
            };

            let mut fields = vec![day.format(OUTPUT_DATE_FORMAT).to_string()];
            fields.extend(parts[3..9].iter().cloned());
            rows.entry(ticker.to_string()).or_default().push(fields.join(","));
        }
        Ok(rows)
    }
}

/// Snapshot date, report date, quarter, year, 23 metrics, then the 41
/// difference fields or blanks
fn earnings_call_row(file_date: &str, metrics: &[String], diff: Option<&Vec<String>>) -> String {
    let mut fields = vec![
        file_date.to_string(),
        compact_date(&metrics[3]),
        metrics[4].clone(),
        metrics[5].clone(),
    ];
    fields.extend(metrics[6..METRICS_MIN_FIELDS].iter().cloned());

    match diff {
        Some(diff) => {
            fields.push(compact_date(&diff[6]));
            fields.extend(diff[7..DIFF_MIN_FIELDS].iter().cloned());
        }
        None => fields.extend(std::iter::repeat(String::new()).take(DIFF_OUTPUT_FIELDS)),
    }
    fields.join(",")
}

fn compact_date(raw: &str) -> String {
    parse_loose_date(raw)
        .map(|d| d.format(OUTPUT_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }
    None
}

/// Data rows of a header-led file whose delimiter is a tab or a comma
fn read_delimited(path: &Path) -> Result<Vec<Vec<String>>> {
    let content = fs::read_to_string(path)?;
    let mut lines = content.lines();
    let Some(header) = lines.next().filter(|h| !h.trim().is_empty()) else {
        return Err(EtlError::DataError(format!("Empty header line in {}", path.display())));
    };
    let delimiter = if header.contains('\t') { b'\t' } else { b',' };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Union `lines` with the existing file's lines, order by the leading date
/// and rewrite the file
fn save_content(dir: &Path, ticker: &str, lines: &[String]) -> Result<()> {
    let path = dir.join(format!("{}.csv", ticker.to_lowercase()));

    let mut unique: HashSet<String> = lines.iter().cloned().collect();
    if path.exists() {
        for line in fs::read_to_string(&path)?.lines() {
            if !line.trim().is_empty() {
                unique.insert(line.to_string());
            }
        }
    }

    let mut merged: Vec<String> = unique.into_iter().collect();
    merged.sort_by(|a, b| date_prefix(a).cmp(date_prefix(b)).then_with(|| a.cmp(b)));

    let mut content = merged.join("\n");
    content.push('\n');
    fs::write(&path, content)?;
    Ok(())
}

fn date_prefix(line: &str) -> &str {
    line.get(..8).unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalMirrorStore;
    use tempfile::tempdir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn metrics_line(ticker: &str) -> String {
        let mut fields = vec![
            "2024-05-02".to_string(),
            ticker.to_string(),
            "Apple".to_string(),
            "2024-05-01".to_string(),
            "2".to_string(),
            "2024".to_string(),
        ];
        fields.extend((6..29).map(|i| format!("m{}", i)));
        fields.join("\t")
    }

    fn diff_line(ticker: &str) -> String {
        let mut fields = vec![
            "2024-05-02".to_string(),
            ticker.to_string(),
            "Apple".to_string(),
            "2024-05-01".to_string(),
            "2".to_string(),
            "2024".to_string(),
            "2024-02-01".to_string(),
        ];
        fields.extend((7..47).map(|i| format!("d{}", i)));
        fields.join("\t")
    }

    #[test]
    fn test_earnings_call_row_with_and_without_diff() {
        let metrics: Vec<String> = metrics_line("AAPL").split('\t').map(str::to_string).collect();
        let diff: Vec<String> = diff_line("AAPL").split('\t').map(str::to_string).collect();

        let joined = earnings_call_row("20240502", &metrics, Some(&diff));
        let fields: Vec<&str> = joined.split(',').collect();
        assert_eq!(fields.len(), 4 + 23 + DIFF_OUTPUT_FIELDS);
        assert_eq!(&fields[..4], &["20240502", "20240501", "2", "2024"]);
        assert_eq!(fields[27], "20240201");
        assert_eq!(fields[28], "d7");
        assert_eq!(fields.last().copied(), Some("d46"));

        let alone = earnings_call_row("20240502", &metrics, None);
        let fields: Vec<&str> = alone.split(',').collect();
        assert_eq!(fields.len(), 4 + 23 + DIFF_OUTPUT_FIELDS);
        assert!(fields[27..].iter().all(|f| f.is_empty()));
    }

    #[test]
    fn test_blmect_process_date() {
        let mirror = tempdir().unwrap();
        let staging = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::create_dir_all(mirror.path().join("BLMECT")).unwrap();
        fs::write(
            mirror.path().join("BLMECT/metrics_earnings_call_20240502.csv"),
            format!("header\tcols\n{}\n{}\nshort\trow\n", metrics_line("AAPL"), metrics_line("MSFT")),
        )
        .unwrap();
        fs::write(
            mirror.path().join("BLMECT/differences_earnings_call_20240502.csv"),
            format!("header\tcols\n{}\n", diff_line("AAPL")),
        )
        .unwrap();

        let store = LocalMirrorStore::new(mirror.path());
        let converter = DataConverter::new(ConverterDataset::Blmect, &store, staging.path(), output.path());
        assert_eq!(converter.process_date(date(2)).unwrap(), 2);

        let aapl = fs::read_to_string(output.path().join("blmect/aapl.csv")).unwrap();
        assert!(aapl.starts_with("20240502,20240501,2,2024,m6,"));
        assert!(aapl.trim_end().ends_with("d46"));
        let msft = fs::read_to_string(output.path().join("blmect/msft.csv")).unwrap();
        assert!(msft.trim_end().ends_with(",,"));
    }

    #[test]
    fn test_missing_metrics_file_fails() {
        let mirror = tempdir().unwrap();
        let staging = tempdir().unwrap();
        let output = tempdir().unwrap();
        let store = LocalMirrorStore::new(mirror.path());

        let converter = DataConverter::new(ConverterDataset::Bwpv, &store, staging.path(), output.path());
        assert!(converter.process_date(date(2)).is_err());
    }

    #[test]
    fn test_bwpv_merges_with_existing_file() {
        let mirror = tempdir().unwrap();
        let staging = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::create_dir_all(mirror.path().join("BWPV")).unwrap();
        fs::write(
            mirror.path().join("BWPV/metrics_20240502.csv"),
            "COMPANY,TICKER,DATE,V1,B1,V7,B7,V30,B30\n\
             Apple,AAPL,2024-05-02,10,0.1,70,0.7,300,0.3\n\
             Apple,AAPL,not-a-date,1,1,1,1,1,1\n",
        )
        .unwrap();
        fs::create_dir_all(output.path().join("bwpv")).unwrap();
        fs::write(
            output.path().join("bwpv/aapl.csv"),
            "20240503,11,0.1,71,0.7,301,0.3\n20240502,10,0.1,70,0.7,300,0.3\n",
        )
        .unwrap();

        let store = LocalMirrorStore::new(mirror.path());
        let converter = DataConverter::new(ConverterDataset::Bwpv, &store, staging.path(), output.path());
        assert_eq!(converter.process_date(date(2)).unwrap(), 1);

        let content = fs::read_to_string(output.path().join("bwpv/aapl.csv")).unwrap();
        assert_eq!(
            content,
            "20240502,10,0.1,70,0.7,300,0.3\n20240503,11,0.1,71,0.7,301,0.3\n"
        );
    }

    #[test]
    fn test_dataset_from_str() {
        assert_eq!("BLMECT".parse::<ConverterDataset>().unwrap(), ConverterDataset::Blmect);
        assert_eq!("bwpv".parse::<ConverterDataset>().unwrap(), ConverterDataset::Bwpv);
        assert!("bsi".parse::<ConverterDataset>().is_err());
    }

    #[test]
    fn test_bwpv_history_replays_dates_in_order() {
        let mirror = tempdir().unwrap();
        let staging = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::create_dir_all(mirror.path().join("BWPV")).unwrap();
        fs::write(
            mirror.path().join("BWPV/metrics_20240503.csv"),
            "COMPANY,TICKER,DATE,V1,B1,V7,B7,V30,B30\nApple,AAPL,2024-05-03,11,0.1,71,0.7,301,0.3\n",
        )
        .unwrap();
        fs::write(
            mirror.path().join("BWPV/metrics_20240502.csv"),
            "COMPANY,TICKER,DATE,V1,B1,V7,B7,V30,B30\n\
             Apple,AAPL,2024-05-02,10,0.1,70,0.7,300,0.3\n\
             Microsoft,MSFT,2024-05-02,5,0.2,35,0.4,150,0.6\n",
        )
        .unwrap();
        fs::write(mirror.path().join("BWPV/notes.txt"), "").unwrap();

        let store = LocalMirrorStore::new(mirror.path());
        let converter = DataConverter::new(ConverterDataset::Bwpv, &store, staging.path(), output.path());
        assert_eq!(converter.history_dates().unwrap(), vec![date(2), date(3)]);
        assert_eq!(converter.process_history().unwrap(), 2);

        let aapl = fs::read_to_string(output.path().join("bwpv/aapl.csv")).unwrap();
        assert_eq!(aapl, "20240502,10,0.1,70,0.7,300,0.3\n20240503,11,0.1,71,0.7,301,0.3\n");
        assert!(output.path().join("bwpv/msft.csv").exists());
    }

    #[test]
    fn test_blmect_history_includes_diff_only_dates() {
        let mirror = tempdir().unwrap();
        let staging = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::create_dir_all(mirror.path().join("BLMECT")).unwrap();
        fs::write(
            mirror.path().join("BLMECT/metrics_earnings_call_20240502.csv"),
            format!("header\tcols\n{}\n", metrics_line("AAPL")),
        )
        .unwrap();
        fs::write(
            mirror.path().join("BLMECT/differences_earnings_call_20240503.csv"),
            format!("header\tcols\n{}\n", diff_line("AAPL")),
        )
        .unwrap();

        let store = LocalMirrorStore::new(mirror.path());
        let converter = DataConverter::new(ConverterDataset::Blmect, &store, staging.path(), output.path());
        assert_eq!(converter.history_dates().unwrap(), vec![date(2), date(3)]);

        // The second date has no metrics file, so the replay stops there
        assert!(converter.process_history().is_err());
        assert!(output.path().join("blmect/aapl.csv").exists());
    }
}
