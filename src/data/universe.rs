//! Per-date universe snapshots rebuilt from the per-ticker output tree
//!
//! Each dataset gets `root/{category_dir}/universe/{YYYYMMDD}.csv`, one line
//! per ticker in ascending order: `SID,TICKER,<fields>`.

use super::writer::WriteManifest;
use crate::assets::{MapFileResolver, SecurityIdentifier};
use crate::category::Category;
use crate::error::{EtlError, Result};
use crate::types::{parse_compact_date, Lookback, ProcessingWindow, Ticker, OUTPUT_DATE_FORMAT};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory holding snapshot files inside each dataset directory
pub const UNIVERSE_DIR: &str = "universe";

/// Report lines keep output columns 3..=35: the metrics after the
/// date and the two report header columns
const REPORT_SLICE_START: usize = 3;
const REPORT_SLICE_END: usize = 36;

/// A per-ticker file to aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
struct TickerFile {
    ticker: Ticker,
    lookback: Option<String>,
    path: PathBuf,
}

/// What one ticker contributes to one date's snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
enum UniverseEntry {
    /// Opaque metric slice of a report line
    Report(String),
    /// Lookback label → that horizon's opaque field string
    Horizons(HashMap<String, String>),
}

type DateBuckets = BTreeMap<NaiveDate, BTreeMap<Ticker, UniverseEntry>>;

/// Rebuilds universe files for the rankings, sentiment and report datasets
pub struct UniverseAggregator<'a> {
    root: PathBuf,
    map_files: &'a MapFileResolver,
    window: ProcessingWindow,
}

impl<'a> UniverseAggregator<'a> {
    pub fn new(root: impl Into<PathBuf>, map_files: &'a MapFileResolver, window: ProcessingWindow) -> Self {
        Self {
            root: root.into(),
            map_files,
            window,
        }
    }

    pub fn aggregate_rankings(&self, manifest: Option<&WriteManifest>) -> Result<Vec<PathBuf>> {
        self.aggregate(Category::Rankings, manifest)
    }

    pub fn aggregate_sentiment(&self, manifest: Option<&WriteManifest>) -> Result<Vec<PathBuf>> {
        self.aggregate(Category::Sentiment, manifest)
    }

    /// `Report10K` or `ReportAll`
    pub fn aggregate_report(&self, category: Category, manifest: Option<&WriteManifest>) -> Result<Vec<PathBuf>> {
        if !category.is_report() || category.is_diff() {
            return Err(EtlError::DataError(format!("{} has no report universe", category)));
        }
        self.aggregate(category, manifest)
    }

    /// Every dataset, reports first
    pub fn aggregate_all(&self, manifest: Option<&WriteManifest>) -> Result<Vec<PathBuf>> {
        let mut written = self.aggregate_report(Category::Report10K, manifest)?;
        written.extend(self.aggregate_report(Category::ReportAll, manifest)?);
        written.extend(self.aggregate_rankings(manifest)?);
        written.extend(self.aggregate_sentiment(manifest)?);
        Ok(written)
    }

    /// Bucket every line of the dataset's per-ticker files by date and ticker,
    /// then write one snapshot per date inside the window.
    ///
    /// With a manifest only the files it lists are read; without one the
    /// dataset directory is walked.
    pub fn aggregate(&self, category: Category, manifest: Option<&WriteManifest>) -> Result<Vec<PathBuf>> {
        let dataset = category
            .output_dir()
            .ok_or_else(|| EtlError::DataError(format!("{} has no output directory", category)))?;
        let base = self.root.join(dataset);

        let files = match manifest {
            Some(manifest) => files_from_manifest(manifest, category),
            None => files_from_directory(&base, category.is_report()),
        };
        if files.is_empty() {
            log::info!("No per-ticker files for {}, skipping universe", dataset);
            return Ok(Vec::new());
        }

        let buckets = self.bucket(&files, category.is_report())?;
        let universe_dir = base.join(UNIVERSE_DIR);
        fs::create_dir_all(&universe_dir)?;

        let mut written = Vec::with_capacity(buckets.len());
        for (date, tickers) in &buckets {
            let content = self.render(category, *date, tickers);
            if content.is_empty() {
                log::debug!("No complete {} universe lines on {}", dataset, date);
                continue;
            }
            let path = universe_dir.join(format!("{}.csv", date.format(OUTPUT_DATE_FORMAT)));
            fs::write(&path, content)?;
            written.push(path);
        }

        log::info!("Wrote {} {} universe files", written.len(), dataset);
        Ok(written)
    }

    fn bucket(&self, files: &[TickerFile], is_report: bool) -> Result<DateBuckets> {
        let mut buckets = DateBuckets::new();

        for file in files {
            let mut rdr = ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&file.path)
                .map_err(|e| EtlError::DataError(format!("Failed to open {}: {}", file.path.display(), e)))?;

            for result in rdr.records() {
                let record = result?;
                let Some(date) = record.get(0).and_then(parse_compact_date) else {
                    log::warn!("Skipping line without a date in {}", file.path.display());
                    continue;
                };
                if !self.window.contains(date) {
                    continue;
                }

                let fields: Vec<&str> = record.iter().collect();
                let tickers = buckets.entry(date).or_default();

                if is_report {
                    let end = fields.len().min(REPORT_SLICE_END);
                    let slice = fields.get(REPORT_SLICE_START..end).unwrap_or(&[]).join(",");
                    tickers.insert(file.ticker.clone(), UniverseEntry::Report(slice));
                } else {
                    let label = file.lookback.clone().unwrap_or_default();
                    let value = fields[1..].join(",");
                    match tickers
                        .entry(file.ticker.clone())
                        .or_insert_with(|| UniverseEntry::Horizons(HashMap::new()))
                    {
                        UniverseEntry::Horizons(horizons) => {
                            horizons.insert(label, value);
                        }
                        UniverseEntry::Report(_) => {}
                    }
                }
            }
        }

        Ok(buckets)
    }

    fn render(&self, category: Category, date: NaiveDate, tickers: &BTreeMap<Ticker, UniverseEntry>) -> String {
        let lookbacks = category.lookbacks();
        let blank = vec![""; category.columns().len()].join(",");
        let mut content = String::new();

        for (ticker, entry) in tickers {
            let fields = match entry {
                UniverseEntry::Report(slice) => slice.clone(),
                UniverseEntry::Horizons(horizons) => {
                    let mut values = Vec::with_capacity(lookbacks.len());
                    for lookback in &lookbacks {
                        match horizons.get(&lookback.label()) {
                            Some(value) => values.push(value.as_str()),
                            None if requires_every_horizon(category) => {
                                log::debug!("Skipping {} on {}: no {}-day {} data", ticker, date, lookback, category);
                                break;
                            }
                            None => values.push(blank.as_str()),
                        }
                    }
                    if values.len() < lookbacks.len() {
                        continue;
                    }
                    values.join(",")
                }
            };

            let sid = SecurityIdentifier::generate_equity(ticker, self.map_files, date);
            content.push_str(&format!("{},{},{}\n", sid, ticker, fields));
        }

        content
    }
}

/// Sentiment universe readers parse every horizon's counts, so a line with
/// a blank horizon cannot be loaded; rankings readers accept blanks.
fn requires_every_horizon(category: Category) -> bool {
    category == Category::Sentiment
}

fn files_from_manifest(manifest: &WriteManifest, category: Category) -> Vec<TickerFile> {
    manifest
        .files_for(category)
        .map(|file| TickerFile {
            ticker: file.ticker.to_uppercase(),
            lookback: file.lookback.map(|l: Lookback| l.label()),
            path: file.path.clone(),
        })
        .collect()
}

/// Walk `base` for per-ticker files. The ticker is the file stem; for
/// lookback datasets the horizon is the directory two levels up.
fn files_from_directory(base: &Path, is_report: bool) -> Vec<TickerFile> {
    if !base.exists() {
        log::warn!("Dataset directory {} does not exist", base.display());
        return Vec::new();
    }

    let universe_dir = base.join(UNIVERSE_DIR);
    let mut files: Vec<TickerFile> = WalkDir::new(base)
        .into_iter()
        .filter_entry(|entry| entry.path() != universe_dir.as_path())
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Failed to read directory entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "csv"))
        .filter_map(|entry| {
            let path = entry.into_path();
            let ticker = path.file_stem()?.to_str()?.to_uppercase();
            let lookback = if is_report {
                None
            } else {
                Some(path.parent()?.parent()?.file_name()?.to_str()?.to_string())
            };
            Some(TickerFile { ticker, lookback, path })
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}
