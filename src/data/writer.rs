//! Per-ticker partitioned output files
//!
//! Layout: `root/{category_dir}/[{lookback}/]{YYYYMM}/{ticker}.csv`, one
//! headerless line per date: `YYYYMMDD,<metric fields>`.

use super::frame::{OutputFrame, OutputRow};
use crate::category::Category;
use crate::error::{EtlError, Result};
use crate::types::{Lookback, Ticker, MONTH_FORMAT, OUTPUT_DATE_FORMAT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One per-ticker file produced by a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenFile {
    pub category: Category,
    pub lookback: Option<Lookback>,
    pub ticker: Ticker,
    pub path: PathBuf,
}

/// Files produced by the writer, handed to the universe aggregator when
/// both phases run in the same process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteManifest {
    files: Vec<WrittenFile>,
}

impl WriteManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: WrittenFile) {
        self.files.push(file);
    }

    pub fn extend(&mut self, other: WriteManifest) {
        self.files.extend(other.files);
    }

    pub fn files(&self) -> &[WrittenFile] {
        &self.files
    }

    /// Files written for `category`, in write order
    pub fn files_for(&self, category: Category) -> impl Iterator<Item = &WrittenFile> {
        self.files.iter().filter(move |f| f.category == category)
    }

    pub fn contains_category(&self, category: Category) -> bool {
        self.files.iter().any(|f| f.category == category)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Writes output frames under an output root
pub struct PartitionWriter {
    root: PathBuf,
}

impl PartitionWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `ticker`'s records for one month
    pub fn file_path(&self, category: Category, lookback: Option<Lookback>, month: &str, ticker: &str) -> Result<PathBuf> {
        let dir = category
            .output_dir()
            .ok_or_else(|| EtlError::DataError(format!("{} has no output directory", category)))?;

        let mut path = self.root.join(dir);
        if let Some(lookback) = lookback {
            path.push(lookback.label());
        }
        path.push(month);
        path.push(format!("{}.csv", ticker.to_lowercase()));
        Ok(path)
    }

    /// Write every frame, skipping empty ones
    pub fn write_all<'a>(&self, frames: impl IntoIterator<Item = &'a OutputFrame>) -> Result<WriteManifest> {
        let mut manifest = WriteManifest::new();
        for frame in frames {
            manifest.extend(self.write(frame)?);
        }
        Ok(manifest)
    }

    /// Group `frame` by (ticker, lookback, month) and overwrite one file per group
    pub fn write(&self, frame: &OutputFrame) -> Result<WriteManifest> {
        let category = frame.category();
        let mut manifest = WriteManifest::new();
        if frame.is_empty() {
            return Ok(manifest);
        }

        let mut groups: BTreeMap<(Ticker, Option<Lookback>, String), Vec<OutputRow>> = BTreeMap::new();
        for row in frame.rows() {
            let month = row.date.format(MONTH_FORMAT).to_string();
            groups
                .entry((row.ticker.clone(), row.lookback, month))
                .or_default()
                .push(row);
        }

        for ((ticker, lookback, month), mut rows) in groups {
            rows.sort_by_key(|row| row.date);
            let path = self.file_path(category, lookback, &month, &ticker)?;
            write_rows(&path, &rows)?;
            manifest.push(WrittenFile {
                category,
                lookback,
                ticker,
                path,
            });
        }

        log::info!("Wrote {} {} files under {}", manifest.len(), category, self.root.display());
        Ok(manifest)
    }
}

fn write_rows(path: &Path, rows: &[OutputRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(|e| EtlError::DataError(format!("Failed to create {}: {}", path.display(), e)))?;

    for row in rows {
        let mut record = Vec::with_capacity(row.fields.len() + 1);
        record.push(row.date.format(OUTPUT_DATE_FORMAT).to_string());
        record.extend(row.fields.iter().cloned());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::{Record, SourceRank};
    use crate::records::{RankingMetrics, SentimentMetrics};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, m, d).unwrap()
    }

    fn sentiment(ticker: &str, day: NaiveDate, lookback: u32, volume: i64) -> Record<SentimentMetrics> {
        Record {
            ticker: ticker.to_string(),
            date: day,
            lookback: Some(Lookback(lookback)),
            figi: None,
            rank: SourceRank {
                file_date: day,
                sequence: 0,
                row: 0,
            },
            metrics: SentimentMetrics {
                volume: Some(volume),
                volume_sentiment: Some(1),
                sentiment_score: Some(0.5),
                buzz_volume: None,
                buzz_volume_sentiment: Some(0.25),
            },
        }
    }

    #[test]
    fn test_file_path_layout() {
        let writer = PartitionWriter::new("/out");
        let path = writer.file_path(Category::Sentiment, Some(Lookback(7)), "202102", "AAPL").unwrap();
        assert_eq!(path, PathBuf::from("/out/sentiment/7/202102/aapl.csv"));

        let path = writer.file_path(Category::ReportAll, None, "202102", "BRK.B").unwrap();
        assert_eq!(path, PathBuf::from("/out/report_all/202102/brk.b.csv"));

        assert!(writer.file_path(Category::ReportDiffAll, None, "202102", "AAPL").is_err());
    }

    #[test]
    fn test_write_groups_by_ticker_lookback_and_month() {
        let dir = tempdir().unwrap();
        let writer = PartitionWriter::new(dir.path());

        let frame = OutputFrame::Sentiment(vec![
            sentiment("AAPL", date(2, 2), 7, 20),
            sentiment("AAPL", date(2, 1), 7, 10),
            sentiment("AAPL", date(2, 1), 30, 300),
            sentiment("AAPL", date(3, 1), 7, 30),
        ]);
        let manifest = writer.write(&frame).unwrap();
        assert_eq!(manifest.len(), 3);

        let content = fs::read_to_string(dir.path().join("sentiment/7/202102/aapl.csv")).unwrap();
        assert_eq!(content, "20210201,10,1,0.500000,,0.250000\n20210202,20,1,0.500000,,0.250000\n");
        assert!(dir.path().join("sentiment/30/202102/aapl.csv").exists());
        assert!(dir.path().join("sentiment/7/202103/aapl.csv").exists());
    }

    #[test]
    fn test_write_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let writer = PartitionWriter::new(dir.path());
        let path = writer.file_path(Category::Rankings, Some(Lookback(2)), "202102", "aapl").unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale\n").unwrap();

        let frame = OutputFrame::Rankings(vec![Record {
            ticker: "AAPL".to_string(),
            date: date(2, 1),
            lookback: Some(Lookback(2)),
            figi: None,
            rank: SourceRank {
                file_date: date(2, 1),
                sequence: 0,
                row: 0,
            },
            metrics: RankingMetrics { ml_alpha: Some(0.1) },
        }]);
        writer.write(&frame).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "20210201,0.100000\n");
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempdir().unwrap();
        let writer = PartitionWriter::new(dir.path());
        let manifest = writer
            .write(&OutputFrame::Sentiment(vec![sentiment("MSFT", date(2, 1), 30, 1)]))
            .unwrap();

        let manifest_path = dir.path().join("manifest.json");
        manifest.save(&manifest_path).unwrap();
        let loaded = WriteManifest::load(&manifest_path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.contains_category(Category::Sentiment));
        assert_eq!(loaded.files_for(Category::Rankings).count(), 0);
    }

    #[test]
    fn test_empty_frame_writes_nothing() {
        let dir = tempdir().unwrap();
        let writer = PartitionWriter::new(dir.path());
        let manifest = writer.write(&OutputFrame::Rankings(Vec::new())).unwrap();
        assert!(manifest.is_empty());
        assert!(!dir.path().join("rankings").exists());
    }
}
