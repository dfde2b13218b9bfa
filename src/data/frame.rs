//! Resolved record sets and explicit deduplication

use crate::category::Category;
use crate::records::{
    MergedReport, OutputFields, RankingMetrics, ReportDiffMetrics, ReportMetrics, SentimentMetrics,
};
use crate::types::{Lookback, Ticker};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A downloaded raw file and where it sits in the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub category: Category,
    pub lookback: Option<Lookback>,
    /// Date encoded in the file name; every row inherits it
    pub date: NaiveDate,
    /// Download order within the run
    pub sequence: usize,
}

/// Precedence of a record among duplicates: newer file date, then later
/// download, then later row wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceRank {
    pub file_date: NaiveDate,
    pub sequence: usize,
    pub row: usize,
}

/// Deduplication key: (ticker, date, lookback)
pub type RecordKey = (Ticker, NaiveDate, Option<Lookback>);

/// One resolved vendor row
#[derive(Debug, Clone, PartialEq)]
pub struct Record<M> {
    pub ticker: Ticker,
    pub date: NaiveDate,
    pub lookback: Option<Lookback>,
    pub figi: Option<String>,
    pub rank: SourceRank,
    pub metrics: M,
}

impl<M> Record<M> {
    pub fn key(&self) -> RecordKey {
        (self.ticker.clone(), self.date, self.lookback)
    }
}

/// Keep exactly one record per key, chosen by `SourceRank`.
///
/// Output is ordered by ticker, then date, then lookback.
pub fn deduplicate<M>(records: Vec<Record<M>>) -> Vec<Record<M>> {
    let total = records.len();
    let mut unique: BTreeMap<RecordKey, Record<M>> = BTreeMap::new();

    for record in records {
        let key = record.key();
        match unique.get(&key) {
            Some(existing) if existing.rank >= record.rank => {}
            _ => {
                unique.insert(key, record);
            }
        }
    }

    let dropped = total - unique.len();
    if dropped > 0 {
        log::debug!("Dropped {} duplicate records", dropped);
    }
    unique.into_values().collect()
}

/// Drop records dated before `start`
pub fn retain_from<M>(records: &mut Vec<Record<M>>, start: NaiveDate) {
    records.retain(|r| r.date >= start);
}

/// Parsed contents of one raw file
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryFrame {
    Rankings(Vec<Record<RankingMetrics>>),
    Sentiment(Vec<Record<SentimentMetrics>>),
    Report(Category, Vec<Record<ReportMetrics>>),
    ReportDiff(Category, Vec<Record<ReportDiffMetrics>>),
}

impl CategoryFrame {
    /// Empty, correctly-typed frame for `category`
    pub fn empty(category: Category) -> Self {
        match category {
            Category::Rankings => CategoryFrame::Rankings(Vec::new()),
            Category::Sentiment => CategoryFrame::Sentiment(Vec::new()),
            Category::Report10K | Category::ReportAll => CategoryFrame::Report(category, Vec::new()),
            Category::ReportDiff10K | Category::ReportDiffAll => CategoryFrame::ReportDiff(category, Vec::new()),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            CategoryFrame::Rankings(_) => Category::Rankings,
            CategoryFrame::Sentiment(_) => Category::Sentiment,
            CategoryFrame::Report(category, _) | CategoryFrame::ReportDiff(category, _) => *category,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CategoryFrame::Rankings(r) => r.len(),
            CategoryFrame::Sentiment(r) => r.len(),
            CategoryFrame::Report(_, r) => r.len(),
            CategoryFrame::ReportDiff(_, r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append another frame of the same category; mismatches are ignored
    pub fn extend(&mut self, other: CategoryFrame) {
        match (self, other) {
            (CategoryFrame::Rankings(a), CategoryFrame::Rankings(b)) => a.extend(b),
            (CategoryFrame::Sentiment(a), CategoryFrame::Sentiment(b)) => a.extend(b),
            (CategoryFrame::Report(ca, a), CategoryFrame::Report(cb, b)) if *ca == cb => a.extend(b),
            (CategoryFrame::ReportDiff(ca, a), CategoryFrame::ReportDiff(cb, b)) if *ca == cb => a.extend(b),
            (this, other) => log::error!(
                "Refusing to concatenate {} records into {} frame",
                other.category(),
                this.category()
            ),
        }
    }

    /// Explicit duplicate removal, see [`deduplicate`]
    pub fn deduplicated(self) -> Self {
        match self {
            CategoryFrame::Rankings(r) => CategoryFrame::Rankings(deduplicate(r)),
            CategoryFrame::Sentiment(r) => CategoryFrame::Sentiment(deduplicate(r)),
            CategoryFrame::Report(c, r) => CategoryFrame::Report(c, deduplicate(r)),
            CategoryFrame::ReportDiff(c, r) => CategoryFrame::ReportDiff(c, deduplicate(r)),
        }
    }
}

/// Records ready to be partitioned and written
#[derive(Debug, Clone, PartialEq)]
pub enum OutputFrame {
    Rankings(Vec<Record<RankingMetrics>>),
    Sentiment(Vec<Record<SentimentMetrics>>),
    Report(Category, Vec<Record<MergedReport>>),
}

impl OutputFrame {
    pub fn category(&self) -> Category {
        match self {
            OutputFrame::Rankings(_) => Category::Rankings,
            OutputFrame::Sentiment(_) => Category::Sentiment,
            OutputFrame::Report(category, _) => *category,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            OutputFrame::Rankings(r) => r.len(),
            OutputFrame::Sentiment(r) => r.len(),
            OutputFrame::Report(_, r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop records dated before `start`
    pub fn retain_from(&mut self, start: NaiveDate) {
        match self {
            OutputFrame::Rankings(r) => retain_from(r, start),
            OutputFrame::Sentiment(r) => retain_from(r, start),
            OutputFrame::Report(_, r) => retain_from(r, start),
        }
    }

    /// Flatten into (ticker, date, lookback, fields) rows
    pub fn rows(&self) -> Vec<OutputRow> {
        match self {
            OutputFrame::Rankings(r) => to_rows(r),
            OutputFrame::Sentiment(r) => to_rows(r),
            OutputFrame::Report(_, r) => to_rows(r),
        }
    }
}

/// A formatted record as the writer sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub ticker: Ticker,
    pub date: NaiveDate,
    pub lookback: Option<Lookback>,
    pub fields: Vec<String>,
}

fn to_rows<M: OutputFields>(records: &[Record<M>]) -> Vec<OutputRow> {
    records
        .iter()
        .map(|record| {
            let mut fields = Vec::new();
            record.metrics.output_fields(&mut fields);
            OutputRow {
                ticker: record.ticker.clone(),
                date: record.date,
                lookback: record.lookback,
                fields,
            }
        })
        .collect()
}
