//! Joining report metrics with their filing-difference counterpart

use super::frame::{CategoryFrame, OutputFrame, Record};
use crate::category::Category;
use crate::error::{EtlError, Result};
use crate::records::{MergedReport, ReportDiffMetrics, ReportMetrics};
use crate::types::Ticker;
use chrono::NaiveDate;
use hashbrown::HashMap;

/// Left join of a report category with its diff category on (ticker, date)
#[derive(Debug, Clone, Copy)]
pub struct ReportMerger {
    category: Category,
}

impl ReportMerger {
    /// Merger for `Report10K` or `ReportAll`
    pub fn new(category: Category) -> Result<Self> {
        if category.diff_counterpart().is_none() {
            return Err(EtlError::DataError(format!("{} is not a mergeable report category", category)));
        }
        Ok(Self { category })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Merge two parsed frames. Either side may be absent; an absent side is
    /// treated as empty.
    pub fn merge_frames(&self, report: Option<CategoryFrame>, diff: Option<CategoryFrame>) -> Result<OutputFrame> {
        let reports = match report {
            None => Vec::new(),
            Some(CategoryFrame::Report(category, records)) if category == self.category => records,
            Some(other) => return Err(self.mismatch(other.category())),
        };

        let diff_category = self.category.diff_counterpart();
        let diffs = match diff {
            None => Vec::new(),
            Some(CategoryFrame::ReportDiff(category, records)) if Some(category) == diff_category => records,
            Some(other) => return Err(self.mismatch(other.category())),
        };

        Ok(self.merge(reports, diffs))
    }

    /// Every report record yields exactly one merged record; diff rows with no
    /// report row on the same (ticker, date) are dropped.
    pub fn merge(&self, reports: Vec<Record<ReportMetrics>>, diffs: Vec<Record<ReportDiffMetrics>>) -> OutputFrame {
        let mut by_key: HashMap<(Ticker, NaiveDate), ReportDiffMetrics> = HashMap::with_capacity(diffs.len());
        for diff in diffs {
            by_key.insert((diff.ticker, diff.date), diff.metrics);
        }

        let merged: Vec<Record<MergedReport>> = reports
            .into_iter()
            .map(|record| {
                let diff = by_key.remove(&(record.ticker.clone(), record.date));
                Record {
                    ticker: record.ticker,
                    date: record.date,
                    lookback: record.lookback,
                    figi: record.figi,
                    rank: record.rank,
                    metrics: MergedReport {
                        report: record.metrics,
                        diff,
                    },
                }
            })
            .collect();

        if !by_key.is_empty() {
            log::debug!(
                "{}: {} diff rows without a matching report row were dropped",
                self.category,
                by_key.len()
            );
        }

        OutputFrame::Report(self.category, merged)
    }

    fn mismatch(&self, found: Category) -> EtlError {
        EtlError::DataError(format!("Cannot merge {} records into {}", found, self.category))
    }
}
