//! Brain report categories and their fixed vendor schemas

use crate::error::{EtlError, Result};
use crate::types::Lookback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vendor report category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Language metrics on 10-K filings only
    Report10K,
    /// Language metrics on all filings
    ReportAll,
    /// Similarity between consecutive 10-K filings
    ReportDiff10K,
    /// Similarity between consecutive filings of any kind
    ReportDiffAll,
    /// Sentiment indicator
    Sentiment,
    /// Machine-learning stock rankings
    Rankings,
}

/// Object-storage key prefix shared by the four report categories
pub const REPORT_KEY_PREFIX: &str = "BLMCF_V2";
pub const SENTIMENT_KEY_PREFIX: &str = "BSI";
pub const RANKINGS_KEY_PREFIX: &str = "BSR";

/// Raw file prefixes, their lookback horizon and category
pub const FILE_PREFIXES: &[(&str, Option<u32>, Category)] = &[
    ("differences_10k", None, Category::ReportDiff10K),
    ("differences_all", None, Category::ReportDiffAll),
    ("metrics_10k", None, Category::Report10K),
    ("metrics_all", None, Category::ReportAll),
    ("sentimentDays7", Some(7), Category::Sentiment),
    ("sentimentDays30", Some(30), Category::Sentiment),
    ("mlAlpha2Days", Some(2), Category::Rankings),
    ("mlAlpha3Days", Some(3), Category::Rankings),
    ("mlAlpha5Days", Some(5), Category::Rankings),
    ("mlAlpha10Days", Some(10), Category::Rankings),
    ("mlAlpha21Days", Some(21), Category::Rankings),
];

const RANKINGS_COLUMNS: &[&str] = &["ML_ALPHA"];

const SENTIMENT_COLUMNS: &[&str] = &[
    "VOLUME",
    "VOLUME_SENTIMENT",
    "SENTIMENT_SCORE",
    "BUZZ_VOLUME",
    "BUZZ_VOLUME_SENTIMENT",
];

const REPORT_COLUMNS: &[&str] = &[
    "LAST_REPORT_DATE",
    "LAST_REPORT_CATEGORY",
    "N_SENTENCES",
    "MEAN_SENTENCE_LENGTH",
    "SENTIMENT",
    "SCORE_UNCERTAINTY",
    "SCORE_LITIGIOUS",
    "SCORE_CONSTRAINING",
    "SCORE_INTERESTING",
    "READABILITY",
    "LEXICAL_RICHNESS",
    "LEXICAL_DENSITY",
    "SPECIFIC_DENSITY",
    "RF_N_SENTENCES",
    "RF_MEAN_SENTENCE_LENGTH",
    "RF_SENTIMENT",
    "RF_SCORE_UNCERTAINTY",
    "RF_SCORE_LITIGIOUS",
    "RF_SCORE_CONSTRAINING",
    "RF_SCORE_INTERESTING",
    "RF_READABILITY",
    "RF_LEXICAL_RICHNESS",
    "RF_LEXICAL_DENSITY",
    "RF_SPECIFIC_DENSITY",
    "MD_N_SENTENCES",
    "MD_MEAN_SENTENCE_LENGTH",
    "MD_SENTIMENT",
    "MD_SCORE_UNCERTAINTY",
    "MD_SCORE_LITIGIOUS",
    "MD_SCORE_CONSTRAINING",
    "MD_SCORE_INTERESTING",
    "MD_READABILITY",
    "MD_LEXICAL_RICHNESS",
    "MD_LEXICAL_DENSITY",
    "MD_SPECIFIC_DENSITY",
];

const REPORT_DIFF_COLUMNS: &[&str] = &[
    "LAST_REPORT_DATE",
    "LAST_REPORT_CATEGORY",
    "LAST_REPORT_PERIOD",
    "PREV_REPORT_DATE",
    "PREV_REPORT_CATEGORY",
    "PREV_REPORT_PERIOD",
    "SIMILARITY_ALL",
    "SIMILARITY_POSITIVE",
    "SIMILARITY_NEGATIVE",
    "SIMILARITY_UNCERTAINTY",
    "SIMILARITY_LITIGIOUS",
    "SIMILARITY_CONSTRAINING",
    "SIMILARITY_INTERESTING",
    "RF_SIMILARITY_ALL",
    "RF_SIMILARITY_POSITIVE",
    "RF_SIMILARITY_NEGATIVE",
    "MD_SIMILARITY_ALL",
    "MD_SIMILARITY_POSITIVE",
    "MD_SIMILARITY_NEGATIVE",
];

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Report10K,
        Category::ReportAll,
        Category::ReportDiff10K,
        Category::ReportDiffAll,
        Category::Sentiment,
        Category::Rankings,
    ];

    /// Vendor code, e.g. `BLMCF_V2_DIFF_10K`
    pub fn code(&self) -> &'static str {
        match self {
            Category::Report10K => "BLMCF_V2_10K",
            Category::ReportAll => "BLMCF_V2_ALL",
            Category::ReportDiff10K => "BLMCF_V2_DIFF_10K",
            Category::ReportDiffAll => "BLMCF_V2_DIFF_ALL",
            Category::Sentiment => "BSI",
            Category::Rankings => "BSR",
        }
    }

    /// Object-storage folder holding this category's raw files
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Category::Sentiment => SENTIMENT_KEY_PREFIX,
            Category::Rankings => RANKINGS_KEY_PREFIX,
            _ => REPORT_KEY_PREFIX,
        }
    }

    /// Fixed, ordered metric columns of the raw vendor file
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Category::Report10K | Category::ReportAll => REPORT_COLUMNS,
            Category::ReportDiff10K | Category::ReportDiffAll => REPORT_DIFF_COLUMNS,
            Category::Sentiment => SENTIMENT_COLUMNS,
            Category::Rankings => RANKINGS_COLUMNS,
        }
    }

    /// Output directory name. Diff categories are merged into their report
    /// category and are never written on their own.
    pub fn output_dir(&self) -> Option<&'static str> {
        match self {
            Category::Report10K => Some("report_10k"),
            Category::ReportAll => Some("report_all"),
            Category::Sentiment => Some("sentiment"),
            Category::Rankings => Some("rankings"),
            Category::ReportDiff10K | Category::ReportDiffAll => None,
        }
    }

    pub fn is_report(&self) -> bool {
        matches!(
            self,
            Category::Report10K | Category::ReportAll | Category::ReportDiff10K | Category::ReportDiffAll
        )
    }

    pub fn is_diff(&self) -> bool {
        matches!(self, Category::ReportDiff10K | Category::ReportDiffAll)
    }

    /// Diff category merged into this report category
    pub fn diff_counterpart(&self) -> Option<Category> {
        match self {
            Category::Report10K => Some(Category::ReportDiff10K),
            Category::ReportAll => Some(Category::ReportDiffAll),
            _ => None,
        }
    }

    /// Lookback horizons, in the order universe rows list them
    pub fn lookbacks(&self) -> Vec<Lookback> {
        FILE_PREFIXES
            .iter()
            .filter(|(_, _, category)| category == self)
            .filter_map(|(_, days, _)| days.map(Lookback))
            .collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Category {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.code().eq_ignore_ascii_case(s) || c.output_dir() == Some(s))
            .ok_or_else(|| EtlError::UnknownCategory(s.to_string()))
    }
}
