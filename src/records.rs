//! Typed metric records, one struct per vendor category
//!
//! Each struct consumes exactly its category's ordered column set and writes
//! its fields back out in the same order. Missing values are written empty,
//! floats with six decimals, counts as integers, text verbatim.

use crate::category::Category;
use crate::error::{EtlError, Result};

/// Metric payload of one category
pub trait CategoryMetrics: Sized + Clone + PartialEq + std::fmt::Debug {
    /// Category whose column set this struct consumes
    const CATEGORY: Category;

    /// Build from fields ordered as `Self::CATEGORY.columns()`
    fn from_fields(fields: &[&str]) -> Result<Self>;

    /// Append the formatted output fields
    fn write_fields(&self, out: &mut Vec<String>);

    /// Number of output fields `write_fields` appends
    fn field_count() -> usize {
        Self::CATEGORY.columns().len()
    }
}

/// Sequential reader over a row's fields
struct FieldCursor<'a> {
    fields: &'a [&'a str],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(fields: &'a [&'a str], expected: usize) -> Result<Self> {
        if fields.len() != expected {
            return Err(EtlError::ParseError(format!(
                "Expected {} fields, got {}",
                expected,
                fields.len()
            )));
        }
        Ok(Self { fields, pos: 0 })
    }

    fn next_raw(&mut self) -> &'a str {
        let value = self.fields[self.pos].trim();
        self.pos += 1;
        value
    }

    fn text(&mut self) -> Option<String> {
        let raw = self.next_raw();
        if is_missing(raw) {
            None
        } else {
            Some(raw.to_string())
        }
    }

    fn float(&mut self) -> Result<Option<f64>> {
        parse_float(self.next_raw())
    }

    fn count(&mut self) -> Result<Option<i64>> {
        parse_count(self.next_raw())
    }
}

fn is_missing(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null")
}

pub fn parse_float(raw: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if is_missing(raw) {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| EtlError::ParseError(format!("Invalid number: {}", raw)))
}

/// Integer counts; accepts float spellings of whole numbers ("12.0")
pub fn parse_count(raw: &str) -> Result<Option<i64>> {
    let raw = raw.trim();
    if is_missing(raw) {
        return Ok(None);
    }
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(Some(value));
    }
    match raw.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value.is_finite() => Ok(Some(value as i64)),
        _ => Err(EtlError::ParseError(format!("Invalid count: {}", raw))),
    }
}

pub fn format_float(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

pub fn format_count(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn format_text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// BSR: one machine-learning alpha score per horizon
#[derive(Debug, Clone, PartialEq)]
pub struct RankingMetrics {
    pub ml_alpha: Option<f64>,
}

impl CategoryMetrics for RankingMetrics {
    const CATEGORY: Category = Category::Rankings;

    fn from_fields(fields: &[&str]) -> Result<Self> {
        let mut cursor = FieldCursor::new(fields, Self::field_count())?;
        Ok(Self {
            ml_alpha: cursor.float()?,
        })
    }

    fn write_fields(&self, out: &mut Vec<String>) {
        out.push(format_float(self.ml_alpha));
    }
}

/// BSI: article counts and sentiment over a lookback horizon
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentMetrics {
    pub volume: Option<i64>,
    pub volume_sentiment: Option<i64>,
    pub sentiment_score: Option<f64>,
    pub buzz_volume: Option<f64>,
    pub buzz_volume_sentiment: Option<f64>,
}

impl CategoryMetrics for SentimentMetrics {
    const CATEGORY: Category = Category::Sentiment;

    fn from_fields(fields: &[&str]) -> Result<Self> {
        let mut cursor = FieldCursor::new(fields, Self::field_count())?;
        Ok(Self {
            volume: cursor.count()?,
            volume_sentiment: cursor.count()?,
            sentiment_score: cursor.float()?,
            buzz_volume: cursor.float()?,
            buzz_volume_sentiment: cursor.float()?,
        })
    }

    fn write_fields(&self, out: &mut Vec<String>) {
        out.push(format_count(self.volume));
        out.push(format_count(self.volume_sentiment));
        out.push(format_float(self.sentiment_score));
        out.push(format_float(self.buzz_volume));
        out.push(format_float(self.buzz_volume_sentiment));
    }
}

/// Language metrics of one filing section (whole report, risk factors, MD&A)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LanguageMetrics {
    pub n_sentences: Option<i64>,
    pub mean_sentence_length: Option<f64>,
    pub sentiment: Option<f64>,
    pub score_uncertainty: Option<f64>,
    pub score_litigious: Option<f64>,
    pub score_constraining: Option<f64>,
    pub score_interesting: Option<f64>,
    pub readability: Option<f64>,
    pub lexical_richness: Option<f64>,
    pub lexical_density: Option<f64>,
    pub specific_density: Option<f64>,
}

impl LanguageMetrics {
    const FIELDS: usize = 11;

    fn read(cursor: &mut FieldCursor<'_>) -> Result<Self> {
        Ok(Self {
            n_sentences: cursor.count()?,
            mean_sentence_length: cursor.float()?,
            sentiment: cursor.float()?,
            score_uncertainty: cursor.float()?,
            score_litigious: cursor.float()?,
            score_constraining: cursor.float()?,
            score_interesting: cursor.float()?,
            readability: cursor.float()?,
            lexical_richness: cursor.float()?,
            lexical_density: cursor.float()?,
            specific_density: cursor.float()?,
        })
    }

    fn write(&self, out: &mut Vec<String>) {
        out.push(format_count(self.n_sentences));
        for value in [
            self.mean_sentence_length,
            self.sentiment,
            self.score_uncertainty,
            self.score_litigious,
            self.score_constraining,
            self.score_interesting,
            self.readability,
            self.lexical_richness,
            self.lexical_density,
            self.specific_density,
        ] {
            out.push(format_float(value));
        }
    }
}

/// BLMCF_V2_ALL / BLMCF_V2_10K
#[derive(Debug, Clone, PartialEq)]
pub struct ReportMetrics {
    pub last_report_date: Option<String>,
    pub last_report_category: Option<String>,
    pub report: LanguageMetrics,
    pub risk_factors: LanguageMetrics,
    pub management_discussion: LanguageMetrics,
}

impl CategoryMetrics for ReportMetrics {
    const CATEGORY: Category = Category::ReportAll;

    fn from_fields(fields: &[&str]) -> Result<Self> {
        let mut cursor = FieldCursor::new(fields, Self::field_count())?;
        Ok(Self {
            last_report_date: cursor.text(),
            last_report_category: cursor.text(),
            report: LanguageMetrics::read(&mut cursor)?,
            risk_factors: LanguageMetrics::read(&mut cursor)?,
            management_discussion: LanguageMetrics::read(&mut cursor)?,
        })
    }

    fn write_fields(&self, out: &mut Vec<String>) {
        out.push(format_text(&self.last_report_date));
        out.push(format_text(&self.last_report_category));
        self.report.write(out);
        self.risk_factors.write(out);
        self.management_discussion.write(out);
    }
}

/// Similarity of the whole filing against the previous one
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimilarityScores {
    pub all: Option<f64>,
    pub positive: Option<f64>,
    pub negative: Option<f64>,
    pub uncertainty: Option<f64>,
    pub litigious: Option<f64>,
    pub constraining: Option<f64>,
    pub interesting: Option<f64>,
}

/// Similarity of a single section against the previous filing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionSimilarity {
    pub all: Option<f64>,
    pub positive: Option<f64>,
    pub negative: Option<f64>,
}

/// BLMCF_V2_DIFF_ALL / BLMCF_V2_DIFF_10K
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDiffMetrics {
    pub last_report_date: Option<String>,
    pub last_report_category: Option<String>,
    pub last_report_period: Option<i64>,
    pub prev_report_date: Option<String>,
    pub prev_report_category: Option<String>,
    pub prev_report_period: Option<i64>,
    pub report: SimilarityScores,
    pub risk_factors: SectionSimilarity,
    pub management_discussion: SectionSimilarity,
}

impl ReportDiffMetrics {
    /// Fields left once the two columns duplicated from the report side are dropped
    pub const JOINED_FIELDS: usize = 17;

    /// Writes every field except `LAST_REPORT_DATE` / `LAST_REPORT_CATEGORY`
    pub fn write_joined_fields(&self, out: &mut Vec<String>) {
        out.push(format_count(self.last_report_period));
        out.push(format_text(&self.prev_report_date));
        out.push(format_text(&self.prev_report_category));
        out.push(format_count(self.prev_report_period));
        let r = &self.report;
        for value in [
            r.all,
            r.positive,
            r.negative,
            r.uncertainty,
            r.litigious,
            r.constraining,
            r.interesting,
        ] {
            out.push(format_float(value));
        }
        for section in [&self.risk_factors, &self.management_discussion] {
            out.push(format_float(section.all));
            out.push(format_float(section.positive));
            out.push(format_float(section.negative));
        }
    }
}

impl CategoryMetrics for ReportDiffMetrics {
    const CATEGORY: Category = Category::ReportDiffAll;

    fn from_fields(fields: &[&str]) -> Result<Self> {
        let mut cursor = FieldCursor::new(fields, Self::field_count())?;
        let last_report_date = cursor.text();
        let last_report_category = cursor.text();
        let last_report_period = cursor.count()?;
        let prev_report_date = cursor.text();
        let prev_report_category = cursor.text();
        let prev_report_period = cursor.count()?;
        let report = SimilarityScores {
            all: cursor.float()?,
            positive: cursor.float()?,
            negative: cursor.float()?,
            uncertainty: cursor.float()?,
            litigious: cursor.float()?,
            constraining: cursor.float()?,
            interesting: cursor.float()?,
        };
        let risk_factors = SectionSimilarity {
            all: cursor.float()?,
            positive: cursor.float()?,
            negative: cursor.float()?,
        };
        let management_discussion = SectionSimilarity {
            all: cursor.float()?,
            positive: cursor.float()?,
            negative: cursor.float()?,
        };

        Ok(Self {
            last_report_date,
            last_report_category,
            last_report_period,
            prev_report_date,
            prev_report_category,
            prev_report_period,
            report,
            risk_factors,
            management_discussion,
        })
    }

    fn write_fields(&self, out: &mut Vec<String>) {
        out.push(format_text(&self.last_report_date));
        out.push(format_text(&self.last_report_category));
        self.write_joined_fields(out);
    }
}

/// Report row joined with its diff row for the same (ticker, date)
#[derive(Debug, Clone, PartialEq)]
pub struct MergedReport {
    pub report: ReportMetrics,
    pub diff: Option<ReportDiffMetrics>,
}

impl MergedReport {
    /// 35 report fields followed by 17 diff fields
    pub const FIELDS: usize = 35 + ReportDiffMetrics::JOINED_FIELDS;

    pub fn write_fields(&self, out: &mut Vec<String>) {
        self.report.write_fields(out);
        match &self.diff {
            Some(diff) => diff.write_joined_fields(out),
            None => out.extend(std::iter::repeat(String::new()).take(ReportDiffMetrics::JOINED_FIELDS)),
        }
    }
}

/// Fields written after the date on a per-ticker output line
pub trait OutputFields {
    fn output_fields(&self, out: &mut Vec<String>);
}

impl OutputFields for RankingMetrics {
    fn output_fields(&self, out: &mut Vec<String>) {
        self.write_fields(out);
    }
}

impl OutputFields for SentimentMetrics {
    fn output_fields(&self, out: &mut Vec<String>) {
        self.write_fields(out);
    }
}

impl OutputFields for MergedReport {
    fn output_fields(&self, out: &mut Vec<String>) {
        self.write_fields(out);
    }
}

// Sanity check tying the typed layout to the vendor column tables
const _: () = assert!(LanguageMetrics::FIELDS * 3 + 2 == 35);
