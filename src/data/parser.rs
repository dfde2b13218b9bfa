//! Raw vendor CSV parsing with point-in-time ticker resolution

use super::frame::{CategoryFrame, Record, SourceFile, SourceRank};
use crate::assets::TickerResolver;
use crate::category::Category;
use crate::error::{EtlError, Result};
use crate::records::{CategoryMetrics, RankingMetrics, ReportDiffMetrics, ReportMetrics, SentimentMetrics};
use crate::types::Lookback;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::path::Path;

const TICKER_COLUMN: &str = "TICKER";
const EXCHANGE_TICKER_COLUMN: &str = "PRIMARY_EXCHANGE_TICKER";
const FIGI_COLUMN: &str = "COMPOSITE_FIGI";

/// Parses one raw file into resolved records of its category
pub struct CategoryParser<'a> {
    resolver: &'a TickerResolver,
}

impl<'a> CategoryParser<'a> {
    pub fn new(resolver: &'a TickerResolver) -> Self {
        Self { resolver }
    }

    /// Parse a downloaded source file, ranking its rows by the file's date
    /// and download sequence
    pub fn parse_source(&self, source: &SourceFile) -> Result<CategoryFrame> {
        self.parse_ranked(&source.path, source.category, source.date, source.lookback, source.sequence)
    }

    /// Parse `file` whose rows are all dated `date`.
    ///
    /// A missing file yields an empty frame. A missing metric column is a
    /// `SchemaMismatch`.
    pub fn parse(
        &self,
        file: &Path,
        category: Category,
        date: NaiveDate,
        lookback: Option<Lookback>,
    ) -> Result<CategoryFrame> {
        self.parse_ranked(file, category, date, lookback, 0)
    }

    fn parse_ranked(
        &self,
        file: &Path,
        category: Category,
        date: NaiveDate,
        lookback: Option<Lookback>,
        sequence: usize,
    ) -> Result<CategoryFrame> {
        if !file.exists() {
            log::debug!("No {} data at {}", category, file.display());
            return Ok(CategoryFrame::empty(category));
        }

        let ctx = ParseContext {
            file,
            category,
            date,
            lookback,
            sequence,
        };

        let frame = match category {
            Category::Rankings => CategoryFrame::Rankings(self.read_records::<RankingMetrics>(&ctx)?),
            Category::Sentiment => CategoryFrame::Sentiment(self.read_records::<SentimentMetrics>(&ctx)?),
            Category::Report10K | Category::ReportAll => {
                CategoryFrame::Report(category, self.read_records::<ReportMetrics>(&ctx)?)
            }
            Category::ReportDiff10K | Category::ReportDiffAll => {
                CategoryFrame::ReportDiff(category, self.read_records::<ReportDiffMetrics>(&ctx)?)
            }
        };

        log::info!("Parsed {} {} records from {}", frame.len(), category, file.display());
        Ok(frame)
    }

    fn read_records<M: CategoryMetrics>(&self, ctx: &ParseContext<'_>) -> Result<Vec<Record<M>>> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(ctx.file)
            .map_err(|e| EtlError::DataError(format!("Failed to open {}: {}", ctx.file.display(), e)))?;

        let headers = rdr.headers()?.clone();

        let ticker_idx = find_column(&headers, TICKER_COLUMN).or_else(|| find_column(&headers, EXCHANGE_TICKER_COLUMN));
        let figi_idx = find_column(&headers, FIGI_COLUMN);
        if ticker_idx.is_none() && figi_idx.is_none() {
            log::warn!("{} has neither a ticker nor a FIGI column", ctx.file.display());
        }

        let metric_idx = ctx
            .category
            .columns()
            .iter()
            .map(|column| {
                find_column(&headers, column).ok_or_else(|| EtlError::SchemaMismatch {
                    category: ctx.category.code().to_string(),
                    file: ctx.file.display().to_string(),
                    column: column.to_string(),
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut records = Vec::new();
        let mut unresolved = 0usize;

        for (row, result) in rdr.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    log::warn!("Skipping unreadable row {} of {}: {}", row + 1, ctx.file.display(), e);
                    continue;
                }
            };

            let figi = figi_idx.and_then(|i| non_blank(record.get(i)));
            let raw_ticker = ticker_idx.and_then(|i| non_blank(record.get(i)));

            let Some(ticker) = self.resolver.resolve(figi, raw_ticker, ctx.date) else {
                log::trace!("Unresolved row {:?}/{:?} in {}", figi, raw_ticker, ctx.file.display());
                unresolved += 1;
                continue;
            };

            let fields: Vec<&str> = metric_idx.iter().map(|&i| record.get(i).unwrap_or("")).collect();
            let metrics = match M::from_fields(&fields) {
                Ok(metrics) => metrics,
                Err(e) => {
                    log::warn!("Skipping row {} of {} for {}: {}", row + 1, ctx.file.display(), ticker, e);
                    continue;
                }
            };

            records.push(Record {
                ticker,
                date: ctx.date,
                lookback: ctx.lookback,
                figi: figi.map(str::to_string),
                rank: SourceRank {
                    file_date: ctx.date,
                    sequence: ctx.sequence,
                    row,
                },
                metrics,
            });
        }

        if unresolved > 0 {
            log::debug!("{} rows of {} had no resolvable ticker", unresolved, ctx.file.display());
        }
        Ok(records)
    }
}

struct ParseContext<'a> {
    file: &'a Path,
    category: Category,
    date: NaiveDate,
    lookback: Option<Lookback>,
    sequence: usize,
}

fn find_column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case(name))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
