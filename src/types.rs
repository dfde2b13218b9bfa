//! Core types and constants

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange ticker symbol
pub type Ticker = String;

/// Date format used by raw vendor files and report date columns
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Compact date format used in file names and output rows
pub const OUTPUT_DATE_FORMAT: &str = "%Y%m%d";

/// Year-month format of per-ticker partition directories
pub const MONTH_FORMAT: &str = "%Y%m";

/// Lookback horizon in days attached to sentiment and ranking records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lookback(pub u32);

impl Lookback {
    pub fn days(&self) -> u32 {
        self.0
    }

    /// Directory / column label, e.g. "7"
    pub fn label(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive date range a run is allowed to write and aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ProcessingWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Calendar month containing `date`
    pub fn month_of(date: NaiveDate) -> Self {
        let start = month_start(date);
        Self {
            start,
            end: month_end(date),
        }
    }

    /// Both ends are inclusive
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Monday through Friday dates in the window
    pub fn business_days(&self) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = self.start;
        while current <= self.end {
            if is_business_day(current) {
                days.push(current);
            }
            current += Duration::days(1);
        }
        days
    }
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

/// Last day of the month containing `date`
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|next| next - Duration::days(1))
        .unwrap_or(date)
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Parse a `YYYYMMDD` string
pub fn parse_compact_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), OUTPUT_DATE_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(month_start(date(2021, 2, 17)), date(2021, 2, 1));
        assert_eq!(month_end(date(2021, 2, 17)), date(2021, 2, 28));
        assert_eq!(month_end(date(2020, 2, 3)), date(2020, 2, 29));
        assert_eq!(month_end(date(2021, 12, 5)), date(2021, 12, 31));
    }

    #[test]
    fn test_window_is_inclusive() {
        let window = ProcessingWindow::month_of(date(2021, 2, 10));
        assert!(window.contains(date(2021, 2, 1)));
        assert!(window.contains(date(2021, 2, 28)));
        assert!(!window.contains(date(2021, 3, 1)));
        assert!(!window.contains(date(2021, 1, 31)));
    }

    #[test]
    fn test_business_days_skip_weekends() {
        // 2021-02-05 is a Friday
        let window = ProcessingWindow::new(date(2021, 2, 5), date(2021, 2, 8));
        assert_eq!(window.business_days(), vec![date(2021, 2, 5), date(2021, 2, 8)]);
    }

    #[test]
    fn test_parse_compact_date() {
        assert_eq!(parse_compact_date("20210201"), Some(date(2021, 2, 1)));
        assert_eq!(parse_compact_date("2021-02-01"), None);
    }
}
