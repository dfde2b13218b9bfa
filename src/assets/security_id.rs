//! Lean security identifiers
//!
//! A security identifier is the instrument's first ticker plus a base-36
//! encoded properties word: `days * 10^14 + market * 100 + security_type`,
//! where `days` counts from 1899-12-30. The first ticker and first date never
//! change across renames, which makes the identifier stable for the
//! instrument's lifetime.

use super::map_file::MapFileResolver;
use crate::error::{EtlError, Result};
use chrono::{Duration, NaiveDate};
use std::fmt;
use std::str::FromStr;

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const SECURITY_TYPE_WIDTH: u64 = 100;
const MARKET_OFFSET: u64 = SECURITY_TYPE_WIDTH;
const MARKET_WIDTH: u64 = 1000;
const DAYS_OFFSET: u64 = 100_000_000_000_000;

/// Market code for US equities
pub const MARKET_USA: u16 = 1;

/// Security type code for equities
pub const SECURITY_TYPE_EQUITY: u8 = 1;

/// Date assigned to instruments listed before map-file coverage begins
pub fn default_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1998, 1, 2).expect("valid constant date")
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("valid constant date")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityIdentifier {
    /// Ticker the instrument first traded under
    pub symbol: String,
    /// First date of the instrument's mapping history
    pub date: NaiveDate,
    pub market: u16,
    pub security_type: u8,
}

impl SecurityIdentifier {
    pub fn new(symbol: impl Into<String>, date: NaiveDate, market: u16, security_type: u8) -> Self {
        Self {
            symbol: symbol.into().to_uppercase(),
            date,
            market,
            security_type,
        }
    }

    /// US equity identifier for `ticker` as it was known on `as_of`.
    ///
    /// Uses the map file's first ticker and first date, falling back to the
    /// given ticker and the default date when no mapping history exists.
    pub fn generate_equity(ticker: &str, resolver: &MapFileResolver, as_of: NaiveDate) -> Self {
        let first = resolver
            .resolve(ticker, as_of)
            .and_then(|map_file| Some((map_file.first_ticker()?, map_file.first_date()?)));
        let (symbol, date) = match first {
            Some((first_ticker, first_date)) => (first_ticker.to_string(), first_date),
            None => (ticker.to_string(), default_date()),
        };
        Self::new(symbol, date, MARKET_USA, SECURITY_TYPE_EQUITY)
    }

    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split_whitespace();
        let (symbol, encoded) = match (parts.next(), parts.next(), parts.next()) {
            (Some(symbol), Some(encoded), None) => (symbol, encoded),
            _ => return Err(EtlError::InvalidSecurityId(value.to_string())),
        };

        let properties = decode_base36(encoded)
            .ok_or_else(|| EtlError::InvalidSecurityId(value.to_string()))?;

        let security_type = (properties % SECURITY_TYPE_WIDTH) as u8;
        let market = ((properties / MARKET_OFFSET) % MARKET_WIDTH) as u16;
        let days = properties / DAYS_OFFSET;
        let date = epoch()
            .checked_add_signed(Duration::days(days as i64))
            .ok_or_else(|| EtlError::InvalidSecurityId(value.to_string()))?;

        if security_type == 0 || market == 0 {
            return Err(EtlError::InvalidSecurityId(value.to_string()));
        }

        Ok(Self::new(symbol, date, market, security_type))
    }

    fn properties(&self) -> u64 {
        let days = (self.date - epoch()).num_days().max(0) as u64;
        days * DAYS_OFFSET + self.market as u64 * MARKET_OFFSET + self.security_type as u64
    }
}

impl fmt::Display for SecurityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.symbol, encode_base36(self.properties()))
    }
}

impl FromStr for SecurityIdentifier {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn encode_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn decode_base36(encoded: &str) -> Option<u64> {
    encoded.chars().try_fold(0u64, |acc, c| {
        let digit = c.to_ascii_uppercase().to_digit(36)? as u64;
        acc.checked_mul(36)?.checked_add(digit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_identifier() {
        let sid = SecurityIdentifier::parse("AAPL R735QTJ8XC9X").unwrap();
        assert_eq!(sid.symbol, "AAPL");
        assert_eq!(sid.date, default_date());
        assert_eq!(sid.market, MARKET_USA);
        assert_eq!(sid.security_type, SECURITY_TYPE_EQUITY);
    }

    #[test]
    fn test_display_inverts_parse() {
        let sid = SecurityIdentifier::parse("AAPL R735QTJ8XC9X").unwrap();
        assert_eq!(sid.to_string(), "AAPL R735QTJ8XC9X");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(SecurityIdentifier::parse("").is_err());
        assert!(SecurityIdentifier::parse("AAPL").is_err());
        assert!(SecurityIdentifier::parse("AAPL !!!").is_err());
        assert!(SecurityIdentifier::parse("AAPL R735QTJ8XC9X extra").is_err());
    }

    #[test]
    fn test_generate_without_history_uses_default_date() {
        let resolver = MapFileResolver::empty();
        let date = NaiveDate::from_ymd_opt(2021, 2, 1).unwrap();
        let sid = SecurityIdentifier::generate_equity("aapl", &resolver, date);
        assert_eq!(sid.to_string(), "AAPL R735QTJ8XC9X");
    }

    #[test]
    fn test_generate_uses_first_ticker_and_date() {
        use super::super::map_file::{MapFile, MapFileRow};

        let listed = NaiveDate::from_ymd_opt(2012, 5, 18).unwrap();
        let resolver = MapFileResolver::from_map_files(vec![MapFile::new(
            "fb",
            vec![
                MapFileRow::new(listed, "fb"),
                MapFileRow::new(NaiveDate::from_ymd_opt(2022, 6, 8).unwrap(), "fb"),
                MapFileRow::new(NaiveDate::from_ymd_opt(2050, 12, 31).unwrap(), "meta"),
            ],
        )]);

        let as_of = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let sid = SecurityIdentifier::generate_equity("META", &resolver, as_of);
        assert_eq!(sid.symbol, "FB");
        assert_eq!(sid.date, listed);

        let round_trip = SecurityIdentifier::parse(&sid.to_string()).unwrap();
        assert_eq!(round_trip, sid);
    }
}
