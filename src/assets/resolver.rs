//! Point-in-time ticker resolution for vendor rows

use super::asset_db::IdentifierLookupTable;
use super::map_file::MapFileResolver;
use crate::types::Ticker;
use chrono::NaiveDate;

/// Resolves (FIGI, raw ticker, date) to the ticker valid on that date.
///
/// Resolution order:
/// 1. FIGI → security identifier via the lookup table, then the instrument's
///    mapping history at the record date.
/// 2. The raw ticker's mapping history as of `today`, read at the record date.
/// 3. None; the caller drops the record.
pub struct TickerResolver {
    lookup: IdentifierLookupTable,
    map_files: MapFileResolver,
    today: NaiveDate,
}

impl TickerResolver {
    pub fn new(lookup: IdentifierLookupTable, map_files: MapFileResolver, today: NaiveDate) -> Self {
        Self {
            lookup,
            map_files,
            today,
        }
    }

    pub fn map_files(&self) -> &MapFileResolver {
        &self.map_files
    }

    pub fn lookup(&self) -> &IdentifierLookupTable {
        &self.lookup
    }

    pub fn resolve(&self, figi: Option<&str>, ticker: Option<&str>, as_of: NaiveDate) -> Option<Ticker> {
        figi.and_then(|figi| self.resolve_figi(figi, as_of))
            .or_else(|| ticker.and_then(|ticker| self.resolve_ticker(ticker, as_of)))
    }

    fn resolve_figi(&self, figi: &str, as_of: NaiveDate) -> Option<Ticker> {
        let sid = self.lookup.get(figi)?;
        self.map_files
            .resolve(&sid.symbol, sid.date)?
            .mapped_symbol(as_of)
            .map(str::to_string)
    }

    fn resolve_ticker(&self, ticker: &str, as_of: NaiveDate) -> Option<Ticker> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return None;
        }
        self.map_files
            .resolve(ticker, self.today)?
            .mapped_symbol(as_of)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::asset_db::SecurityDefinition;
    use crate::assets::map_file::{MapFile, MapFileRow};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn map_files() -> MapFileResolver {
        MapFileResolver::from_map_files(vec![
            MapFile::new(
                "aapl",
                vec![
                    MapFileRow::new(date(1998, 1, 2), "aapl"),
                    MapFileRow::new(date(2050, 12, 31), "aapl"),
                ],
            ),
            MapFile::new(
                "fb",
                vec![
                    MapFileRow::new(date(2012, 5, 18), "fb"),
                    MapFileRow::new(date(2022, 6, 8), "fb"),
                    MapFileRow::new(date(2050, 12, 31), "meta"),
                ],
            ),
        ])
    }

    fn resolver(lookup: IdentifierLookupTable) -> TickerResolver {
        TickerResolver::new(lookup, map_files(), date(2024, 1, 2))
    }

    #[test]
    fn test_figi_resolves_historical_ticker() {
        let fb_sid = crate::assets::SecurityIdentifier::new("FB", date(2012, 5, 18), 1, 1).to_string();
        let lookup = IdentifierLookupTable::from_definitions(vec![SecurityDefinition::new("BBG000MM2P62", &fb_sid)]);
        let resolver = resolver(lookup);

        assert_eq!(resolver.resolve(Some("BBG000MM2P62"), None, date(2021, 2, 1)).as_deref(), Some("FB"));
        assert_eq!(resolver.resolve(Some("BBG000MM2P62"), None, date(2023, 2, 1)).as_deref(), Some("META"));
    }

    #[test]
    fn test_ticker_fallback_uses_current_history() {
        let resolver = resolver(IdentifierLookupTable::unavailable());

        // Today's ticker finds the instrument, the record date picks the symbol
        assert_eq!(resolver.resolve(None, Some("META"), date(2021, 2, 1)).as_deref(), Some("FB"));
        assert_eq!(resolver.resolve(Some("BBG000MM2P62"), Some("aapl"), date(2021, 2, 1)).as_deref(), Some("AAPL"));
    }

    #[test]
    fn test_unmapped_figi_falls_through_to_ticker() {
        // SID whose instrument has no map file
        let lookup = IdentifierLookupTable::from_definitions(vec![SecurityDefinition::new(
            "BBG000DELIST",
            "GONE R735QTJ8XC9X",
        )]);
        let resolver = resolver(lookup);

        assert_eq!(resolver.resolve(Some("BBG000DELIST"), Some("AAPL"), date(2021, 2, 1)).as_deref(), Some("AAPL"));
        assert_eq!(resolver.resolve(Some("BBG000DELIST"), None, date(2021, 2, 1)), None);
    }

    #[test]
    fn test_unknown_everything_is_none() {
        let resolver = resolver(IdentifierLookupTable::unavailable());
        assert_eq!(resolver.resolve(None, None, date(2021, 2, 1)), None);
        assert_eq!(resolver.resolve(None, Some("  "), date(2021, 2, 1)), None);
        assert_eq!(resolver.resolve(None, Some("ZZZZ"), date(2021, 2, 1)), None);
    }
}
