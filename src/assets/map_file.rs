//! Ticker-mapping history (map files)
//!
//! Provides point-in-time symbol resolution with support for:
//! - Ticker renames over an instrument's lifetime
//! - Locating an instrument by any ticker it traded under
//! - Loading Lean-format map file directories
//!
//! A map file row `20100104,goog,Q` means the instrument traded as `GOOG` up
//! to and including 2010-01-04.

use crate::error::{EtlError, Result};
use crate::types::{parse_compact_date, Ticker};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use hashbrown::HashMap;
use std::collections::BTreeMap;
use std::path::Path;

/// One mapping row: the ticker in use up to and including `date`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFileRow {
    pub date: NaiveDate,
    pub mapped_symbol: Ticker,
    pub exchange: Option<String>,
}

impl MapFileRow {
    pub fn new(date: NaiveDate, mapped_symbol: &str) -> Self {
        Self {
            date,
            mapped_symbol: mapped_symbol.trim().to_uppercase(),
            exchange: None,
        }
    }
}

/// Mapping history of a single instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFile {
    permtick: Ticker,
    /// Sorted by date ascending
    rows: Vec<MapFileRow>,
}

impl MapFile {
    pub fn new(permtick: &str, mut rows: Vec<MapFileRow>) -> Self {
        rows.sort_by_key(|r| r.date);
        Self {
            permtick: permtick.trim().to_uppercase(),
            rows,
        }
    }

    /// Read a map file; the permanent ticker is taken from the file stem
    pub fn read(path: &Path) -> Result<Self> {
        let permtick = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| EtlError::DataError(format!("Invalid map file name: {}", path.display())))?
            .to_string();

        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let date = record.get(0).and_then(parse_compact_date);
            let symbol = record.get(1).map(str::trim).filter(|s| !s.is_empty());

            match (date, symbol) {
                (Some(date), Some(symbol)) => {
                    let mut row = MapFileRow::new(date, symbol);
                    row.exchange = record.get(2).map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
                    rows.push(row);
                }
                _ => log::warn!("Skipping malformed map file row in {}: {:?}", path.display(), record),
            }
        }

        Ok(Self::new(&permtick, rows))
    }

    pub fn permtick(&self) -> &str {
        &self.permtick
    }

    pub fn rows(&self) -> &[MapFileRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn first_ticker(&self) -> Option<&str> {
        self.rows.first().map(|r| r.mapped_symbol.as_str())
    }

    /// Ticker in use on `date`, or None after the last mapping row
    pub fn mapped_symbol(&self, date: NaiveDate) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.date >= date)
            .map(|r| r.mapped_symbol.as_str())
    }
}

/// Resolves tickers to the instrument whose history contains them
#[derive(Debug, Default)]
pub struct MapFileResolver {
    /// Map files by permanent ticker
    map_files: HashMap<Ticker, MapFile>,

    /// Symbol index: ticker → (row date → permanent ticker)
    by_symbol: HashMap<Ticker, BTreeMap<NaiveDate, Ticker>>,
}

impl MapFileResolver {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map_files(map_files: impl IntoIterator<Item = MapFile>) -> Self {
        let mut resolver = Self::empty();
        for map_file in map_files {
            resolver.insert(map_file);
        }
        resolver
    }

    /// Load every `*.csv` under `dir`. Unreadable files are logged and skipped.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut resolver = Self::empty();

        if !dir.is_dir() {
            log::warn!("Map file directory not found: {}", dir.display());
            return Ok(resolver);
        }

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            match MapFile::read(&path) {
                Ok(map_file) => resolver.insert(map_file),
                Err(e) => log::warn!("Failed to read map file {}: {}", path.display(), e),
            }
        }

        log::info!("Loaded {} map files from {}", resolver.len(), dir.display());
        Ok(resolver)
    }

    pub fn insert(&mut self, map_file: MapFile) {
        let permtick = map_file.permtick().to_string();
        for row in map_file.rows() {
            self.by_symbol
                .entry(row.mapped_symbol.clone())
                .or_default()
                .insert(row.date, permtick.clone());
        }
        self.map_files.insert(permtick, map_file);
    }

    pub fn len(&self) -> usize {
        self.map_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map_files.is_empty()
    }

    /// Map file of the instrument that traded as `symbol` on `as_of`.
    ///
    /// Dates past the symbol's last mapping row resolve to its most recent
    /// instrument. Returns None when no history covers `as_of`.
    pub fn resolve(&self, symbol: &str, as_of: NaiveDate) -> Option<&MapFile> {
        let symbol = symbol.trim().to_uppercase();

        let permtick = match self.by_symbol.get(&symbol) {
            Some(entries) => entries
                .range(as_of..)
                .next()
                .or_else(|| entries.iter().next_back())
                .map(|(_, permtick)| permtick.clone())
                .unwrap_or(symbol),
            None => symbol,
        };

        self.map_files
            .get(&permtick)
            .filter(|map_file| map_file.first_date().map_or(false, |first| first <= as_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// FB renamed to META on 2022-06-09
    fn meta_map_file() -> MapFile {
        MapFile::new(
            "fb",
            vec![
                MapFileRow::new(date(2012, 5, 18), "fb"),
                MapFileRow::new(date(2022, 6, 8), "fb"),
                MapFileRow::new(date(2050, 12, 31), "meta"),
            ],
        )
    }

    #[test]
    fn test_mapped_symbol_point_in_time() {
        let map_file = meta_map_file();
        assert_eq!(map_file.mapped_symbol(date(2020, 1, 2)), Some("FB"));
        assert_eq!(map_file.mapped_symbol(date(2022, 6, 8)), Some("FB"));
        assert_eq!(map_file.mapped_symbol(date(2022, 6, 9)), Some("META"));
        assert_eq!(map_file.mapped_symbol(date(2051, 1, 1)), None);
    }

    #[test]
    fn test_resolve_by_current_ticker() {
        let resolver = MapFileResolver::from_map_files(vec![meta_map_file()]);

        let map_file = resolver.resolve("META", date(2024, 1, 1)).unwrap();
        assert_eq!(map_file.permtick(), "FB");
        assert_eq!(map_file.mapped_symbol(date(2020, 1, 2)), Some("FB"));
    }

    #[test]
    fn test_resolve_before_listing_is_none() {
        let resolver = MapFileResolver::from_map_files(vec![meta_map_file()]);
        assert!(resolver.resolve("FB", date(2010, 1, 1)).is_none());
        assert!(resolver.resolve("UNKNOWN", date(2020, 1, 1)).is_none());
    }

    #[test]
    fn test_reused_ticker_resolves_by_date() {
        // "ABC" first belongs to one instrument, later to another
        let old = MapFile::new(
            "abc",
            vec![
                MapFileRow::new(date(2000, 1, 3), "abc"),
                MapFileRow::new(date(2010, 6, 30), "abc"),
            ],
        );
        let new = MapFile::new(
            "abc.1",
            vec![
                MapFileRow::new(date(2015, 1, 2), "abc"),
                MapFileRow::new(date(2050, 12, 31), "abc"),
            ],
        );
        let resolver = MapFileResolver::from_map_files(vec![old, new]);

        assert_eq!(resolver.resolve("ABC", date(2005, 1, 3)).unwrap().permtick(), "ABC");
        assert_eq!(resolver.resolve("ABC", date(2020, 1, 3)).unwrap().permtick(), "ABC.1");
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("fb.csv")).unwrap();
        writeln!(file, "20120518,fb,Q\n20220608,fb,Q\nbad,row\n20501231,meta,Q").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let resolver = MapFileResolver::from_dir(dir.path()).unwrap();
        assert_eq!(resolver.len(), 1);

        let map_file = resolver.resolve("meta", date(2023, 1, 1)).unwrap();
        assert_eq!(map_file.rows().len(), 3);
        assert_eq!(map_file.rows()[0].exchange.as_deref(), Some("Q"));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let resolver = MapFileResolver::from_dir(Path::new("/nonexistent/map_files")).unwrap();
        assert!(resolver.is_empty());
    }
}
