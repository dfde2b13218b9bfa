//! Security definition database and the FIGI lookup table built from it

use super::security_id::SecurityIdentifier;
use crate::error::{EtlError, Result};
use hashbrown::{HashMap, HashSet};
#[cfg(feature = "rusqlite-support")]
use rusqlite::{params, Connection, OpenFlags};
#[cfg(feature = "rusqlite-support")]
use std::path::Path;

/// One row of the reference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityDefinition {
    pub figi: String,
    pub sid: String,
    pub ticker: Option<String>,
}

impl SecurityDefinition {
    pub fn new(figi: &str, sid: &str) -> Self {
        Self {
            figi: figi.to_string(),
            sid: sid.to_string(),
            ticker: None,
        }
    }
}

/// Anything that can list security definitions, most recent first
pub trait SecurityDefinitionSource {
    fn fetch_definitions(&self) -> Result<Vec<SecurityDefinition>>;
}

/// Read-only access to the security definition table (SQLite backend)
#[cfg(feature = "rusqlite-support")]
pub struct SecurityDefinitionDb {
    conn: Connection,
    table: String,
}

#[cfg(feature = "rusqlite-support")]
impl SecurityDefinitionDb {
    /// Open an existing database read-only
    pub fn open(db_path: &Path, table: &str) -> Result<Self> {
        let table = validate_table_name(table)?;
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| EtlError::DataError(format!("Failed to open database {}: {}", db_path.display(), e)))?;
        Ok(Self { conn, table })
    }

    /// Create (or open) a writable database file with the reference table
    pub fn create(db_path: &Path, table: &str) -> Result<Self> {
        let table = validate_table_name(table)?;
        let conn = Connection::open(db_path)?;
        let db = Self { conn, table };
        db.create_table()?;
        Ok(db)
    }

    /// Create in-memory database with an empty table (for testing)
    pub fn new_in_memory(table: &str) -> Result<Self> {
        let table = validate_table_name(table)?;
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, table };
        db.create_table()?;
        Ok(db)
    }

    /// Create the reference table if missing
    pub fn create_table(&self) -> Result<()> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    figi TEXT,
                    sid TEXT,
                    ticker TEXT
                )",
                self.table
            ),
            [],
        )?;
        Ok(())
    }

    /// Append a definition; later inserts take precedence on lookup
    pub fn insert(&self, definition: &SecurityDefinition) -> Result<i64> {
        self.conn.execute(
            &format!("INSERT INTO {} (figi, sid, ticker) VALUES (?1, ?2, ?3)", self.table),
            params![&definition.figi, &definition.sid, &definition.ticker],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(feature = "rusqlite-support")]
impl SecurityDefinitionSource for SecurityDefinitionDb {
    fn fetch_definitions(&self) -> Result<Vec<SecurityDefinition>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT figi, sid, ticker FROM {} ORDER BY id DESC",
            self.table
        ))?;

        let definitions = stmt
            .query_map([], |row| {
                Ok(SecurityDefinition {
                    figi: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                    sid: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    ticker: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(definitions)
    }
}

fn validate_table_name(table: &str) -> Result<String> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(table.to_string())
    } else {
        Err(EtlError::ConfigError(format!("Invalid table name: {}", table)))
    }
}

/// Build status of the lookup table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    /// `build` has not run yet
    NotBuilt,
    /// No database configured or it could not be queried
    Unavailable,
    /// The query returned no usable rows
    Failed,
    Ready,
}

/// FIGI → security identifier, built once per process
#[derive(Debug)]
pub struct IdentifierLookupTable {
    state: LookupState,
    entries: HashMap<String, SecurityIdentifier>,
}

impl IdentifierLookupTable {
    pub fn new() -> Self {
        Self {
            state: LookupState::NotBuilt,
            entries: HashMap::new(),
        }
    }

    /// Table that never resolves anything; the resolver always falls back
    pub fn unavailable() -> Self {
        Self {
            state: LookupState::Unavailable,
            entries: HashMap::new(),
        }
    }

    /// Query `source` and populate the table. Runs at most once; later calls
    /// return the state of the first build.
    pub fn build(&mut self, source: Option<&dyn SecurityDefinitionSource>) -> LookupState {
        if self.state != LookupState::NotBuilt {
            return self.state;
        }

        let Some(source) = source else {
            log::warn!("No connection to the security definition database");
            self.state = LookupState::Unavailable;
            return self.state;
        };

        match source.fetch_definitions() {
            Ok(definitions) => self.load(definitions),
            Err(e) => {
                log::warn!("Failed to query security definitions: {}", e);
                self.state = LookupState::Unavailable;
            }
        }

        if self.state == LookupState::Failed {
            log::warn!("Failed to create FIGI lookup table");
        }
        self.state
    }

    /// Populate from definitions ordered most recent first
    pub fn from_definitions(definitions: Vec<SecurityDefinition>) -> Self {
        let mut table = Self::new();
        table.load(definitions);
        table
    }

    fn load(&mut self, definitions: Vec<SecurityDefinition>) {
        if definitions.is_empty() {
            log::warn!("Database contains no FIGI/SID entries");
            self.state = LookupState::Failed;
            return;
        }

        // The most recent row per FIGI decides, even when it turns out unusable
        let mut seen: HashSet<String> = HashSet::new();

        for definition in definitions {
            if !seen.insert(definition.figi.clone()) {
                continue;
            }

            let figi = definition.figi.trim();
            let sid = definition.sid.trim();
            if figi.is_empty() || sid.is_empty() {
                continue;
            }

            match SecurityIdentifier::parse(sid) {
                Ok(identifier) => {
                    self.entries.insert(figi.to_string(), identifier);
                }
                Err(_) => log::warn!("Failed to parse SID: {} for Security: {}", sid, figi),
            }
        }

        self.state = if self.entries.is_empty() {
            LookupState::Failed
        } else {
            LookupState::Ready
        };
        log::info!("FIGI lookup table built with {} entries", self.entries.len());
    }

    pub fn state(&self) -> LookupState {
        self.state
    }

    pub fn get(&self, figi: &str) -> Option<&SecurityIdentifier> {
        if self.state != LookupState::Ready {
            return None;
        }
        self.entries.get(figi.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for IdentifierLookupTable {
    fn default() -> Self {
        Self::new()
    }
}
