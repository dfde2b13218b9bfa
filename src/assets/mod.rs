//! Security reference data: identifiers, mapping history and the FIGI table

pub mod asset_db;
pub mod map_file;
pub mod resolver;
pub mod security_id;

#[cfg(feature = "rusqlite-support")]
pub use asset_db::SecurityDefinitionDb;
pub use asset_db::{IdentifierLookupTable, LookupState, SecurityDefinition, SecurityDefinitionSource};
pub use map_file::{MapFile, MapFileResolver, MapFileRow};
pub use resolver::TickerResolver;
pub use security_id::SecurityIdentifier;
