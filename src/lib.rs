//! # Brain ETL
//!
//! Batch processing of Brain alternative-data extracts into the per-ticker
//! and universe file layout read by the Lean trading engine.
//!
//! A run downloads the raw CSV files of a processing window, resolves each
//! row's FIGI or ticker to the symbol valid on the row's date, merges report
//! metrics with their filing differences and writes one file per ticker and
//! month. Universe snapshots are then rebuilt from those files, one file
//! per date.
//!
//! ## Example
//!
//! ```rust,no_run
//! use brain_etl::prelude::*;
//! use brain_etl::storage::{plan_downloads, Downloader};
//!
//! fn main() -> Result<()> {
//!     let config = PipelineConfig::load_with_env(None)?;
//!     let today = chrono::Local::now().date_naive();
//!     let window = config.window(today)?;
//!
//!     let downloader = Downloader::new(config.object_store()?, &config.staging_dir);
//!     let files = downloader.download_all(&plan_downloads(&window))?;
//!
//!     let processor = BrainProcessor::from_config(&config, window, today)?;
//!     processor.run(&files)?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod category;
pub mod config;
pub mod data;
pub mod error;
pub mod processor;
pub mod records;
pub mod storage;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::assets::{IdentifierLookupTable, MapFileResolver, SecurityIdentifier, TickerResolver};
    pub use crate::category::Category;
    pub use crate::config::PipelineConfig;
    pub use crate::data::{CategoryParser, PartitionWriter, ReportMerger, SourceFile, UniverseAggregator, WriteManifest};
    pub use crate::error::{EtlError, Result};
    pub use crate::processor::{BrainProcessor, ProcessSummary};
    pub use crate::types::*;
}
