//! Vendor data handling: parsing, merging, partitioned output and universes

pub mod converters;
pub mod frame;
pub mod merge;
pub mod parser;
pub mod universe;
pub mod writer;

pub use converters::{ConverterDataset, DataConverter};
pub use frame::{deduplicate, CategoryFrame, OutputFrame, OutputRow, Record, RecordKey, SourceFile, SourceRank};
pub use merge::ReportMerger;
pub use parser::CategoryParser;
pub use universe::{UniverseAggregator, UNIVERSE_DIR};
pub use writer::{PartitionWriter, WriteManifest, WrittenFile};
