//! End-to-end processing of one run's downloaded files

use crate::assets::{IdentifierLookupTable, MapFileResolver, TickerResolver};
use crate::category::Category;
use crate::config::PipelineConfig;
use crate::data::{
    CategoryFrame, CategoryParser, OutputFrame, PartitionWriter, ReportMerger, SourceFile, UniverseAggregator,
    WriteManifest,
};
use crate::error::Result;
use crate::types::{month_start, ProcessingWindow};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub files_parsed: usize,
    pub files_skipped: usize,
    pub records_written: usize,
    pub ticker_files: usize,
    pub universe_files: usize,
}

/// Parse → deduplicate → merge reports → drop pre-month records → write →
/// aggregate universes
pub struct BrainProcessor {
    resolver: TickerResolver,
    output_root: PathBuf,
    window: ProcessingWindow,
}

impl BrainProcessor {
    pub fn new(resolver: TickerResolver, output_root: impl Into<PathBuf>, window: ProcessingWindow) -> Self {
        Self {
            resolver,
            output_root: output_root.into(),
            window,
        }
    }

    /// Load map files and build the FIGI lookup table from the configured
    /// database. An unusable database leaves the table unavailable.
    pub fn from_config(config: &PipelineConfig, window: ProcessingWindow, today: NaiveDate) -> Result<Self> {
        let map_files = MapFileResolver::from_dir(&config.map_files_dir)?;
        let lookup = build_lookup(config);
        let resolver = TickerResolver::new(lookup, map_files, today);
        Ok(Self::new(resolver, &config.output_root, window))
    }

    pub fn resolver(&self) -> &TickerResolver {
        &self.resolver
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn window(&self) -> ProcessingWindow {
        self.window
    }

    /// Parse and reshape `files` into writable frames, one per output category
    pub fn build_frames(&self, files: &[SourceFile], summary: &mut ProcessSummary) -> Result<Vec<OutputFrame>> {
        let parser = CategoryParser::new(&self.resolver);
        let mut frames: BTreeMap<Category, CategoryFrame> = BTreeMap::new();

        for file in files {
            match parser.parse_source(file) {
                Ok(frame) => {
                    summary.files_parsed += 1;
                    frames
                        .entry(file.category)
                        .or_insert_with(|| CategoryFrame::empty(file.category))
                        .extend(frame);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    summary.files_skipped += 1;
                    log::warn!("Skipping {}: {}", file.path.display(), e);
                }
            }
        }

        let mut frames: BTreeMap<Category, CategoryFrame> = frames
            .into_iter()
            .map(|(category, frame)| (category, frame.deduplicated()))
            .collect();

        let mut outputs = Vec::new();
        for category in [Category::Report10K, Category::ReportAll] {
            let merger = ReportMerger::new(category)?;
            let diff = category.diff_counterpart().and_then(|c| frames.remove(&c));
            outputs.push(merger.merge_frames(frames.remove(&category), diff)?);
        }
        if let Some(CategoryFrame::Rankings(records)) = frames.remove(&Category::Rankings) {
            outputs.push(OutputFrame::Rankings(records));
        }
        if let Some(CategoryFrame::Sentiment(records)) = frames.remove(&Category::Sentiment) {
            outputs.push(OutputFrame::Sentiment(records));
        }

        // Files dated before the processing month never reach the output
        let start = month_start(self.window.start);
        for frame in &mut outputs {
            frame.retain_from(start);
            if frame.is_empty() {
                log::info!("No data for category: {}", frame.category());
            }
        }
        outputs.retain(|frame| !frame.is_empty());
        Ok(outputs)
    }

    /// Write the per-ticker files for `files`
    pub fn process(&self, files: &[SourceFile]) -> Result<(WriteManifest, ProcessSummary)> {
        let mut summary = ProcessSummary::default();
        let frames = self.build_frames(files, &mut summary)?;
        summary.records_written = frames.iter().map(OutputFrame::len).sum();

        let writer = PartitionWriter::new(&self.output_root);
        let manifest = writer.write_all(&frames)?;
        summary.ticker_files = manifest.len();
        Ok((manifest, summary))
    }

    /// Rebuild every universe; `None` walks the output tree instead of
    /// reading a manifest
    pub fn generate_universe(&self, manifest: Option<&WriteManifest>) -> Result<Vec<PathBuf>> {
        let aggregator = UniverseAggregator::new(&self.output_root, self.resolver.map_files(), self.window);
        aggregator.aggregate_all(manifest)
    }

    /// `process` followed by universe generation from its manifest
    pub fn run(&self, files: &[SourceFile]) -> Result<ProcessSummary> {
        let (manifest, mut summary) = self.process(files)?;
        summary.universe_files = self.generate_universe(Some(&manifest))?.len();
        log::info!(
            "Processed {} files into {} ticker files and {} universe files",
            summary.files_parsed,
            summary.ticker_files,
            summary.universe_files
        );
        Ok(summary)
    }
}

#[cfg(feature = "rusqlite-support")]
fn build_lookup(config: &PipelineConfig) -> IdentifierLookupTable {
    use crate::assets::{SecurityDefinitionDb, SecurityDefinitionSource};

    let mut lookup = IdentifierLookupTable::new();
    let db = match &config.database.path {
        Some(path) if path.exists() => match SecurityDefinitionDb::open(path, &config.database.table) {
            Ok(db) => Some(db),
            Err(e) => {
                log::warn!("Security definition database unavailable: {}", e);
                None
            }
        },
        Some(path) => {
            log::warn!("Security definition database {} not found", path.display());
            None
        }
        None => None,
    };

    let source = db.as_ref().map(|db| db as &dyn SecurityDefinitionSource);
    lookup.build(source);
    lookup
}

#[cfg(not(feature = "rusqlite-support"))]
fn build_lookup(_config: &PipelineConfig) -> IdentifierLookupTable {
    let mut lookup = IdentifierLookupTable::new();
    lookup.build(None);
    lookup
}
