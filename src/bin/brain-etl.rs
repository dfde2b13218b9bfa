//! brain-etl CLI - Command-line interface for the Brain data pipeline
//!
//! ## Example Usage
//!
//! ```bash
//! # Process the deployment month and rebuild universes
//! QC_DATAFLEET_DEPLOYMENT_DATE=20210201 brain-etl process
//!
//! # Process the whole history
//! brain-etl process --all
//!
//! # Rebuild universe files from an existing output tree
//! brain-etl universe --start 20210201 --end 20210228 --dataset sentiment
//!
//! # Convert one date of the earnings-call feed
//! brain-etl convert --dataset blmect --date 20240502
//!
//! # Backfill the page-view feed from every date in the bucket
//! brain-etl convert --dataset bwpv --all
//! ```

use anyhow::{anyhow, Context, Result};
use brain_etl::assets::MapFileResolver;
use brain_etl::category::Category;
use brain_etl::config::PipelineConfig;
use brain_etl::data::{ConverterDataset, DataConverter, UniverseAggregator};
use brain_etl::processor::BrainProcessor;
use brain_etl::storage::{plan_downloads, Downloader};
use brain_etl::types::{parse_compact_date, ProcessingWindow};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use std::time::Instant;

/// brain-etl: Brain alternative data to Lean format
#[derive(Parser)]
#[command(name = "brain-etl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Brain alternative-data ETL for Lean", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download, process and write per-ticker and universe files
    Process {
        /// Deployment date (YYYYMMDD); its month is processed
        #[arg(short = 'd', long, value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// Process the whole history up to today
        #[arg(short = 'a', long)]
        all: bool,
    },

    /// Rebuild universe files from the existing output tree
    Universe {
        /// First date to include (YYYYMMDD)
        #[arg(short = 's', long, value_parser = parse_date)]
        start: Option<NaiveDate>,

        /// Last date to include (YYYYMMDD)
        #[arg(short = 'e', long, value_parser = parse_date)]
        end: Option<NaiveDate>,

        /// Datasets to rebuild (rankings, sentiment, report_10k, report_all)
        #[arg(long)]
        dataset: Vec<String>,
    },

    /// Convert one date of a supplementary feed
    Convert {
        /// Feed to convert (blmect, bwpv)
        #[arg(long)]
        dataset: String,

        /// File date (YYYYMMDD); defaults to the deployment date
        #[arg(short = 'd', long, value_parser = parse_date, conflicts_with = "all")]
        date: Option<NaiveDate>,

        /// Convert every deployment date found in the bucket
        #[arg(short = 'a', long)]
        all: bool,
    },
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    parse_compact_date(value).ok_or_else(|| format!("expected YYYYMMDD, got '{}'", value))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = PipelineConfig::load_with_env(cli.config.as_deref())
        .context("Failed to load configuration")
        .and_then(|config| {
            if cli.verbose {
                println!("{} v{}", "brain-etl".cyan().bold(), env!("CARGO_PKG_VERSION"));
                println!("Output root: {}", config.output_root.display().to_string().dimmed());
            }
            match cli.command {
                Commands::Process { date, all } => run_process(config, date, all),
                Commands::Universe { start, end, dataset } => run_universe(config, start, end, dataset),
                Commands::Convert { dataset, date, all } => run_convert(config, &dataset, date, all),
            }
        });

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn run_process(mut config: PipelineConfig, date: Option<NaiveDate>, all: bool) -> Result<()> {
    if date.is_some() {
        config.deployment_date = date;
    }
    if all {
        config.process_all = true;
    }

    let started = Instant::now();
    let today = today();
    let window = config.window(today)?;
    println!(
        "{} {} .. {}",
        "Processing".cyan().bold(),
        window.start,
        window.end
    );

    let store = config.object_store()?;
    let downloader = Downloader::new(store, &config.staging_dir);
    let plan = plan_downloads(&window);

    let pb = ProgressBar::new(plan.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    let files = downloader
        .download_all_with(&plan, |request| {
            pb.set_message(request.file_prefix);
            pb.inc(1);
        })
        .context("Download failed")?;
    pb.finish_with_message(format!("{} files", files.len()));

    let processor = BrainProcessor::from_config(&config, window, today)?;
    let summary = processor.run(&files)?;

    println!();
    println!("{}", "Run complete".green().bold());
    println!("  {} {}", "Files parsed:".bold(), summary.files_parsed);
    if summary.files_skipped > 0 {
        println!("  {} {}", "Files skipped:".yellow().bold(), summary.files_skipped);
    }
    println!("  {} {}", "Records written:".bold(), summary.records_written);
    println!("  {} {}", "Ticker files:".bold(), summary.ticker_files);
    println!("  {} {}", "Universe files:".bold(), summary.universe_files);
    println!("  {} {:.2?}", "Elapsed:".bold(), started.elapsed());
    Ok(())
}

fn run_universe(
    config: PipelineConfig,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    datasets: Vec<String>,
) -> Result<()> {
    let window = match (start, end) {
        (Some(start), Some(end)) => ProcessingWindow::new(start, end),
        (Some(start), None) => ProcessingWindow::new(start, today()),
        (None, end) => {
            let configured = config.window(today())?;
            ProcessingWindow::new(configured.start, end.unwrap_or(configured.end))
        }
    };
    if window.start > window.end {
        return Err(anyhow!("Start {} is after end {}", window.start, window.end));
    }

    let categories = if datasets.is_empty() {
        vec![Category::Report10K, Category::ReportAll, Category::Rankings, Category::Sentiment]
    } else {
        datasets
            .iter()
            .map(|name| name.parse::<Category>())
            .collect::<brain_etl::error::Result<Vec<_>>>()?
    };

    let map_files = MapFileResolver::from_dir(&config.map_files_dir)?;
    let aggregator = UniverseAggregator::new(&config.output_root, &map_files, window);

    let mut written = 0;
    for category in categories {
        let files = if category.is_report() {
            aggregator.aggregate_report(category, None)?
        } else {
            aggregator.aggregate(category, None)?
        };
        println!("  {} {} files", format!("{}:", category.output_dir().unwrap_or("-")).bold(), files.len());
        written += files.len();
    }

    println!("{} {} universe files", "Wrote".green().bold(), written);
    Ok(())
}

fn run_convert(config: PipelineConfig, dataset: &str, date: Option<NaiveDate>, all: bool) -> Result<()> {
    let dataset: ConverterDataset = dataset.parse()?;
    let store = config.object_store()?;
    let converter = DataConverter::new(dataset, store.as_ref(), &config.staging_dir, &config.output_root);

    if all {
        let dates = converter
            .process_history()
            .with_context(|| format!("Failed to process history for dataset={}", dataset))?;
        println!(
            "{} {} deployment dates into {}",
            "Converted".green().bold(),
            dates,
            converter.output_dir().display()
        );
        return Ok(());
    }

    let date = date
        .or(config.deployment_date)
        .ok_or_else(|| anyhow!("--date, --all or QC_DATAFLEET_DEPLOYMENT_DATE is required"))?;
    let symbols = converter
        .process_date(date)
        .with_context(|| format!("Failed to process dataset={}", dataset))?;

    println!(
        "{} {} symbols into {}",
        "Converted".green().bold(),
        symbols,
        converter.output_dir().display()
    );
    Ok(())
}
