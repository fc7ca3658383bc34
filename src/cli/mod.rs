//! # CLI Module
//!
//! Command-line driver for the ingest core.
//!
//! ## Usage
//! ```bash
//! # Which files on the card are already in the archive?
//! photo-ingest check /Volumes/CARD/DCIM
//!
//! # Same, and record the new ones as ingested
//! photo-ingest check /Volumes/CARD/DCIM --record --batch-size 200
//!
//! # Normalized metadata for some files
//! photo-ingest metadata IMG_0001.HEIC DSC_0002.NEF --output json
//!
//! # Store statistics and cache maintenance
//! photo-ingest stats
//! photo-ingest cleanup --days 30
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use photo_ingest::core::batch::{BatchCoordinator, BatchFailure, CheckBatch, RecordDetails};
use photo_ingest::core::config::{default_database_path, Capabilities, PerformanceConfig};
use photo_ingest::core::dedup::{DuplicateCheckResult, DuplicateStatus};
use photo_ingest::core::scanner::{FileLister, ScanConfig, ScanResult, WalkDirScanner};
use photo_ingest::core::store::{IngestStore, SqliteStore};
use photo_ingest::error::Result;
use photo_ingest::events::{BatchEvent, Event, EventChannel, EventReceiver, ScanEvent};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// photo-ingest - Know what you already have before you copy it
#[derive(Parser, Debug)]
#[command(name = "photo-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Store database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check files for content that was already ingested
    Check {
        /// Files or directories to check
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Record new files as ingested
        #[arg(long)]
        record: bool,

        /// Ignore the directory cache and look at every file
        #[arg(long)]
        full: bool,

        /// Include hidden files
        #[arg(long)]
        include_hidden: bool,

        #[command(flatten)]
        performance: PerformanceArgs,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },
    /// Print normalized metadata
    Metadata {
        /// Files to read
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Skip the metadata cache
        #[arg(long)]
        no_cache: bool,

        #[command(flatten)]
        performance: PerformanceArgs,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },
    /// Show store statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },
    /// Remove old metadata and directory cache rows
    Cleanup {
        /// Remove rows older than this many days (0 = all)
        #[arg(long, default_value = "30")]
        days: u32,
    },
}

#[derive(Args, Debug)]
struct PerformanceArgs {
    /// Worker threads per batch
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Records per write transaction
    #[arg(long, default_value = "100")]
    batch_size: usize,

    /// Never hash through a memory map
    #[arg(long)]
    no_mmap: bool,
}

impl PerformanceArgs {
    fn to_config(&self) -> PerformanceConfig {
        PerformanceConfig::new()
            .parallel_workers(self.workers)
            .batch_size(self.batch_size)
            .memory_mapped_hashing(!self.no_mmap)
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (paths of new files only)
    Minimal,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    photo_ingest::init_tracing(cli.verbose);

    let db_path = cli.db.unwrap_or_else(default_database_path);

    match cli.command {
        Commands::Check {
            paths,
            record,
            full,
            include_hidden,
            performance,
            output,
        } => run_check(
            &db_path,
            paths,
            CheckOptions {
                record,
                full,
                include_hidden,
                verbose: cli.verbose,
                output,
            },
            performance.to_config(),
        ),
        Commands::Metadata {
            paths,
            no_cache,
            performance,
            output,
        } => run_metadata(
            &db_path,
            paths,
            performance.to_config().cache_metadata(!no_cache),
            output,
        ),
        Commands::Stats { output } => run_stats(&db_path, output),
        Commands::Cleanup { days } => run_cleanup(&db_path, days),
    }
}

struct CheckOptions {
    record: bool,
    full: bool,
    include_hidden: bool,
    verbose: bool,
    output: OutputFormat,
}

fn open_store(db_path: &Path) -> Result<Arc<dyn IngestStore>> {
    Ok(Arc::new(SqliteStore::open(db_path)?))
}

fn new_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(bar_style.progress_chars("█▓░"));
    }
    pb
}

/// Drive a progress bar from the event channel until every sender is gone
fn spawn_progress(receiver: EventReceiver, pb: Option<ProgressBar>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in receiver.iter() {
            let Some(pb) = pb.as_ref() else {
                continue;
            };
            match event {
                Event::Scan(ScanEvent::Progress(p)) => {
                    pb.set_message(format!("Scanning ({} files)", p.files_found));
                }
                Event::Batch(BatchEvent::Started { operation, total }) => {
                    pb.set_length(total as u64);
                    pb.set_position(0);
                    pb.set_message(operation.to_string());
                }
                Event::Batch(BatchEvent::Progress(p)) => {
                    pb.set_position(p.completed as u64);
                }
                Event::Batch(BatchEvent::Flushed { records }) => {
                    pb.println(format!("  committed {} records", records));
                }
                _ => {}
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
    })
}

/// Split inputs into explicit files and directories to scan
fn expand_inputs(
    inputs: Vec<PathBuf>,
    scanner: &WalkDirScanner,
    events: &photo_ingest::events::EventSender,
) -> Result<(Vec<PathBuf>, ScanResult)> {
    let (files, roots): (Vec<_>, Vec<_>) = inputs.into_iter().partition(|p| p.is_file());

    let mut paths = files;
    let mut scanned = ScanResult::default();
    if !roots.is_empty() {
        scanned = scanner.scan_with_events(&roots, events)?;
        paths.extend(scanned.paths());
    }
    Ok((paths, scanned))
}

fn run_check(
    db_path: &Path,
    inputs: Vec<PathBuf>,
    options: CheckOptions,
    config: PerformanceConfig,
) -> Result<()> {
    let term = Term::stderr();
    let pretty = matches!(options.output, OutputFormat::Pretty);

    if pretty {
        term.write_line(&format!(
            "{} {}",
            style("photo-ingest").bold().cyan(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let store = open_store(db_path)?;
    let capabilities = Capabilities::detect();

    // Only a recording run may trust the directory cache; a read-only
    // check must not mark directories as seen.
    let scan_config = ScanConfig {
        include_hidden: options.include_hidden,
        incremental: options.record && !options.full && config.incremental_processing,
        ..Default::default()
    };
    let scanner = WalkDirScanner::new(scan_config).with_store(Arc::clone(&store));

    let (sender, receiver) = EventChannel::new();
    let progress = spawn_progress(receiver, pretty.then(new_progress_bar));

    let coordinator = BatchCoordinator::new(Arc::clone(&store), config, capabilities)?
        .with_events(sender.clone());

    let (paths, scanned) = expand_inputs(inputs, &scanner, &sender)?;
    let scan_errors: Vec<String> = scanned.errors.iter().map(|e| e.to_string()).collect();

    let mut batch = coordinator.batch_check(&paths);
    batch.collapse_repeats();

    let mut recorded = 0;
    if options.record {
        let new_paths: Vec<PathBuf> = batch
            .results
            .iter()
            .filter(|(_, r)| r.status == DuplicateStatus::New)
            .map(|(p, _)| p.clone())
            .collect();
        let metadata = coordinator.batch_extract(&new_paths);

        let mut settled: HashSet<&Path> = batch
            .results
            .iter()
            .filter(|(_, r)| r.status == DuplicateStatus::Duplicate)
            .map(|(p, _)| p.as_path())
            .collect();
        for path in &new_paths {
            let details = metadata
                .get(path)
                .map(RecordDetails::from_metadata)
                .unwrap_or_default();
            if coordinator.record_ingested(path, &batch.results[path].hashes, details)? {
                settled.insert(path.as_path());
                recorded += 1;
            }
        }
        coordinator.flush()?;

        // Only after the records are durable
        let done = scanned.settled_directories(|p| settled.contains(p));
        scanner.remember_directories(&done);
    }

    let counters = coordinator.resolver().counters();
    drop(coordinator);
    drop(sender);
    progress.join().ok();

    match options.output {
        OutputFormat::Pretty => {
            print_pretty_check(&term, &batch, &scan_errors, recorded, options.verbose);
            if options.verbose {
                term.write_line(&format!(
                    "  {} fast-path hits, {} files hashed, {} hash comparisons",
                    style(counters.fast_path_hits).dim(),
                    style(counters.hashes_computed).dim(),
                    style(counters.sha256_comparisons).dim()
                ))
                .ok();
            }
        }
        OutputFormat::Json => print_json_check(&batch, &scan_errors, recorded)?,
        OutputFormat::Minimal => {
            let mut new_files: Vec<_> = batch
                .results
                .iter()
                .filter(|(_, r)| r.status == DuplicateStatus::New)
                .map(|(p, _)| p)
                .collect();
            new_files.sort();
            for path in new_files {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

fn sorted_results(batch: &CheckBatch) -> Vec<(&PathBuf, &DuplicateCheckResult)> {
    let mut results: Vec<_> = batch.results.iter().collect();
    results.sort_by(|a, b| a.0.cmp(b.0));
    results
}

fn print_pretty_check(
    term: &Term,
    batch: &CheckBatch,
    scan_errors: &[String],
    recorded: usize,
    verbose: bool,
) {
    let count = |status: DuplicateStatus| {
        batch
            .results
            .values()
            .filter(|r| r.status == status)
            .count()
    };

    term.write_line(&format!("{} Check Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();
    term.write_line(&format!(
        "  {} new",
        style(count(DuplicateStatus::New)).green()
    ))
    .ok();
    term.write_line(&format!(
        "  {} already ingested",
        style(count(DuplicateStatus::Duplicate)).cyan()
    ))
    .ok();
    term.write_line(&format!(
        "  {} visually similar to ingested files",
        style(count(DuplicateStatus::Similar)).yellow()
    ))
    .ok();
    if recorded > 0 {
        term.write_line(&format!("  {} recorded", style(recorded).green()))
            .ok();
    }

    let failures = batch.errors.len() + scan_errors.len();
    if failures > 0 {
        term.write_line(&format!("  {} errors", style(failures).red()))
            .ok();
    }
    term.write_line("").ok();

    for (path, result) in sorted_results(batch) {
        let (marker, show) = match result.status {
            DuplicateStatus::New => (style("+").green().to_string(), verbose),
            DuplicateStatus::Duplicate => (style("=").cyan().to_string(), verbose),
            DuplicateStatus::Similar => (style("~").yellow().to_string(), true),
        };
        if !show {
            continue;
        }
        let line = match &result.existing_file {
            Some(existing) => format!(
                "  {} {} {}",
                marker,
                path.display(),
                style(format!("({})", existing.display())).dim()
            ),
            None => format!("  {} {}", marker, path.display()),
        };
        term.write_line(&line).ok();
    }

    for BatchFailure { path, message } in &batch.errors {
        term.write_line(&format!(
            "  {} {}: {}",
            style("!").red(),
            path.display(),
            message
        ))
        .ok();
    }
    for message in scan_errors {
        term.write_line(&format!("  {} {}", style("!").red(), message))
            .ok();
    }
}

fn print_json_check(batch: &CheckBatch, scan_errors: &[String], recorded: usize) -> Result<()> {
    let results: Vec<_> = sorted_results(batch)
        .into_iter()
        .map(|(path, result)| {
            serde_json::json!({
                "path": path,
                "status": result.status,
                "existing_file": result.existing_file,
                "similarity_score": result.similarity_score,
                "sha256": result.hashes.sha256(),
                "size": result.hashes.size(),
                "perceptual_hash": result.hashes.perceptual(),
            })
        })
        .collect();

    let output = serde_json::json!({
        "results": results,
        "errors": batch.errors,
        "scan_errors": scan_errors,
        "recorded": recorded,
    });

    print_json(&output)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        photo_ingest::IngestError::Config(format!("cannot render JSON output: {}", e))
    })?;
    println!("{}", text);
    Ok(())
}

fn run_metadata(
    db_path: &Path,
    paths: Vec<PathBuf>,
    config: PerformanceConfig,
    output: OutputFormat,
) -> Result<()> {
    let store = open_store(db_path)?;
    let coordinator = BatchCoordinator::new(store, config, Capabilities::detect())?;

    let metadata = coordinator.batch_extract(&paths);
    let mut entries: Vec<_> = metadata.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    match output {
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = entries
                .into_iter()
                .map(|(path, m)| {
                    (
                        path.display().to_string(),
                        serde_json::to_value(m).unwrap_or_default(),
                    )
                })
                .collect();
            print_json(&map)?;
        }
        OutputFormat::Pretty | OutputFormat::Minimal => {
            let term = Term::stdout();
            for (path, m) in entries {
                term.write_line(&format!("{}", style(path.display()).bold()))
                    .ok();
                if let Some(camera) = m.camera_display() {
                    term.write_line(&format!("  Camera:   {}", camera)).ok();
                }
                if let Some(lens) = &m.lens_model {
                    term.write_line(&format!("  Lens:     {}", lens)).ok();
                }
                if let Some(date) = &m.date_time {
                    term.write_line(&format!("  Taken:    {}", date)).ok();
                }
                if let (Some(w), Some(h)) = (m.image_width, m.image_height) {
                    term.write_line(&format!("  Size:     {}x{}", w, h)).ok();
                }
                if let Some(bytes) = m.file_size {
                    term.write_line(&format!("  File:     {}", format_bytes(bytes)))
                        .ok();
                }
            }
        }
    }

    Ok(())
}

fn run_stats(db_path: &Path, output: OutputFormat) -> Result<()> {
    let store = open_store(db_path)?;
    let stats = store.stats()?;

    match output {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Pretty | OutputFormat::Minimal => {
            let term = Term::stdout();
            term.write_line(&format!(
                "{} {}",
                style("Store").bold(),
                style(db_path.display()).dim()
            ))
            .ok();
            let rows = [
                ("file records", stats.file_records),
                ("metadata cache entries", stats.metadata_cache_entries),
                ("directory cache entries", stats.directory_cache_entries),
                ("unique devices", stats.unique_devices),
                ("duplicate groups", stats.duplicate_groups),
                ("records with perceptual hash", stats.records_with_perceptual_hash),
            ];
            for (label, value) in rows {
                term.write_line(&format!("  {:>8} {}", style(value).cyan(), label))
                    .ok();
            }
        }
    }

    Ok(())
}

fn run_cleanup(db_path: &Path, days: u32) -> Result<()> {
    let store = open_store(db_path)?;
    let removed = store.cleanup_cache(days)?;

    let term = Term::stderr();
    term.write_line(&format!(
        "{} Removed {} cache rows",
        style("✓").green().bold(),
        style(removed).cyan()
    ))
    .ok();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
