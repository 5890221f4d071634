//! Raidstat
//!
//! Command-line front end: aggregates personal statistics screenshots into
//! per-event deltas, or collects attendance from raid-frame screenshots.
//! Results are printed to stdout as JSON; logs go to `<exe_dir>/logs/`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use raidstat::attendance::{AttendanceSheet, collect_attendance};
use raidstat::config::{self, Config};
use raidstat::logging::init_logging;
use raidstat::ocr::{
    ImagePreprocessor, OcrMode, OcrSpaceClient, RecognitionCascade, TesseractExtractor, setup,
};
use raidstat::resolver::{NameResolver, load_replacements};
use raidstat::stats::{GroupAggregator, OcrStatExtractor, group_into_events, scan_screenshots};
use raidstat::{CancellationToken, paths};

#[derive(Debug, Parser)]
#[command(name = "raidstat")]
#[command(about = "Raid statistics and attendance from game screenshots")]
#[command(version)]
struct Cli {
    /// Configuration file (default: config.json next to the executable)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
enum Command {
    /// Aggregate personal statistics screenshots into per-event deltas
    Statistics {
        /// Folder holding the screenshots
        folder: PathBuf,
    },
    /// Collect participant names from raid frame screenshots
    Attendance {
        /// Raid frame screenshots, merged into one sheet
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

fn build_resolver(config: &Config) -> NameResolver {
    let roster = match &config.roster_path {
        Some(path) => config::load_roster(path).unwrap_or_else(|e| {
            tracing::warn!("{:#}. Continuing with an empty roster.", e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    let replacements_path = config
        .replacements_path
        .clone()
        .unwrap_or_else(paths::get_replacements_path);
    let rules = load_replacements(&replacements_path);

    tracing::info!("Roster: {} names, {} replacement rules", roster.len(), rules.len());
    NameResolver::new(roster, rules, config.matching.clone())
}

fn build_cascade(config: &Config) -> Result<RecognitionCascade> {
    let tesseract = setup::find_tesseract(
        config.tesseract_path.as_deref(),
        config.tessdata_dir.as_deref(),
    )?;
    let mut cascade = RecognitionCascade::new(
        Arc::new(ImagePreprocessor),
        Arc::new(TesseractExtractor::new(tesseract)),
    )
    .verbose(config.verbose);

    if config.ocr_mode == OcrMode::Mixed {
        if config.ocr_api_key.is_empty() {
            tracing::warn!("Mixed OCR mode without ocr_api_key; the online stage is disabled");
        } else {
            let client = OcrSpaceClient::new(
                &config.ocr_api_key,
                &config.online_endpoint,
                config.online_timeout(),
            )
            .context("Failed to create online OCR client")?;
            cascade = cascade.with_online(Arc::new(client));
        }
    }

    Ok(cascade)
}

fn run_statistics(config: &Config, folder: &Path) -> Result<()> {
    let cascade = build_cascade(config)?;
    let resolver = Arc::new(build_resolver(config));
    let extractor = OcrStatExtractor::new(
        cascade,
        resolver,
        config.personal_frame,
        config.stat_fields.clone(),
        config.ocr_mode,
    );
    let aggregator = GroupAggregator::new(extractor, config)?;

    let screenshots = scan_screenshots(folder, config.recursive_scan)?;
    let events = group_into_events(screenshots, config.max_gap(), config.gap_anchor);
    tracing::info!("Grouped into {} events", events.len());

    let report = aggregator.aggregate(&events, &CancellationToken::new());
    tracing::info!(
        "Emitted {} events, {} failed screenshots, {} duplicates",
        report.events.len(),
        report.failed.len(),
        report.duplicates
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_attendance(config: &Config, images: &[PathBuf]) -> Result<()> {
    let cascade = build_cascade(config)?;
    let resolver = build_resolver(config);
    let cancel = CancellationToken::new();

    let mut sheet = AttendanceSheet::default();
    for path in images {
        let image = image::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?
            .to_rgba8();
        let found = collect_attendance(
            &image,
            &config.attendance,
            &cascade,
            &resolver,
            config.ocr_mode,
            &cancel,
        );
        tracing::info!(
            "{}: {} names, {} unreadable cells",
            path.display(),
            found.names.len(),
            found.unknown_cells()
        );
        sheet.merge(found);
    }

    let output = serde_json::json!({
        "names": &sheet.names,
        "unknown_cells": sheet.unknown_cells(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(paths::get_config_path);
    let config = config::load_config(&config_path);

    match &cli.command {
        Command::Statistics { folder } => run_statistics(&config, folder),
        Command::Attendance { images } => run_attendance(&config, images),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = paths::ensure_directories() {
        eprintln!("Failed to create logs directory: {}", e);
    }
    init_logging(&paths::get_log_path());
    tracing::info!("=== raidstat starting ===");

    if let Err(e) = run(cli) {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
