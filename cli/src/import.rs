//! `import-requirements`: push a parsed sequence into a requirement document.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use reqimport_core::import::category_breakdown;
use reqimport_core::{ImportEntry, ImportResults, Importer, OdataClient, Session, Transport};

use crate::config::Config;

/// Failures listed individually in the final report.
const FAILURES_SHOWN: usize = 10;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "import-requirements",
    about = "Import parsed requirements into an Aras requirement document"
)]
pub struct ImportArgs {
    /// JSON array of parsed requirement entries.
    #[arg(long, default_value = "import_sequence.json")]
    pub input: PathBuf,

    /// Where the results file is written.
    #[arg(long, default_value = "import_results.json")]
    pub output: PathBuf,

    /// Skip this many entries (overrides `import.start_index`).
    #[arg(long)]
    pub start_index: Option<usize>,

    /// Configuration file (defaults to ./reqimport.toml if present).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportExit {
    Completed,
    DryRun,
    MissingInput,
}

impl ImportExit {
    pub fn code(self) -> u8 {
        match self {
            ImportExit::Completed | ImportExit::DryRun => 0,
            ImportExit::MissingInput => 1,
        }
    }
}

impl From<ImportExit> for ExitCode {
    fn from(exit: ImportExit) -> Self {
        ExitCode::from(exit.code())
    }
}

/// `DRY_RUN=1` stops after authentication.
pub fn dry_run_requested() -> bool {
    std::env::var("DRY_RUN").is_ok_and(|v| v.trim() == "1")
}

fn banner(title: &str) {
    println!("{}", "=".repeat(80));
    println!("{}", title.bold());
    println!("{}", "=".repeat(80));
}

fn load_sequence(path: &Path) -> anyhow::Result<Vec<ImportEntry>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn write_results(path: &Path, results: &ImportResults) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(results).context("serializing import results")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

pub fn run<T: Transport>(
    args: &ImportArgs,
    config: &Config,
    transport: T,
    dry_run: bool,
) -> anyhow::Result<ImportExit> {
    banner("Aras Innovator requirement import");

    if !args.input.exists() {
        println!("{} {} not found", "ERROR:".red().bold(), args.input.display());
        println!("Expected location: {}", args.input.display());
        return Ok(ImportExit::MissingInput);
    }

    let sequence = load_sequence(&args.input)?;
    let start_index = args.start_index.unwrap_or(config.import.start_index);
    let remaining = sequence.get(start_index..).unwrap_or_default();
    println!("Loaded {} entries from {}", sequence.len(), args.input.display());
    println!("Starting at index {start_index}: {} entries to import", remaining.len());

    println!("\nBreakdown by category:");
    for (category, count) in category_breakdown(remaining) {
        println!("  {category}: {count}");
    }

    let settings = config.import_settings()?;
    let throttle = config.throttle()?;
    let credentials = config.credentials()?;

    println!("\nConnecting to {}", config.server.url);
    let mut session = Session::new(OdataClient::new(&config.server.url), transport, credentials);
    session.authenticate().context("authentication failed")?;
    println!("{} Authenticated", "✓".green());

    println!("\nTarget document: {}", settings.document_id);
    println!("Relationship item type: {}", settings.relationship_item_type);

    if dry_run {
        println!("\nDRY_RUN=1 set. Exiting without making changes.");
        return Ok(ImportExit::DryRun);
    }

    println!();
    let outcome = Importer::new(&mut session, &settings)
        .with_throttle(throttle)
        .run(&sequence, start_index);
    let results = outcome.into_results();
    write_results(&args.output, &results)?;

    banner("Import complete");
    let summary = &results.summary;
    println!("Attempted:  {}", summary.total_attempted);
    println!("Successful: {}", summary.successful.to_string().green());
    println!("Failed:     {}", summary.failed.to_string().red());
    println!("Time:       {:.1}s", summary.time_seconds);
    println!(
        "Requirements in document: {} ({} pre-existing + {} created)",
        summary.successful + start_index,
        start_index,
        summary.successful
    );
    println!("Results written to {}", args.output.display());

    if !results.failed.is_empty() {
        println!("\nFailures:");
        for failure in results.failed.iter().take(FAILURES_SHOWN) {
            let label = failure.req_number.as_deref().unwrap_or("?");
            println!("  {} {label}: {}", "✗".red(), failure.error);
        }
        if results.failed.len() > FAILURES_SHOWN {
            println!("  ... and {} more", results.failed.len() - FAILURES_SHOWN);
        }
    }

    Ok(ImportExit::Completed)
}
