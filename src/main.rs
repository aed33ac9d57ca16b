//! `record-patch` command line.
//!
//! Each subcommand binds one transform to one document. Progress lines go to
//! stdout; diagnostics go to stderr through `tracing` (`RUST_LOG`).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rust_record_patch::engine::{Engine, RunSummary, Transform};
use rust_record_patch::{BatchFile, Config, scan};

/// Patch, normalize and repair records in a generated source file.
#[derive(Debug, Parser)]
#[command(name = "record-patch", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Fail (and write nothing) when an identifier is missing or a record cannot be repaired
    #[arg(long, global = true)]
    strict: bool,

    /// Report what would change without writing
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replace typographic punctuation with ASCII equivalents
    Normalize(DocumentArgs),

    /// Collapse records with duplicated closing fragments
    Repair(DocumentArgs),

    /// Replace records by identifier from a JSON batch file
    Patch(PatchArgs),

    /// Report invariant violations without modifying anything
    Check(CheckArgs),
}

#[derive(Debug, Args)]
struct DocumentArgs {
    /// Document to rewrite in place
    file: PathBuf,
}

#[derive(Debug, Args)]
struct PatchArgs {
    /// Document to rewrite in place
    file: PathBuf,

    /// JSON batch: an array of {identifier, category, content} or {"passes": [[...], ...]}
    #[arg(long, value_name = "PATH")]
    batch: PathBuf,

    /// Leave punctuation as authored
    #[arg(long)]
    no_normalize: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Documents to inspect
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.strict {
        config.strict = true;
    }

    match cli.command {
        Command::Normalize(args) => run(config, &args.file, Transform::Normalize, cli.dry_run),
        Command::Repair(args) => run(config, &args.file, Transform::Repair, cli.dry_run),
        Command::Patch(args) => {
            if args.no_normalize {
                config.normalize_before_patch = false;
            }
            let batch = BatchFile::load(&args.batch)?;
            run(config, &args.file, Transform::Patch(batch), cli.dry_run)
        }
        Command::Check(args) => check(&config, &args.files),
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(config: Config, file: &Path, transform: Transform, dry_run: bool) -> Result<ExitCode> {
    let engine = Engine::new(config)?;
    let summary = engine
        .run_file(file, &transform, dry_run)
        .with_context(|| format!("failed to process {}", file.display()))?;
    print_summary(&summary, dry_run);
    Ok(ExitCode::SUCCESS)
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    for change in &summary.changes {
        println!("{change}");
    }
    for issue in &summary.issues {
        println!("warning: {issue}");
    }
    let suffix = if dry_run && summary.modified {
        " (dry run, nothing written)"
    } else {
        ""
    };
    println!("{summary}{suffix}");
}

fn check(config: &Config, files: &[PathBuf]) -> Result<ExitCode> {
    let reports = scan::scan_paths(files, config)?;
    for report in &reports {
        if report.is_clean() {
            println!("{}: ok ({} records)", report.path.display(), report.records);
            continue;
        }
        println!(
            "{}: {} finding(s) in {} records",
            report.path.display(),
            report.findings.len(),
            report.records
        );
        for finding in &report.findings {
            println!("  {finding}");
        }
    }

    if reports.iter().all(|r| r.is_clean()) {
        Ok(ExitCode::SUCCESS)
    } else {
        let mut totals: Vec<_> = scan::tally(&reports).into_iter().collect();
        totals.sort();
        let line = totals
            .iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("problems: {line}");
        Ok(ExitCode::FAILURE)
    }
}
