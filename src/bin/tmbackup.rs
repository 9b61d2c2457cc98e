//! # tmbackup CLI - Time Machine style backups with rsync
//!
//! ## Usage
//! ```bash
//! # Mark a drive as a backup destination (once)
//! mkdir -p -- /mnt/backup ; touch /mnt/backup/backup.marker
//!
//! # Back up a directory
//! tmbackup /home/user /mnt/backup
//!
//! # With filter rules, deleting old backups without asking when full
//! tmbackup --yes /home/user /mnt/backup /home/user/.includes /home/user/.excludes
//! ```

use anyhow::Context;
use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tmbackup::signal::install_interrupt_handler;
use tmbackup::utils::format_bytes;
use tmbackup::{
    AutoConfirm, BackupBuilder, BackupConfig, BackupError, Confirm, ExpirePolicy, ResumeAction,
    RunOutcome, RunReport, TerminalPrompt,
};
use tracing_subscriber::EnvFilter;

/// tmbackup - dated, hard-linked backup snapshots
#[derive(Parser)]
#[command(name = "tmbackup")]
#[command(version)]
#[command(about = "Time Machine style backups: dated, hard-link deduplicated rsync snapshots")]
#[command(long_about = None)]
struct Cli {
    /// Directory to back up
    source: PathBuf,

    /// Backup destination (must contain backup.marker)
    destination: PathBuf,

    /// File of rsync include rules
    include_from: Option<PathBuf>,

    /// File of rsync exclude rules
    exclude_from: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delete old backups without asking when the destination is full
    #[arg(short, long)]
    yes: bool,

    /// rsync executable
    #[arg(long)]
    rsync_path: Option<PathBuf>,

    /// Directory for per-attempt rsync logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Thin out old snapshots after a successful backup
    #[arg(long)]
    expire: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            let (message, code) = match e.downcast_ref::<BackupError>() {
                Some(err) => (err.user_message(), err.exit_code()),
                None => (format!("{:#}", e), 1),
            };
            eprintln!("{}: {}", "Error".red().bold(), message);
            std::process::exit(code);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => BackupConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => BackupConfig::default(),
    };
    if let Some(rsync_path) = cli.rsync_path {
        config.rsync_path = rsync_path;
    }
    if let Some(log_dir) = cli.log_dir {
        config.log_dir = Some(log_dir);
    }
    if cli.expire && config.expire.is_none() {
        config.expire = Some(ExpirePolicy::default());
    }

    let mut builder = BackupBuilder::new().config(config);
    if let Some(include) = cli.include_from {
        builder = builder.include_from(include);
    }
    if let Some(exclude) = cli.exclude_from {
        builder = builder.exclude_from(exclude);
    }
    let spinner = if cli.json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    builder = if cli.yes {
        builder.confirm(AutoConfirm)
    } else {
        // Keep the spinner from drawing over the question
        let pb = spinner.clone();
        builder.confirm(move |question: &str| pb.suspend(|| TerminalPrompt.confirm(question)))
    };
    let backup = builder.build(&cli.source, &cli.destination)?;

    install_interrupt_handler()?;

    if !cli.json {
        println!(
            "{} {} {} {}",
            "Backing up".blue().bold(),
            cli.source.display().to_string().cyan(),
            "→".dimmed(),
            cli.destination.display().to_string().cyan()
        );
    }

    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message("Syncing...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = backup.run();
    spinner.finish_and_clear();
    let outcome = outcome?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome {
        RunOutcome::Completed(report) => print_report(&report),
        RunOutcome::Declined { snapshot } => {
            println!(
                "{} Destination full; no old backup deleted. Snapshot {} left unfinished.",
                "!".yellow().bold(),
                snapshot.to_string().yellow()
            );
        }
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "{} Created snapshot {}",
        "✓".green().bold(),
        report.snapshot.to_string().yellow().bold()
    );
    match &report.resume {
        ResumeAction::Fresh => {}
        ResumeAction::Resumed { from } => {
            println!("  Resumed: {}", from.to_string().yellow());
        }
        ResumeAction::StaleMarkerCleared { completed } => {
            println!("  Cleared stale marker after {}", completed.to_string().yellow());
        }
    }
    match &report.link_base {
        Some(base) => println!("  Linked against: {}", base.to_string().cyan()),
        None => println!("  Linked against: {}", "nothing (full copy)".dimmed()),
    }
    println!("  Files: {}", report.file_count.to_string().cyan());
    println!("  Size: {}", format_bytes(report.total_size).cyan());
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms))
            .to_string()
            .cyan()
    );
    if report.attempts > 1 {
        println!("  Attempts: {}", report.attempts.to_string().yellow());
    }
    if !report.reclaimed.is_empty() {
        println!("\n{}", "Deleted to free space:".yellow().bold());
        for id in &report.reclaimed {
            println!("  - {}", id.to_string().yellow());
        }
    }
    if !report.expired.is_empty() {
        println!("\n{}", "Expired:".blue().bold());
        for id in &report.expired {
            println!("  - {}", id.to_string().dimmed());
        }
    }
}
