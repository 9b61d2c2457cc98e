//! Backup orchestration
//!
//! [`Backup`] sequences one run end to end:
//!
//! 1. validate the destination (marker file)
//! 2. prepare the target snapshot, resuming an interrupted run if needed
//! 3. sync, reclaiming the oldest snapshot whenever space runs out
//! 4. publish: retarget `latest`, then clear the in-progress marker
//! 5. optionally expire old snapshots
//!
//! ## Examples
//!
//! ```rust,no_run
//! use tmbackup::{AutoConfirm, BackupBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backup = BackupBuilder::new()
//!     .exclude_from("/home/user/.backup-excludes")
//!     .confirm(AutoConfirm)
//!     .build("/home/user", "/mnt/backup")?;
//!
//! match backup.run()? {
//!     tmbackup::RunOutcome::Completed(report) => println!("Created {}", report.snapshot),
//!     tmbackup::RunOutcome::Declined { snapshot } => println!("Left {} unfinished", snapshot),
//! }
//! # Ok(())
//! # }
//! ```

use crate::confirm::{AlwaysDecline, Confirm};
use crate::destination::{require_backup_destination, Destination};
use crate::error::Result;
use crate::expire::expire_snapshots;
use crate::latest::publish;
use crate::reclaim::{sync_until_done, LoopOutcome};
use crate::resume::prepare_target;
use crate::snapshot::SnapshotId;
use crate::sync::{RsyncEngine, SyncEngine, SyncInvoker};
use crate::types::{BackupConfig, RunContext, RunOutcome, RunReport};
use crate::utils;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument};

/// One configured backup job: a source mirrored into a destination
pub struct Backup {
    source: PathBuf,
    destination: PathBuf,
    include_from: Option<PathBuf>,
    exclude_from: Option<PathBuf>,
    config: BackupConfig,
    engine: Box<dyn SyncEngine>,
    confirm: Box<dyn Confirm>,
}

impl std::fmt::Debug for Backup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backup")
            .field("source", &self.source)
            .field("destination", &self.destination)
            .field("include_from", &self.include_from)
            .field("exclude_from", &self.exclude_from)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Backup {
    /// Source directory
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Destination root
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Active configuration
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Run a backup named after the current local time
    pub fn run(&self) -> Result<RunOutcome> {
        self.run_as(SnapshotId::now())
    }

    /// Run a backup into snapshot `target_id`
    ///
    /// # Errors
    ///
    /// - [`BackupError::NotABackupDestination`](crate::BackupError::NotABackupDestination)
    ///   if the marker file is missing; nothing is written
    /// - [`BackupError::SyncFailure`](crate::BackupError::SyncFailure) if the
    ///   engine fails; the partial snapshot and marker are kept for resuming
    /// - [`BackupError::NoSpaceAndNoOldBackup`](crate::BackupError::NoSpaceAndNoOldBackup)
    ///   if space runs out with nothing left to delete
    #[instrument(skip(self), fields(source = ?self.source, dest = ?self.destination))]
    pub fn run_as(&self, target_id: SnapshotId) -> Result<RunOutcome> {
        let clock = Instant::now();
        let started_at = Local::now();

        require_backup_destination(&self.destination)?;
        let dest = Destination::open(fs::canonicalize(&self.destination)?)?;
        let log_dir = self.config.resolved_log_dir()?;
        fs::create_dir_all(&log_dir)?;

        let prepared = prepare_target(&dest, &target_id)?;
        let mut ctx = RunContext {
            destination: dest.clone(),
            source: self.source.clone(),
            include_from: self.include_from.clone(),
            exclude_from: self.exclude_from.clone(),
            target: prepared.target,
            link_base: prepared.link_base,
            resume: prepared.action,
            started_at,
            attempts: 0,
            reclaimed: Vec::new(),
        };

        let invoker = SyncInvoker::new(&*self.engine, log_dir)
            .keep_logs_on_failure(self.config.keep_logs_on_failure);
        if sync_until_done(&invoker, &*self.confirm, &mut ctx)? == LoopOutcome::Declined {
            return Ok(RunOutcome::Declined {
                snapshot: ctx.target.id,
            });
        }

        publish(&dest, &ctx.target)?;

        let expired = match &self.config.expire {
            Some(policy) => {
                let now = target_id
                    .timestamp()
                    .unwrap_or_else(|| Local::now().naive_local());
                expire_snapshots(&dest, now, policy, &ctx.target.id)?
            }
            None => Vec::new(),
        };

        let stats = utils::dir_stats(&ctx.target.path)?;
        let report = RunReport {
            snapshot: ctx.target.id.clone(),
            path: ctx.target.path.clone(),
            link_base: ctx.link_base.map(|s| s.id),
            resume: ctx.resume,
            attempts: ctx.attempts,
            reclaimed: ctx.reclaimed,
            expired,
            started_at,
            finished_at: Local::now(),
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            hostname: hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_count: stats.files,
            total_size: stats.bytes,
        };

        info!(
            "Backup {} completed in {} attempt(s)",
            report.snapshot, report.attempts
        );
        Ok(RunOutcome::Completed(report))
    }
}

/// Builder for [`Backup`]
///
/// # Examples
///
/// ```rust,no_run
/// use tmbackup::{BackupBuilder, BackupConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backup = BackupBuilder::new()
///     .config(BackupConfig {
///         rsync_path: "/usr/local/bin/rsync".into(),
///         ..Default::default()
///     })
///     .build("/srv/data", "/mnt/backup")?;
/// # Ok(())
/// # }
/// ```
pub struct BackupBuilder {
    include_from: Option<PathBuf>,
    exclude_from: Option<PathBuf>,
    config: BackupConfig,
    engine: Option<Box<dyn SyncEngine>>,
    confirm: Box<dyn Confirm>,
}

impl BackupBuilder {
    /// Builder with default configuration
    ///
    /// Unless configured otherwise, rsync is the engine and requests to
    /// delete old snapshots are declined.
    pub fn new() -> Self {
        Self {
            include_from: None,
            exclude_from: None,
            config: BackupConfig::default(),
            engine: None,
            confirm: Box::new(AlwaysDecline),
        }
    }

    /// File of include rules
    pub fn include_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_from = Some(path.into());
        self
    }

    /// File of exclude rules
    pub fn exclude_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude_from = Some(path.into());
        self
    }

    /// Replace the configuration
    pub fn config(mut self, config: BackupConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `engine` instead of rsync
    pub fn engine(mut self, engine: impl SyncEngine + 'static) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// How to decide whether old snapshots may be deleted for space
    pub fn confirm(mut self, confirm: impl Confirm + 'static) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// Build the backup job
    ///
    /// Arguments and configuration are checked here, before anything on
    /// disk is touched.
    pub fn build(self, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Result<Backup> {
        let source = source.into();
        let destination = destination.into();

        utils::validate_arguments(
            [Some(&source), Some(&destination), self.include_from.as_ref(), self.exclude_from.as_ref()]
                .into_iter()
                .flatten()
                .map(PathBuf::as_path),
        )?;
        self.config.validate()?;
        require_backup_destination(&destination)?;

        let engine = match self.engine {
            Some(engine) => engine,
            None => Box::new(RsyncEngine::new(&self.config)),
        };

        Ok(Backup {
            source,
            destination,
            include_from: self.include_from,
            exclude_from: self.exclude_from,
            config: self.config,
            engine,
            confirm: self.confirm,
        })
    }
}

impl Default for BackupBuilder {
    fn default() -> Self {
        Self::new()
    }
}
