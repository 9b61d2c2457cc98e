//! Core data types used throughout tmbackup
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Configuration**: `BackupConfig`, `ExpirePolicy` - engine and retention settings
//! - **Engine boundary**: `SyncRequest`, `EngineStatus` - one invocation of the sync engine
//! - **Run state**: `RunContext`, `ResumeAction` - everything one run threads through its components
//! - **Results**: `RunReport`, `RunOutcome` - what a finished run reports back

use crate::destination::Destination;
use crate::error::{BackupError, Result};
use crate::snapshot::{Snapshot, SnapshotId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-user profile directory holding run logs
pub const PROFILE_DIR: &str = ".tmbackup";

/// Flags passed to rsync unless the configuration overrides them
pub const DEFAULT_RSYNC_FLAGS: &[&str] = &[
    "--compress",
    "--numeric-ids",
    "--links",
    "--hard-links",
    "--one-file-system",
    "--archive",
    "--itemize-changes",
];

/// Retention policy applied after a successful run
///
/// Every snapshot younger than `keep_all_hours` is kept, then one per day up
/// to `keep_daily_days`, then one per week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpirePolicy {
    /// Keep everything younger than this many hours
    pub keep_all_hours: u32,
    /// Keep one snapshot per day younger than this many days
    pub keep_daily_days: u32,
}

impl Default for ExpirePolicy {
    fn default() -> Self {
        Self {
            keep_all_hours: 24,
            keep_daily_days: 31,
        }
    }
}

/// Configuration for backup runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// rsync executable
    pub rsync_path: PathBuf,
    /// Transfer flags; `--delete --delete-excluded` are always added
    pub rsync_flags: Vec<String>,
    /// Extra arguments appended after the transfer flags
    pub extra_args: Vec<String>,
    /// Directory for per-attempt logs (defaults to `~/.tmbackup`)
    pub log_dir: Option<PathBuf>,
    /// Move a failed attempt's log aside instead of deleting it
    pub keep_logs_on_failure: bool,
    /// Retention policy, if old snapshots should be expired
    pub expire: Option<ExpirePolicy>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            rsync_path: PathBuf::from("rsync"),
            rsync_flags: DEFAULT_RSYNC_FLAGS.iter().map(|s| s.to_string()).collect(),
            extra_args: Vec::new(),
            log_dir: None,
            keep_logs_on_failure: false,
            expire: None,
        }
    }
}

impl BackupConfig {
    /// Load a JSON configuration file
    ///
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that can never work
    pub fn validate(&self) -> Result<()> {
        if self.rsync_path.as_os_str().is_empty() {
            return Err(BackupError::invalid_config("rsync_path must not be empty"));
        }
        if let Some(arg) = self
            .rsync_flags
            .iter()
            .chain(&self.extra_args)
            .find(|arg| arg.contains('\''))
        {
            return Err(BackupError::invalid_config(format!(
                "engine argument {:?} contains a single quote",
                arg
            )));
        }
        if let Some(policy) = &self.expire {
            if u64::from(policy.keep_daily_days) * 24 < u64::from(policy.keep_all_hours) {
                return Err(BackupError::invalid_config(
                    "expire.keep_daily_days must cover expire.keep_all_hours",
                ));
            }
        }
        Ok(())
    }

    /// Directory where attempt logs are written
    pub fn resolved_log_dir(&self) -> Result<PathBuf> {
        match &self.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(PROFILE_DIR))
                .ok_or_else(|| BackupError::invalid_config("cannot determine home directory for logs")),
        }
    }
}

/// One invocation of the sync engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Directory whose contents are mirrored
    pub source: PathBuf,
    /// Snapshot directory being populated
    pub destination: PathBuf,
    /// Completed snapshot to hard-link unchanged files from
    pub link_base: Option<PathBuf>,
    /// File of include rules
    pub include_from: Option<PathBuf>,
    /// File of exclude rules
    pub exclude_from: Option<PathBuf>,
    /// File the engine writes its log to
    pub log_file: PathBuf,
}

/// How the sync engine process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    /// Exited normally with this status
    Exited(i32),
    /// Killed by a signal
    Signalled,
}

impl EngineStatus {
    /// Whether the engine reported success
    pub fn success(&self) -> bool {
        matches!(self, EngineStatus::Exited(0))
    }
}

/// What the resume handler did before syncing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResumeAction {
    /// New, empty snapshot directory
    Fresh,
    /// An unfinished snapshot was renamed to this run's target
    Resumed {
        /// Name the unfinished snapshot had
        from: SnapshotId,
    },
    /// The in-progress marker was left behind after `completed` had already
    /// been published; it was cleared and the run started fresh
    StaleMarkerCleared {
        /// Snapshot the latest pointer already aimed at
        completed: SnapshotId,
    },
}

/// State threaded through one backup run
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Validated destination
    pub destination: Destination,
    /// Source directory
    pub source: PathBuf,
    /// Include rules file
    pub include_from: Option<PathBuf>,
    /// Exclude rules file
    pub exclude_from: Option<PathBuf>,
    /// Snapshot being populated
    pub target: Snapshot,
    /// Snapshot unchanged files are linked from
    pub link_base: Option<Snapshot>,
    /// What happened before the first sync
    pub resume: ResumeAction,
    /// When the run started
    pub started_at: DateTime<Local>,
    /// Sync invocations so far
    pub attempts: u32,
    /// Snapshots deleted to free space, in deletion order
    pub reclaimed: Vec<SnapshotId>,
}

impl RunContext {
    /// Engine request for the next attempt
    pub fn sync_request(&self, log_file: PathBuf) -> SyncRequest {
        SyncRequest {
            source: self.source.clone(),
            destination: self.target.path.clone(),
            link_base: self.link_base.as_ref().map(|s| s.path.clone()),
            include_from: self.include_from.clone(),
            exclude_from: self.exclude_from.clone(),
            log_file,
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// New snapshot
    pub snapshot: SnapshotId,
    /// Its directory
    pub path: PathBuf,
    /// Snapshot it was linked against
    pub link_base: Option<SnapshotId>,
    /// What the resume handler did
    pub resume: ResumeAction,
    /// Sync invocations, including retries after reclaiming space
    pub attempts: u32,
    /// Snapshots deleted to free space
    pub reclaimed: Vec<SnapshotId>,
    /// Snapshots removed by the retention policy
    pub expired: Vec<SnapshotId>,
    /// Start time
    pub started_at: DateTime<Local>,
    /// Finish time
    pub finished_at: DateTime<Local>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Host the run executed on
    pub hostname: String,
    /// Regular files in the new snapshot
    pub file_count: u64,
    /// Bytes in the new snapshot (hard links counted per name)
    pub total_size: u64,
}

/// How a run ended without error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The snapshot was completed and published
    Completed(RunReport),
    /// Space ran out and the caller declined to delete an old snapshot
    Declined {
        /// Snapshot left unfinished for a later run
        snapshot: SnapshotId,
    },
}
