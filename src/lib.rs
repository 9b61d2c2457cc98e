//! # tmbackup - Time Machine style backups with rsync
//!
//! Manages dated, hard-link deduplicated snapshots on a backup destination.
//! Each run mirrors a source directory into a new snapshot named after the
//! current local time (`YYYY-MM-DD-HHMMSS`), letting rsync hard-link every
//! unchanged file from the previous snapshot so only changes cost space.
//!
//! ## Overview
//!
//! The file transfer is rsync's job. This crate owns the snapshot lifecycle
//! around it:
//!
//! - **Destination validation**: only directories carrying `backup.marker`
//!   are ever written to, and the check is repeated before every deletion
//! - **Enumeration**: snapshots are directories whose names sort
//!   chronologically
//! - **Resume**: an interrupted run leaves `backup.inprogress` behind; the
//!   next run reopens the partial snapshot instead of starting over
//! - **Space reclamation**: when the destination fills up, the oldest
//!   snapshot is deleted (after confirmation) and the sync retried
//! - **Publishing**: `latest` is retargeted at the new snapshot before the
//!   in-progress marker is removed
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tmbackup::{AutoConfirm, BackupBuilder, RunOutcome};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backup = BackupBuilder::new()
//!     .confirm(AutoConfirm)
//!     .build("/home/user", "/mnt/backup")?;
//!
//! if let RunOutcome::Completed(report) = backup.run()? {
//!     println!("Created snapshot {}", report.snapshot);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Destination layout
//!
//! ```text
//! /mnt/backup
//! ├── backup.marker
//! ├── backup.inprogress      (only while a run is unfinished)
//! ├── 2024-01-01-120000/
//! ├── 2024-01-02-120000/
//! └── latest -> /mnt/backup/2024-01-02-120000
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, BackupError>`. Running out of space is
//! handled inside the run; everything else is surfaced with a non-zero
//! [`BackupError::exit_code`] and a [`BackupError::user_message`] saying
//! what to do about it.

pub mod backup;
pub mod confirm;
pub mod destination;
pub mod error;
pub mod expire;
pub mod latest;
pub mod reclaim;
pub mod resume;
pub mod scripted;
pub mod signal;
pub mod snapshot;
pub mod sync;
pub mod types;
pub mod utils;

pub use backup::{Backup, BackupBuilder};
pub use confirm::{AlwaysDecline, AutoConfirm, Confirm, TerminalPrompt};
pub use destination::{is_backup_destination, require_backup_destination, Destination};
pub use error::{BackupError, Result};
pub use snapshot::{list_snapshots, Snapshot, SnapshotId, SnapshotList};
pub use sync::{RsyncEngine, SyncEngine, SyncInvoker};
pub use types::*;
