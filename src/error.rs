//! Error types for tmbackup
//!
//! This module defines all error types that can occur while validating a
//! destination, preparing a snapshot, driving the sync engine and publishing
//! the result. Errors are designed to be actionable: fatal conditions carry
//! enough context for [`BackupError::user_message`] to tell the operator what
//! to do next.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the tmbackup library
pub type Result<T> = std::result::Result<T, BackupError>;

/// Main error type for all backup operations
#[derive(Debug, Error)]
pub enum BackupError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors reading or writing JSON configuration and reports
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An input path contains a character that is never accepted
    #[error("Invalid argument {argument:?}: paths may not contain a single quote")]
    Argument {
        /// The offending argument
        argument: String,
    },

    /// The directory does not carry the backup marker file
    #[error("Not a backup destination: {path:?} (missing {marker:?})")]
    NotABackupDestination {
        /// Directory that was checked
        path: PathBuf,
        /// Marker file that was expected
        marker: PathBuf,
    },

    /// The sync engine failed for a reason other than exhausted space
    #[error("Sync engine exited with code {exit_code}")]
    SyncFailure {
        /// Exit status reported by the engine
        exit_code: i32,
    },

    /// The sync engine ran out of space on the destination
    #[error("No space left on destination (engine exit code {exit_code})")]
    OutOfSpace {
        /// Exit status reported by the engine
        exit_code: i32,
    },

    /// Out of space and no snapshot is left that could be reclaimed
    #[error("No space left on destination and no old backup to delete")]
    NoSpaceAndNoOldBackup,

    /// The engine (or this process) was terminated by a signal
    #[error("Interrupted by signal")]
    InterruptedBySignal,

    /// The sync engine could not be started at all
    #[error("Failed to start sync engine {program:?}: {source}")]
    EngineSpawn {
        /// Program that was executed
        program: PathBuf,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// A directory name is not a snapshot identifier
    #[error("Invalid snapshot name: {0}")]
    InvalidSnapshotName(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BackupError {
    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        BackupError::Internal(msg.into())
    }

    /// Create a configuration error with a custom message
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        BackupError::InvalidConfiguration(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Only exhausted space is; the reclaim loop handles it by deleting the
    /// oldest snapshot and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BackupError::OutOfSpace { .. })
    }

    /// Process exit code for this error
    ///
    /// Engine failures propagate the engine's own exit status, everything
    /// else exits with `1`.
    pub fn exit_code(&self) -> i32 {
        match self {
            BackupError::SyncFailure { exit_code } if *exit_code != 0 => *exit_code,
            _ => 1,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            BackupError::NotABackupDestination { path, marker } => {
                format!(
                    "Safety check failed - the destination does not appear to be a backup folder or drive \
                     (marker file not found).\n\
                     If it is indeed a backup folder, you may create the marker file by running:\n\n\
                     mkdir -p -- \"{}\" ; touch \"{}\"",
                    path.display(),
                    marker.display()
                )
            }
            BackupError::NoSpaceAndNoOldBackup => {
                "No space left on the backup destination and there is no old backup left to delete. \
                 Free up space or use a larger destination."
                    .to_string()
            }
            BackupError::SyncFailure { exit_code } => {
                format!(
                    "The sync engine exited with code {}. The partial snapshot and the in-progress \
                     marker were kept; the next run will resume from them.",
                    exit_code
                )
            }
            BackupError::InterruptedBySignal => {
                "Backup interrupted. The next run will resume the unfinished snapshot.".to_string()
            }
            BackupError::EngineSpawn { program, .. } => {
                format!(
                    "Could not run {:?}. Make sure rsync is installed or set --rsync-path.",
                    program
                )
            }
            _ => self.to_string(),
        }
    }
}
