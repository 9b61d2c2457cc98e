//! Backup destination validation
//!
//! A directory is only ever treated as a backup destination when it carries
//! the zero-byte marker file `backup.marker`. The check is repeated every
//! time a destination is touched, including the parent of any snapshot that
//! is about to be deleted, and is never cached.
//!
//! Besides the marker, the destination root holds:
//! - `backup.inprogress`: present while a snapshot is being populated, or
//!   after a run died before finishing
//! - `latest`: symbolic link to the newest completed snapshot

use crate::error::{BackupError, Result};
use crate::snapshot::{list_snapshots, Snapshot, SnapshotId, SnapshotList};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the marker file authorizing a directory as a destination
pub const MARKER_FILE: &str = "backup.marker";

/// Name of the file signalling an unfinished run
pub const INPROGRESS_FILE: &str = "backup.inprogress";

/// Name of the symbolic link to the newest completed snapshot
pub const LATEST_LINK: &str = "latest";

/// Check whether `path` is a backup destination
pub fn is_backup_destination(path: &Path) -> bool {
    path.join(MARKER_FILE).is_file()
}

/// Require `path` to be a backup destination
///
/// # Errors
///
/// Returns [`BackupError::NotABackupDestination`] naming the expected marker
/// file when it is missing.
pub fn require_backup_destination(path: &Path) -> Result<()> {
    if is_backup_destination(path) {
        Ok(())
    } else {
        warn!("Marker file missing in {:?}", path);
        Err(BackupError::NotABackupDestination {
            path: path.to_path_buf(),
            marker: path.join(MARKER_FILE),
        })
    }
}

/// A validated backup destination root
///
/// Every mutating method re-validates the marker before touching the
/// filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    root: PathBuf,
}

impl Destination {
    /// Open a destination, failing if the marker file is absent
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        require_backup_destination(&root)?;
        Ok(Self { root })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the marker file
    pub fn marker_path(&self) -> PathBuf {
        self.root.join(MARKER_FILE)
    }

    /// Path of the in-progress marker
    pub fn inprogress_path(&self) -> PathBuf {
        self.root.join(INPROGRESS_FILE)
    }

    /// Path of the latest pointer
    pub fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_LINK)
    }

    /// Snapshot `id` inside this destination
    pub fn snapshot(&self, id: SnapshotId) -> Snapshot {
        Snapshot::new(&self.root, id)
    }

    /// Enumerate snapshots, oldest first
    pub fn snapshots(&self) -> Result<SnapshotList> {
        list_snapshots(&self.root)
    }

    /// Whether a previous run left the in-progress marker behind
    pub fn has_inprogress(&self) -> bool {
        self.inprogress_path().exists()
    }

    /// Create (or refresh) the in-progress marker
    pub fn mark_inprogress(&self) -> Result<()> {
        require_backup_destination(&self.root)?;
        OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.inprogress_path())?;
        debug!("Marked {:?} as in progress", self.root);
        Ok(())
    }

    /// Remove the in-progress marker if present
    pub fn clear_inprogress(&self) -> Result<()> {
        require_backup_destination(&self.root)?;
        match fs::remove_file(self.inprogress_path()) {
            Ok(()) => {
                debug!("Cleared in-progress marker in {:?}", self.root);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Create the directory for snapshot `id`
    pub fn create_snapshot_dir(&self, id: &SnapshotId) -> Result<Snapshot> {
        require_backup_destination(&self.root)?;
        let snapshot = self.snapshot(id.clone());
        fs::create_dir_all(&snapshot.path)?;
        debug!("Created snapshot directory {:?}", snapshot.path);
        Ok(snapshot)
    }

    /// Rename snapshot `from` to the identifier `to`
    pub fn rename_snapshot(&self, from: &Snapshot, to: &SnapshotId) -> Result<Snapshot> {
        require_backup_destination(&self.root)?;
        let target = self.snapshot(to.clone());
        fs::rename(&from.path, &target.path)?;
        debug!("Renamed snapshot {} to {}", from.id, to);
        Ok(target)
    }

    /// Recursively delete a snapshot directory
    ///
    /// The snapshot's parent directory is re-validated as a backup
    /// destination immediately before deletion, independently of this
    /// destination's root, so a miscomputed path can never delete outside a
    /// marked destination.
    pub fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let parent = snapshot
            .path
            .parent()
            .ok_or_else(|| BackupError::internal(format!("{:?} has no parent", snapshot.path)))?;
        require_backup_destination(parent)?;
        if !snapshot.path.starts_with(&self.root) {
            return Err(BackupError::internal(format!(
                "Refusing to delete {:?}: outside destination {:?}",
                snapshot.path, self.root
            )));
        }
        fs::remove_dir_all(&snapshot.path)?;
        debug!("Deleted snapshot {}", snapshot.id);
        Ok(())
    }
}
