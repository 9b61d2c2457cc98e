//! Snapshot identifiers and enumeration
//!
//! A snapshot is a directory directly under the destination root whose name
//! is a zero-padded local timestamp of the form `YYYY-MM-DD-HHMMSS`. Because
//! the format is fixed-width, sorting names lexicographically sorts them
//! chronologically, which is all the enumerator relies on.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use tmbackup::snapshot::list_snapshots;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshots = list_snapshots(Path::new("/mnt/backup"))?;
//! if let Some(newest) = snapshots.newest() {
//!     println!("Newest snapshot: {}", newest.id);
//! }
//! # Ok(())
//! # }
//! ```

use crate::error::{BackupError, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// `strftime` format of snapshot directory names
pub const SNAPSHOT_FORMAT: &str = "%Y-%m-%d-%H%M%S";

/// Length of a snapshot directory name
pub const SNAPSHOT_NAME_LEN: usize = 17;

/// Identifier of a snapshot: its directory name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Parse a directory name into a snapshot identifier
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::InvalidSnapshotName`] if `name` does not match
    /// `YYYY-MM-DD-HHMMSS`.
    pub fn parse(name: &str) -> Result<Self> {
        if is_snapshot_name(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(BackupError::InvalidSnapshotName(name.to_string()))
        }
    }

    /// Identifier for a point in local time
    pub fn from_datetime<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(time.format(SNAPSHOT_FORMAT).to_string())
    }

    /// Identifier for the current local time
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Timestamp encoded in the name
    ///
    /// `None` when the name matches the pattern but is not a real date
    /// (e.g. month 13).
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0, SNAPSHOT_FORMAT).ok()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SnapshotId {
    type Error = BackupError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SnapshotId> for String {
    fn from(id: SnapshotId) -> Self {
        id.0
    }
}

/// Check whether a directory name matches the snapshot pattern
pub fn is_snapshot_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == SNAPSHOT_NAME_LEN
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 | 10 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

/// A snapshot directory under a destination root
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Snapshot {
    /// Directory name
    pub id: SnapshotId,
    /// Absolute (or destination-relative, as given) path of the directory
    pub path: PathBuf,
}

impl Snapshot {
    /// Snapshot `id` inside `root`
    pub fn new(root: &Path, id: SnapshotId) -> Self {
        let path = root.join(id.as_str());
        Self { id, path }
    }
}

/// Snapshots of one destination, oldest first
#[derive(Debug, Clone, Default)]
pub struct SnapshotList {
    snapshots: Vec<Snapshot>,
}

impl SnapshotList {
    /// Build a list from arbitrary snapshots, sorting them oldest first
    pub fn from_snapshots(mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort();
        snapshots.dedup_by(|a, b| a.id == b.id);
        Self { snapshots }
    }

    /// Most recent snapshot
    pub fn newest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// Snapshot just before the most recent one
    pub fn second_newest(&self) -> Option<&Snapshot> {
        self.snapshots.iter().rev().nth(1)
    }

    /// Oldest snapshot
    pub fn oldest(&self) -> Option<&Snapshot> {
        self.snapshots.first()
    }

    /// Number of snapshots
    pub fn count(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the destination holds no snapshot at all
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Look up a snapshot by id
    pub fn get(&self, id: &SnapshotId) -> Option<&Snapshot> {
        self.snapshots
            .binary_search_by(|s| s.id.cmp(id))
            .ok()
            .map(|idx| &self.snapshots[idx])
    }

    /// Iterate oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    /// Snapshots other than `id`, oldest first
    pub fn excluding<'a>(&'a self, id: &'a SnapshotId) -> impl DoubleEndedIterator<Item = &'a Snapshot> {
        self.snapshots.iter().filter(move |s| &s.id != id)
    }

    /// Identifiers, oldest first
    pub fn ids(&self) -> Vec<SnapshotId> {
        self.snapshots.iter().map(|s| s.id.clone()).collect()
    }
}

impl IntoIterator for SnapshotList {
    type Item = Snapshot;
    type IntoIter = std::vec::IntoIter<Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.into_iter()
    }
}

/// List the snapshots directly under `root`, oldest first
///
/// Only immediate subdirectories are considered; matched directories are
/// never descended into. Symbolic links (such as the latest pointer) are
/// skipped even when their name would match.
///
/// # Errors
///
/// Returns [`BackupError::Io`] if `root` cannot be read.
pub fn list_snapshots(root: &Path) -> Result<SnapshotList> {
    let mut snapshots = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Ok(id) = SnapshotId::parse(name) {
            trace!("Found snapshot {}", id);
            snapshots.push(Snapshot { id, path: entry.path() });
        }
    }

    Ok(SnapshotList::from_snapshots(snapshots))
}
