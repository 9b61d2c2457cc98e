//! Latest pointer maintenance
//!
//! `latest` is a symbolic link at the destination root aimed at the newest
//! completed snapshot by absolute path. It is only ever touched after a
//! successful sync.

use crate::destination::{require_backup_destination, Destination};
use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotId};
use crate::utils;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// Retarget the latest pointer at `snapshot`
///
/// The new link is created under a unique temporary name and renamed over
/// the old one, so `latest` is never missing while it is being replaced.
#[instrument(skip_all, fields(snapshot = %snapshot.id))]
pub fn update_latest(dest: &Destination, snapshot: &Snapshot) -> Result<()> {
    require_backup_destination(dest.root())?;

    let target = fs::canonicalize(&snapshot.path)?;
    let link = dest.latest_path();
    let staging = dest
        .root()
        .join(format!(".{}.{}", crate::destination::LATEST_LINK, uuid::Uuid::new_v4()));

    utils::create_symlink(&target, &staging)?;
    if let Err(e) = fs::rename(&staging, &link) {
        if let Err(cleanup) = fs::remove_file(&staging) {
            warn!("Could not remove staging link {:?}: {}", staging, cleanup);
        }
        return Err(e.into());
    }

    debug!("{:?} -> {:?}", link, target);
    Ok(())
}

/// Publish `snapshot` as complete
///
/// Updates the latest pointer first and only then removes the in-progress
/// marker. A crash between the two steps leaves the marker behind with the
/// pointer already aimed at the finished snapshot; the resume handler
/// recognizes that state.
pub fn publish(dest: &Destination, snapshot: &Snapshot) -> Result<()> {
    update_latest(dest, snapshot)?;
    dest.clear_inprogress()?;
    info!("Snapshot {} completed", snapshot.id);
    Ok(())
}

/// Target of the latest pointer, if it exists
pub fn read_latest(dest: &Destination) -> Option<PathBuf> {
    utils::read_symlink(&dest.latest_path()).ok()
}

/// Snapshot the latest pointer resolves to
///
/// `None` when the pointer is missing, dangling, or aimed at something that
/// is not a snapshot of this destination.
pub fn latest_snapshot_id(dest: &Destination) -> Option<SnapshotId> {
    let target = read_latest(dest)?;
    if !target.is_dir() {
        return None;
    }
    let id = SnapshotId::parse(target.file_name()?.to_str()?).ok()?;
    let expected = fs::canonicalize(dest.root()).ok()?.join(id.as_str());
    let actual = fs::canonicalize(&target).ok()?;
    (expected == actual).then_some(id)
}
