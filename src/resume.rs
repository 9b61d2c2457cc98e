//! Resuming interrupted runs
//!
//! A run that dies leaves `backup.inprogress` behind together with a
//! partially populated snapshot, which is always the newest one. Instead of
//! starting over, the next run renames that snapshot to its own target name
//! so the engine continues filling it, and links against the snapshot
//! before it.
//!
//! One state needs care: a run that crashed after publishing the latest
//! pointer but before clearing the marker. There the newest snapshot is
//! complete, so the marker is stale; it is cleared and the run starts fresh
//! on top of that snapshot instead of reopening it.

use crate::destination::Destination;
use crate::error::Result;
use crate::latest::latest_snapshot_id;
use crate::snapshot::{Snapshot, SnapshotId, SnapshotList};
use crate::types::ResumeAction;
use tracing::{debug, info, instrument, warn};

/// Where this run will sync to, and what it links against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedTarget {
    /// Snapshot directory to populate (exists on return)
    pub target: Snapshot,
    /// Completed snapshot to link unchanged files from
    pub link_base: Option<Snapshot>,
    /// What was done to get here
    pub action: ResumeAction,
}

/// Prepare the directory for snapshot `target_id`
///
/// - No in-progress marker, or no snapshots at all: a fresh directory is
///   created and the newest existing snapshot becomes the link base. The
///   marker is written before the directory, so a run that fails from here
///   on always leaves a resumable state.
/// - Marker present and the latest pointer already names the newest
///   snapshot: the stale marker is cleared, then as above.
/// - Marker present otherwise: the newest snapshot is renamed to
///   `target_id` and the second newest becomes the link base.
#[instrument(skip(dest), fields(dest = ?dest.root()))]
pub fn prepare_target(dest: &Destination, target_id: &SnapshotId) -> Result<PreparedTarget> {
    let snapshots = dest.snapshots()?;

    if dest.has_inprogress() {
        match snapshots.newest() {
            None => {
                debug!("In-progress marker found but no snapshot to resume");
            }
            Some(newest) if latest_snapshot_id(dest).as_ref() == Some(&newest.id) => {
                warn!(
                    "Snapshot {} was already published; clearing stale in-progress marker",
                    newest.id
                );
                dest.clear_inprogress()?;
                let completed = newest.id.clone();
                let mut prepared = fresh(dest, target_id, &snapshots)?;
                prepared.action = ResumeAction::StaleMarkerCleared { completed };
                return Ok(prepared);
            }
            Some(newest) => {
                info!("Previous backup failed or was interrupted - resuming from {}", newest.id);
                let target = if &newest.id == target_id {
                    newest.clone()
                } else {
                    dest.rename_snapshot(newest, target_id)?
                };
                return Ok(PreparedTarget {
                    target,
                    link_base: snapshots.second_newest().cloned(),
                    action: ResumeAction::Resumed {
                        from: newest.id.clone(),
                    },
                });
            }
        }
    }

    fresh(dest, target_id, &snapshots)
}

fn fresh(
    dest: &Destination,
    target_id: &SnapshotId,
    snapshots: &SnapshotList,
) -> Result<PreparedTarget> {
    let link_base = snapshots.excluding(target_id).next_back().cloned();
    dest.mark_inprogress()?;
    let target = dest.create_snapshot_dir(target_id)?;
    Ok(PreparedTarget {
        target,
        link_base,
        action: ResumeAction::Fresh,
    })
}
