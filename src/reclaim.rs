//! Space reclamation and the sync retry loop
//!
//! When the destination fills up, the oldest snapshot is sacrificed (with
//! the caller's consent) and the sync is attempted again against the same
//! target directory. The engine picks up where it stopped because the
//! partial target is left in place; only historical snapshots are deleted,
//! never the one being populated.

use crate::confirm::Confirm;
use crate::destination::Destination;
use crate::error::{BackupError, Result};
use crate::snapshot::{Snapshot, SnapshotId};
use crate::sync::{SyncEngine, SyncInvoker};
use crate::types::RunContext;
use tracing::{error, info, instrument, warn};

/// Question put to the caller before an old snapshot is deleted
pub const RECLAIM_QUESTION: &str =
    "No space left on the backup destination. Delete the oldest backup and retry?";

/// How the retry loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The engine succeeded
    Synced,
    /// Space ran out and the caller declined to delete anything
    Declined,
}

/// Delete the oldest snapshot other than `target`
///
/// # Errors
///
/// Returns [`BackupError::NoSpaceAndNoOldBackup`] without deleting anything
/// when `target` is the only snapshot left.
pub fn reclaim_oldest(dest: &Destination, target: &SnapshotId) -> Result<Snapshot> {
    let snapshots = dest.snapshots()?;
    let oldest = match snapshots.excluding(target).next() {
        Some(oldest) if snapshots.count() >= 2 => oldest.clone(),
        _ => {
            error!("No space left on device, and no old backup to delete");
            return Err(BackupError::NoSpaceAndNoOldBackup);
        }
    };

    warn!("No space left on device - removing oldest backup {}", oldest.id);
    dest.delete_snapshot(&oldest)?;
    Ok(oldest)
}

/// Run the engine until it succeeds, fails fatally, or the caller declines
///
/// Each out-of-space attempt asks `confirm` before deleting the oldest
/// snapshot and retrying. If the deleted snapshot was the link base, the
/// newest remaining completed snapshot becomes the link base.
#[instrument(skip_all, fields(snapshot = %ctx.target.id))]
pub fn sync_until_done<E, C>(
    invoker: &SyncInvoker<'_, E>,
    confirm: &C,
    ctx: &mut RunContext,
) -> Result<LoopOutcome>
where
    E: SyncEngine + ?Sized,
    C: Confirm + ?Sized,
{
    loop {
        let attempt = invoker.run_sync(ctx)?;
        ctx.attempts += 1;

        match attempt.into_result() {
            Ok(()) => {
                info!("Sync succeeded after {} attempt(s)", ctx.attempts);
                return Ok(LoopOutcome::Synced);
            }
            Err(e) if e.is_recoverable() => {
                warn!("{}", e);
                if !confirm.confirm(RECLAIM_QUESTION) {
                    info!("Not deleting old backups; stopping");
                    return Ok(LoopOutcome::Declined);
                }

                let removed = reclaim_oldest(&ctx.destination, &ctx.target.id)?;
                if ctx.link_base.as_ref().map(|b| &b.id) == Some(&removed.id) {
                    let snapshots = ctx.destination.snapshots()?;
                    ctx.link_base = snapshots.excluding(&ctx.target.id).next_back().cloned();
                    info!(
                        "Link base {} was removed; now linking against {:?}",
                        removed.id,
                        ctx.link_base.as_ref().map(|b| b.id.as_str())
                    );
                }
                ctx.reclaimed.push(removed.id);
            }
            Err(e) => {
                error!("{}", e);
                return Err(e);
            }
        }
    }
}
