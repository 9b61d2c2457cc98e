//! Retention-based expiry of old snapshots
//!
//! Thins out history after a successful run: everything recent is kept,
//! older snapshots are reduced to one per day, and beyond the daily window
//! to one per ISO week. Within each day or week the earliest snapshot
//! survives, so the choice does not shift as new snapshots arrive.

use crate::destination::Destination;
use crate::error::Result;
use crate::snapshot::{Snapshot, SnapshotId, SnapshotList};
use crate::types::ExpirePolicy;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Bucket {
    Day(NaiveDate),
    Week(i32, u32),
}

/// Snapshots the policy would delete, oldest first
///
/// The newest snapshot and `protect` are never selected, nor are snapshots
/// whose name does not parse as a real date.
pub fn select_expired(
    snapshots: &SnapshotList,
    now: NaiveDateTime,
    policy: &ExpirePolicy,
    protect: &SnapshotId,
) -> Vec<Snapshot> {
    let keep_all = Duration::hours(i64::from(policy.keep_all_hours));
    let keep_daily = Duration::days(i64::from(policy.keep_daily_days));
    let newest = snapshots.newest().map(|s| s.id.clone());

    let mut seen = HashSet::new();
    let mut expired = Vec::new();

    for snapshot in snapshots.iter() {
        if &snapshot.id == protect || Some(&snapshot.id) == newest.as_ref() {
            continue;
        }
        let Some(taken) = snapshot.id.timestamp() else {
            continue;
        };
        let age = now - taken;
        if age < keep_all {
            continue;
        }
        let bucket = if age < keep_daily {
            Bucket::Day(taken.date())
        } else {
            let week = taken.iso_week();
            Bucket::Week(week.year(), week.week())
        };
        if !seen.insert(bucket) {
            expired.push(snapshot.clone());
        }
    }

    expired
}

/// Delete the snapshots `policy` expires
///
/// Returns the identifiers that were deleted.
#[instrument(skip(dest, policy))]
pub fn expire_snapshots(
    dest: &Destination,
    now: NaiveDateTime,
    policy: &ExpirePolicy,
    protect: &SnapshotId,
) -> Result<Vec<SnapshotId>> {
    let snapshots = dest.snapshots()?;
    let mut removed = Vec::new();
    for snapshot in select_expired(&snapshots, now, policy, protect) {
        info!("Expiring {}", snapshot.id);
        dest.delete_snapshot(&snapshot)?;
        removed.push(snapshot.id);
    }
    Ok(removed)
}
