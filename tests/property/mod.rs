//! Property-based tests for snapshot ordering and space reclamation

use ::tmbackup::scripted::{ScriptedEngine, ScriptedStep};
use ::tmbackup::*;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Snapshot name `offset` seconds after the base time
fn name_at(offset: u32) -> String {
    SnapshotId::from_datetime(&(base_time() + Duration::seconds(offset as i64)).and_utc())
        .as_str()
        .to_string()
}

fn marked_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(destination::MARKER_FILE), b"").unwrap();
    dir
}

fn junk_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z]{1,12}",
        "[0-9]{4}-[0-9]{2}-[0-9]{2}",
        "[0-9]{4}-[0-9]{2}-[0-9]{2}-[0-9]{7}",
        Just("2024-01-01_000000".to_string()),
        Just("2024-01-01-000000.bak".to_string()),
    ]
    .prop_filter("must not be a valid snapshot name", |name| {
        !snapshot::is_snapshot_name(name)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_listing_is_sorted_and_filtered(
        offsets in prop::collection::btree_set(0u32..400_000_000, 0..20),
        junk in prop::collection::btree_set(junk_name(), 0..6),
    ) {
        let dir = marked_dir();
        let mut expected = BTreeSet::new();
        for offset in &offsets {
            let name = name_at(*offset);
            fs::create_dir(dir.path().join(&name)).unwrap();
            expected.insert(name);
        }
        for name in &junk {
            fs::create_dir(dir.path().join(name)).unwrap();
        }

        let list = list_snapshots(dir.path()).unwrap();
        let names: Vec<String> = list.ids().into_iter().map(String::from).collect();
        let expected: Vec<String> = expected.into_iter().collect();

        prop_assert_eq!(&names, &expected);
        prop_assert_eq!(list.count(), expected.len());
        prop_assert_eq!(
            list.newest().map(|s| s.id.as_str().to_string()),
            expected.last().cloned()
        );
        prop_assert_eq!(
            list.oldest().map(|s| s.id.as_str().to_string()),
            expected.first().cloned()
        );
    }

    #[test]
    fn prop_id_order_matches_time_order(a in 0u32..400_000_000, b in 0u32..400_000_000) {
        let id_a = SnapshotId::parse(&name_at(a)).unwrap();
        let id_b = SnapshotId::parse(&name_at(b)).unwrap();
        prop_assert_eq!(id_a.cmp(&id_b), id_a.timestamp().cmp(&id_b.timestamp()));
        prop_assert_eq!(id_a.cmp(&id_b), a.cmp(&b));
    }

    #[test]
    fn prop_reclaim_deletes_the_oldest_first(
        n in 1usize..7,
        k in 0usize..8,
    ) {
        let dest_dir = marked_dir();
        let source = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();

        let existing: Vec<String> = (0..n as u32).map(|i| name_at(i * 86_400)).collect();
        for name in &existing {
            fs::create_dir(dest_dir.path().join(name)).unwrap();
        }

        let mut steps: Vec<ScriptedStep> = (0..k).map(|_| ScriptedStep::exit(28)).collect();
        steps.push(ScriptedStep::success());
        let engine = Arc::new(ScriptedEngine::new(steps));
        let backup = BackupBuilder::new()
            .config(BackupConfig {
                log_dir: Some(logs.path().to_path_buf()),
                ..Default::default()
            })
            .engine(engine.clone())
            .confirm(AutoConfirm)
            .build(source.path(), dest_dir.path())
            .unwrap();

        let target = SnapshotId::parse(&name_at(n as u32 * 86_400)).unwrap();
        let result = backup.run_as(target.clone());
        let remaining: Vec<String> = list_snapshots(dest_dir.path())
            .unwrap()
            .ids()
            .into_iter()
            .map(String::from)
            .collect();

        if k <= n {
            let report = match result.unwrap() {
                RunOutcome::Completed(report) => report,
                other => panic!("unexpected outcome {:?}", other),
            };
            let reclaimed: Vec<String> = report.reclaimed.into_iter().map(String::from).collect();
            prop_assert_eq!(&reclaimed[..], &existing[..k]);
            let mut expected = existing[k..].to_vec();
            expected.push(target.as_str().to_string());
            prop_assert_eq!(remaining, expected);
            prop_assert_eq!(engine.calls(), k + 1);
        } else {
            prop_assert!(matches!(result, Err(BackupError::NoSpaceAndNoOldBackup)));
            prop_assert_eq!(remaining, vec![target.as_str().to_string()]);
            prop_assert_eq!(engine.calls(), n + 1);
        }
    }
}
