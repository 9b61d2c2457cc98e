//! Chaos tests for tmbackup
//!
//! Runs that die at awkward moments: engines killed by signals, crashes
//! between publishing and clearing the marker, destinations unmounted while
//! the engine is running, and long streams of failures.

use ::tmbackup::scripted::{ScriptedEngine, ScriptedStep};
use ::tmbackup::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct ChaosFixture {
    source: TempDir,
    dest: TempDir,
    logs: TempDir,
}

impl ChaosFixture {
    fn new(existing: &[&str]) -> Self {
        let fixture = Self {
            source: TempDir::new().unwrap(),
            dest: TempDir::new().unwrap(),
            logs: TempDir::new().unwrap(),
        };
        fs::write(fixture.dest.path().join(destination::MARKER_FILE), b"").unwrap();
        for name in existing {
            let dir = fixture.dest.path().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("origin.txt"), name).unwrap();
        }
        fixture
    }

    fn builder(&self) -> BackupBuilder {
        BackupBuilder::new().config(BackupConfig {
            log_dir: Some(self.logs.path().to_path_buf()),
            ..Default::default()
        })
    }

    fn backup(&self, engine: impl SyncEngine + 'static) -> Backup {
        self.builder()
            .engine(engine)
            .confirm(AutoConfirm)
            .build(self.source.path(), self.dest.path())
            .unwrap()
    }

    fn destination(&self) -> Destination {
        Destination::open(self.dest.path()).unwrap()
    }

    fn names(&self) -> Vec<String> {
        list_snapshots(self.dest.path())
            .unwrap()
            .ids()
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn origin(&self, name: &str) -> String {
        fs::read_to_string(self.dest.path().join(name).join("origin.txt")).unwrap()
    }
}

fn id(s: &str) -> SnapshotId {
    SnapshotId::parse(s).unwrap()
}

#[test]
fn test_engine_killed_by_signal() {
    let fixture = ChaosFixture::new(&["2024-01-01-000000"]);
    let engine = Arc::new(ScriptedEngine::new(vec![
        ScriptedStep::signalled().with_file("half-written.bin", b"partial"),
    ]));
    let backup = fixture.backup(engine.clone());

    let err = backup.run_as(id("2024-01-02-000000")).unwrap_err();
    assert!(matches!(err, BackupError::InterruptedBySignal));
    assert_eq!(err.exit_code(), 1);
    assert!(fixture.destination().has_inprogress());
    assert!(fixture
        .dest
        .path()
        .join("2024-01-02-000000/half-written.bin")
        .exists());

    // The next run continues filling the interrupted snapshot
    let outcome = backup.run_as(id("2024-01-03-000000")).unwrap();
    let RunOutcome::Completed(report) = outcome else {
        panic!("expected completion");
    };
    assert_eq!(
        report.resume,
        ResumeAction::Resumed {
            from: id("2024-01-02-000000")
        }
    );
    assert_eq!(report.link_base, Some(id("2024-01-01-000000")));
    assert!(report.path.join("half-written.bin").exists());
    assert_eq!(fixture.names(), vec!["2024-01-01-000000", "2024-01-03-000000"]);
    assert!(!fixture.destination().has_inprogress());
}

#[cfg(unix)]
#[test]
fn test_crash_between_publish_and_marker_removal() {
    let fixture = ChaosFixture::new(&["2024-01-01-000000", "2024-01-02-000000"]);
    let dest = fixture.destination();
    let newest = dest.snapshot(id("2024-01-02-000000"));
    latest::update_latest(&dest, &newest).unwrap();
    dest.mark_inprogress().unwrap();

    let engine = Arc::new(ScriptedEngine::succeeding());
    let outcome = fixture
        .backup(engine.clone())
        .run_as(id("2024-01-03-000000"))
        .unwrap();
    let RunOutcome::Completed(report) = outcome else {
        panic!("expected completion");
    };

    // The published snapshot survives under its own name
    assert_eq!(
        report.resume,
        ResumeAction::StaleMarkerCleared {
            completed: id("2024-01-02-000000")
        }
    );
    assert_eq!(fixture.origin("2024-01-02-000000"), "2024-01-02-000000");
    assert_eq!(report.link_base, Some(id("2024-01-02-000000")));
    assert_eq!(
        fixture.names(),
        vec!["2024-01-01-000000", "2024-01-02-000000", "2024-01-03-000000"]
    );
    assert_eq!(latest::latest_snapshot_id(&dest), Some(id("2024-01-03-000000")));
}

#[test]
fn test_repeated_failures_reuse_one_directory() {
    let fixture = ChaosFixture::new(&["2024-01-01-000000"]);
    let engine = Arc::new(ScriptedEngine::new(vec![
        ScriptedStep::exit(23).with_file("a.txt", b"a"),
        ScriptedStep::exit(12).with_file("b.txt", b"b"),
        ScriptedStep::signalled().with_file("c.txt", b"c"),
        ScriptedStep::exit(30),
        ScriptedStep::success(),
    ]));
    let backup = fixture.backup(engine.clone());

    let ids = [
        "2024-01-02-000000",
        "2024-01-03-000000",
        "2024-01-04-000000",
        "2024-01-05-000000",
    ];
    for name in ids {
        assert!(backup.run_as(id(name)).is_err());
        // Never more than one partial snapshot
        assert_eq!(fixture.names(), vec!["2024-01-01-000000", name]);
        assert!(fixture.destination().has_inprogress());
    }

    let outcome = backup.run_as(id("2024-01-06-000000")).unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));
    let final_dir = fixture.dest.path().join("2024-01-06-000000");
    for file in ["a.txt", "b.txt", "c.txt"] {
        assert!(final_dir.join(file).exists(), "{} lost across resumes", file);
    }
    assert_eq!(engine.calls(), 5);
    let base = fixture.dest.path().canonicalize().unwrap().join("2024-01-01-000000");
    assert!(engine
        .requests()
        .iter()
        .all(|r| r.link_base.as_deref() == Some(base.as_path())));
}

/// Engine that unmounts the destination (removes its marker) mid-transfer
struct Unmounting {
    marker: std::path::PathBuf,
}

impl SyncEngine for Unmounting {
    fn run(&self, _request: &SyncRequest) -> tmbackup::Result<EngineStatus> {
        fs::remove_file(&self.marker)?;
        Ok(EngineStatus::Exited(0))
    }
}

#[test]
fn test_marker_removed_during_transfer() {
    let fixture = ChaosFixture::new(&["2024-01-01-000000"]);
    let backup = fixture.backup(Unmounting {
        marker: fixture.dest.path().join(destination::MARKER_FILE),
    });

    let err = backup.run_as(id("2024-01-02-000000")).unwrap_err();
    assert!(matches!(err, BackupError::NotABackupDestination { .. }));
    assert!(!fixture.dest.path().join(destination::LATEST_LINK).exists());
    assert!(fixture.dest.path().join(destination::INPROGRESS_FILE).exists());
}

#[test]
fn test_declined_reclaim_is_resumable() {
    let fixture = ChaosFixture::new(&["2024-01-01-000000", "2024-01-02-000000"]);
    let engine = Arc::new(ScriptedEngine::new(vec![ScriptedStep::out_of_space(11)]));
    let declining = fixture
        .builder()
        .engine(engine.clone())
        .confirm(|_: &str| false)
        .build(fixture.source.path(), fixture.dest.path())
        .unwrap();

    let outcome = declining.run_as(id("2024-01-03-000000")).unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Declined {
            snapshot: id("2024-01-03-000000")
        }
    );
    assert_eq!(fixture.names().len(), 3);
    assert!(fixture.destination().has_inprogress());

    let outcome = fixture
        .backup(engine)
        .run_as(id("2024-01-04-000000"))
        .unwrap();
    let RunOutcome::Completed(report) = outcome else {
        panic!("expected completion");
    };
    assert!(matches!(report.resume, ResumeAction::Resumed { .. }));
    assert_eq!(
        fixture.names(),
        vec!["2024-01-01-000000", "2024-01-02-000000", "2024-01-04-000000"]
    );
}

#[test]
fn test_missing_engine_binary() {
    let fixture = ChaosFixture::new(&[]);
    let backup = BackupBuilder::new()
        .config(BackupConfig {
            rsync_path: fixture.source.path().join("no-such-rsync"),
            log_dir: Some(fixture.logs.path().to_path_buf()),
            ..Default::default()
        })
        .build(fixture.source.path(), fixture.dest.path())
        .unwrap();

    let err = backup.run_as(id("2024-01-01-000000")).unwrap_err();
    assert!(matches!(err, BackupError::EngineSpawn { .. }));
    assert!(fixture.destination().has_inprogress());
    assert!(is_empty_dir(fixture.logs.path()));
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).unwrap().next().is_none()
}
