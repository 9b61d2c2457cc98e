//! Main test module for tmbackup
//!
//! This module includes all test suites:
//! - Integration tests for complete runs, including a real rsync round trip
//! - Chaos tests for interruptions and crashes at awkward moments
//! - Property-based tests for enumeration and reclaim invariants

pub mod chaos;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::tmbackup::scripted::{ScriptedEngine, ScriptedStep};
    use ::tmbackup::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_destination_with_spaces() {
        let source = TempDir::new().unwrap();
        let parent = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        let dest = parent.path().join("My Backups (external)");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join(destination::MARKER_FILE), b"").unwrap();

        let backup = BackupBuilder::new()
            .config(BackupConfig {
                log_dir: Some(logs.path().to_path_buf()),
                ..Default::default()
            })
            .engine(ScriptedEngine::succeeding())
            .build(source.path(), &dest)
            .unwrap();

        let outcome = backup
            .run_as(SnapshotId::parse("2024-01-01-000000").unwrap())
            .unwrap();
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert!(dest.join("2024-01-01-000000").is_dir());
    }

    #[test]
    fn test_missing_destination() {
        let source = TempDir::new().unwrap();
        let parent = TempDir::new().unwrap();
        let err = BackupBuilder::new()
            .build(source.path(), parent.path().join("not-mounted"))
            .unwrap_err();
        assert!(matches!(err, BackupError::NotABackupDestination { .. }));
        assert!(!parent.path().join("not-mounted").exists());
    }

    #[test]
    fn test_single_quote_in_source() {
        let parent = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join(destination::MARKER_FILE), b"").unwrap();

        let err = BackupBuilder::new()
            .build(parent.path().join("bob's files"), dest.path())
            .unwrap_err();
        assert!(matches!(err, BackupError::Argument { .. }));
        assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_foreign_directories_are_left_alone() {
        let source = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let logs = TempDir::new().unwrap();
        fs::write(dest.path().join(destination::MARKER_FILE), b"").unwrap();
        fs::create_dir(dest.path().join("lost+found")).unwrap();
        fs::create_dir(dest.path().join("2024-01-01-000000.bak")).unwrap();

        let backup = BackupBuilder::new()
            .config(BackupConfig {
                log_dir: Some(logs.path().to_path_buf()),
                ..Default::default()
            })
            .engine(ScriptedEngine::new(vec![ScriptedStep::exit(28)]))
            .confirm(AutoConfirm)
            .build(source.path(), dest.path())
            .unwrap();

        // Only the target is a snapshot, so nothing may be reclaimed
        let err = backup
            .run_as(SnapshotId::parse("2024-02-01-000000").unwrap())
            .unwrap_err();
        assert!(matches!(err, BackupError::NoSpaceAndNoOldBackup));
        assert!(dest.path().join("lost+found").is_dir());
        assert!(dest.path().join("2024-01-01-000000.bak").is_dir());
    }
}
