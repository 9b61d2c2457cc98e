//! Utility functions for tmbackup
//!
//! Argument screening, symbolic link helpers, directory statistics and
//! human-readable formatting shared by the library and the CLI.

use crate::error::{BackupError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reject arguments containing a single quote
///
/// Checked for every user-supplied path before anything on disk is touched.
///
/// # Errors
///
/// Returns [`BackupError::Argument`] for the first offending argument.
pub fn validate_arguments<'a, I>(args: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Path>,
{
    for arg in args {
        let text = arg.to_string_lossy();
        if text.contains('\'') {
            return Err(BackupError::Argument {
                argument: text.into_owned(),
            });
        }
    }
    Ok(())
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::unix::fs::symlink;
    symlink(target, link)?;
    Ok(())
}

/// Create a symlink (Windows)
#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    if target.is_dir() {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}

/// Read symlink target
pub fn read_symlink(path: &Path) -> Result<PathBuf> {
    Ok(fs::read_link(path)?)
}

/// File count and byte total of a directory tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    /// Regular files found
    pub files: u64,
    /// Sum of their sizes
    pub bytes: u64,
}

/// Walk `path` and total up its regular files
///
/// Symbolic links are not followed. Hard-linked files are counted once per
/// name, matching what a user browsing the snapshot sees.
pub fn dir_stats(path: &Path) -> Result<DirStats> {
    let mut stats = DirStats::default();
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            stats.files += 1;
            stats.bytes += entry.metadata()?.len();
        }
    }
    Ok(stats)
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
