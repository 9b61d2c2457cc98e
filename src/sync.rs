//! Sync engine invocation
//!
//! The file transfer itself is delegated to an external engine behind the
//! [`SyncEngine`] trait. [`RsyncEngine`] is the production implementation:
//! it spawns rsync with a structured argument list (no shell involved).
//!
//! [`SyncInvoker`] wraps one attempt: it marks the destination as in
//! progress, gives the engine a fresh per-attempt log file, reads the log
//! back once the engine exits, deletes it, and classifies the result.
//!
//! ## Classification
//!
//! The exit status is authoritative. A zero status is success no matter
//! what the log says. A non-zero status is treated as exhausted space when
//! it is 28 (`ENOSPC`) or 34 (`ERANGE`), or when the log contains the
//! engine's rendering of either errno. Scanning the log is best effort: it
//! depends on the engine's message wording and locale.

use crate::error::{BackupError, Result};
use crate::snapshot::SnapshotId;
use crate::types::{BackupConfig, EngineStatus, RunContext, SyncRequest};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// `ENOSPC`: no space left on device
pub const EXIT_NO_SPACE: i32 = 28;

/// `ERANGE`: result too large, reported by some filesystems when full
pub const EXIT_RESULT_TOO_LARGE: i32 = 34;

/// Log fragments that identify exhausted space
pub const OUT_OF_SPACE_PATTERNS: &[&str] = &[
    "No space left on device (28)",
    "Result too large (34)",
];

/// External file synchronization engine
pub trait SyncEngine {
    /// Populate `request.destination` from `request.source`
    ///
    /// Returns how the engine ended. Only failures to run the engine at all
    /// are errors; a non-zero exit is a normal [`EngineStatus`].
    fn run(&self, request: &SyncRequest) -> Result<EngineStatus>;
}

impl<T: SyncEngine + ?Sized> SyncEngine for Box<T> {
    fn run(&self, request: &SyncRequest) -> Result<EngineStatus> {
        (**self).run(request)
    }
}

impl<T: SyncEngine + ?Sized> SyncEngine for Arc<T> {
    fn run(&self, request: &SyncRequest) -> Result<EngineStatus> {
        (**self).run(request)
    }
}

/// rsync as the sync engine
#[derive(Debug, Clone)]
pub struct RsyncEngine {
    program: PathBuf,
    flags: Vec<String>,
    extra_args: Vec<String>,
}

impl RsyncEngine {
    /// Engine configured from `config`
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            program: config.rsync_path.clone(),
            flags: config.rsync_flags.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    /// Program that will be executed
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Argument list for `request`
    ///
    /// Deletion mirrors the source, including files excluded by filter
    /// rules. Source and destination get a trailing slash so rsync copies
    /// directory contents rather than the directory itself.
    pub fn args(&self, request: &SyncRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.flags.iter().map(OsString::from).collect();
        args.push("--delete".into());
        args.push("--delete-excluded".into());

        if let Some(include) = &request.include_from {
            args.push("--include-from".into());
            args.push(include.into());
        }
        if let Some(exclude) = &request.exclude_from {
            args.push("--exclude-from".into());
            args.push(exclude.into());
        }
        if let Some(base) = &request.link_base {
            args.push("--link-dest".into());
            args.push(base.into());
        }
        args.push("--log-file".into());
        args.push(request.log_file.as_os_str().into());

        args.extend(self.extra_args.iter().map(OsString::from));
        args.push("--".into());
        args.push(with_trailing_slash(&request.source));
        args.push(with_trailing_slash(&request.destination));
        args
    }
}

impl SyncEngine for RsyncEngine {
    fn run(&self, request: &SyncRequest) -> Result<EngineStatus> {
        let args = self.args(request);
        debug!("Running {:?} {:?}", self.program, args);

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|source| BackupError::EngineSpawn {
                program: self.program.clone(),
                source,
            })?;

        Ok(match status.code() {
            Some(code) => EngineStatus::Exited(code),
            None => EngineStatus::Signalled,
        })
    }
}

fn with_trailing_slash(path: &Path) -> OsString {
    let mut s = path.as_os_str().to_os_string();
    if !path.to_string_lossy().ends_with('/') {
        s.push("/");
    }
    s
}

/// Result of one engine attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAttempt {
    /// How the engine ended
    pub status: EngineStatus,
    /// Captured engine log
    pub log: String,
}

impl SyncAttempt {
    /// Whether the log shows exhausted space
    pub fn log_reports_no_space(&self) -> bool {
        OUT_OF_SPACE_PATTERNS.iter().any(|p| self.log.contains(p))
    }

    /// Turn the attempt into success or a classified error
    ///
    /// # Errors
    ///
    /// - [`BackupError::OutOfSpace`] when space ran out
    /// - [`BackupError::SyncFailure`] for any other non-zero exit
    /// - [`BackupError::InterruptedBySignal`] when the engine was killed
    pub fn into_result(self) -> Result<()> {
        match self.status {
            EngineStatus::Exited(0) => Ok(()),
            EngineStatus::Exited(code)
                if code == EXIT_NO_SPACE
                    || code == EXIT_RESULT_TOO_LARGE
                    || self.log_reports_no_space() =>
            {
                Err(BackupError::OutOfSpace { exit_code: code })
            }
            EngineStatus::Exited(code) => Err(BackupError::SyncFailure { exit_code: code }),
            EngineStatus::Signalled => Err(BackupError::InterruptedBySignal),
        }
    }
}

/// Runs single sync attempts against a destination
pub struct SyncInvoker<'a, E: SyncEngine + ?Sized> {
    engine: &'a E,
    log_dir: PathBuf,
    keep_logs_on_failure: bool,
}

impl<'a, E: SyncEngine + ?Sized> SyncInvoker<'a, E> {
    /// Invoker writing attempt logs under `log_dir`
    pub fn new(engine: &'a E, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            log_dir: log_dir.into(),
            keep_logs_on_failure: false,
        }
    }

    /// Keep the log of failed attempts as `<name>.failed.log`
    pub fn keep_logs_on_failure(mut self, keep: bool) -> Self {
        self.keep_logs_on_failure = keep;
        self
    }

    /// Run one attempt for `ctx`
    ///
    /// The in-progress marker is (re)created before the engine starts. It is
    /// never removed here; publishing the snapshot does that.
    #[instrument(skip_all, fields(snapshot = %ctx.target.id, attempt = ctx.attempts + 1))]
    pub fn run_sync(&self, ctx: &RunContext) -> Result<SyncAttempt> {
        fs::create_dir_all(&self.log_dir)?;
        let log_file = self.log_dir.join(format!("{}.log", SnapshotId::now()));
        remove_if_exists(&log_file)?;

        ctx.destination.mark_inprogress()?;

        let request = ctx.sync_request(log_file.clone());
        match &request.link_base {
            Some(base) => info!(
                "Syncing {:?} -> {:?} (linking against {:?})",
                request.source, request.destination, base
            ),
            None => info!(
                "Syncing {:?} -> {:?} (no previous snapshot)",
                request.source, request.destination
            ),
        }

        let status = match self.engine.run(&request) {
            Ok(status) => status,
            Err(e) => {
                remove_if_exists(&log_file)?;
                return Err(e);
            }
        };

        let log = match fs::read(&log_file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        if self.keep_logs_on_failure && !status.success() && log_file.exists() {
            let kept = log_file.with_extension("failed.log");
            fs::rename(&log_file, &kept)?;
            warn!("Engine log kept at {:?}", kept);
        } else {
            remove_if_exists(&log_file)?;
        }

        debug!("Engine finished with {:?}", status);
        Ok(SyncAttempt { status, log })
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
