//! In-process sync engine replaying canned results
//!
//! [`ScriptedEngine`] stands in for rsync wherever a real transfer is not
//! wanted: each call pops the next [`ScriptedStep`], writes the step's files
//! into the destination snapshot and its log text into the request's log
//! file, then returns the step's status. When the script runs out every
//! further call succeeds. All requests are recorded for inspection.
//!
//! ```rust
//! use tmbackup::scripted::{ScriptedEngine, ScriptedStep};
//!
//! let engine = ScriptedEngine::new(vec![
//!     ScriptedStep::out_of_space(23),
//!     ScriptedStep::success().with_file("notes.txt", b"hello"),
//! ]);
//! assert_eq!(engine.calls(), 0);
//! ```

use crate::error::Result;
use crate::sync::{SyncEngine, OUT_OF_SPACE_PATTERNS};
use crate::types::{EngineStatus, SyncRequest};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

/// One canned engine result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedStep {
    /// Status to report
    pub status: EngineStatus,
    /// Text written to the log file
    pub log: Option<String>,
    /// Files written into the destination, relative to it
    pub files: Vec<(PathBuf, Vec<u8>)>,
}

impl ScriptedStep {
    /// Exit status 0
    pub fn success() -> Self {
        Self::exit(0)
    }

    /// Arbitrary exit status
    pub fn exit(code: i32) -> Self {
        Self {
            status: EngineStatus::Exited(code),
            log: None,
            files: Vec::new(),
        }
    }

    /// Non-zero exit whose log reports `ENOSPC`
    pub fn out_of_space(code: i32) -> Self {
        Self::exit(code).with_log(format!(
            "rsync: write failed on \"data.bin\": {}",
            OUT_OF_SPACE_PATTERNS[0]
        ))
    }

    /// Engine killed by a signal
    pub fn signalled() -> Self {
        Self {
            status: EngineStatus::Signalled,
            log: None,
            files: Vec::new(),
        }
    }

    /// Set the log text
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }

    /// Add a file to write into the destination
    pub fn with_file(mut self, path: impl Into<PathBuf>, content: &[u8]) -> Self {
        self.files.push((path.into(), content.to_vec()));
        self
    }
}

/// Sync engine that replays a script
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    steps: Mutex<VecDeque<ScriptedStep>>,
    requests: Mutex<Vec<SyncRequest>>,
}

impl ScriptedEngine {
    /// Engine replaying `steps` in order
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Engine that always succeeds
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().clone()
    }

    /// Number of calls so far
    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Steps not yet replayed
    pub fn remaining(&self) -> usize {
        self.steps.lock().len()
    }
}

impl SyncEngine for ScriptedEngine {
    fn run(&self, request: &SyncRequest) -> Result<EngineStatus> {
        self.requests.lock().push(request.clone());
        let step = self
            .steps
            .lock()
            .pop_front()
            .unwrap_or_else(ScriptedStep::success);

        for (path, content) in &step.files {
            let full = request.destination.join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(full, content)?;
        }
        if let Some(log) = &step.log {
            fs::write(&request.log_file, log)?;
        }

        Ok(step.status)
    }
}
