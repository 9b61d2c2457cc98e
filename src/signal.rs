//! Interrupt handling
//!
//! Ctrl+C ends the process at once. Nothing is cleaned up: the in-progress
//! marker and the partial snapshot stay behind and are exactly what the
//! next run resumes from. The engine runs in the same process group and
//! receives the same interrupt.

use crate::error::{BackupError, Result};
use tracing::error;

/// Install the SIGINT handler
///
/// May only be called once per process.
pub fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| {
        error!("Interrupted; the next run will resume this backup");
        eprintln!("{}", BackupError::InterruptedBySignal.user_message());
        std::process::exit(BackupError::InterruptedBySignal.exit_code());
    })
    .map_err(|e| BackupError::internal(format!("cannot install interrupt handler: {}", e)))
}
