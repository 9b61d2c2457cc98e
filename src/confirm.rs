//! Decisions delegated to the caller
//!
//! Deleting an old snapshot to make room is never done silently: the
//! reclaim loop asks a [`Confirm`] implementation first. The CLI supplies
//! [`TerminalPrompt`] (or [`AutoConfirm`] with `--yes`); tests supply
//! whatever answers they need, including plain closures.

use std::io::{self, BufRead, Write};
use tracing::debug;

/// Yes/no decision capability
pub trait Confirm {
    /// Answer `question`; `true` means go ahead
    fn confirm(&self, question: &str) -> bool;
}

impl<F: Fn(&str) -> bool> Confirm for F {
    fn confirm(&self, question: &str) -> bool {
        self(question)
    }
}

/// Always answers yes
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&self, question: &str) -> bool {
        debug!("Auto-confirming: {}", question);
        true
    }
}

/// Always answers no
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDecline;

impl Confirm for AlwaysDecline {
    fn confirm(&self, question: &str) -> bool {
        debug!("Declining: {}", question);
        false
    }
}

/// Asks on the terminal
///
/// Anything other than `y`/`yes` (case-insensitive), including end of
/// input, is a no.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    fn ask(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
        write!(output, "{} [y/N] ", question)?;
        output.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }
}

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str) -> bool {
        let stdin = io::stdin();
        let mut stderr = io::stderr();
        Self::ask(question, &mut stdin.lock(), &mut stderr).unwrap_or(false)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
