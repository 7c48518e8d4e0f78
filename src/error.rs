//! Error taxonomy for probes and mutating actions.
//!
//! Probe failures are recoverable (a component degrades to "unknown" in the
//! status report); action failures abort the action that raised them and are
//! surfaced in its `ActionResult`.

use thiserror::Error;

/// Failure of a read-only detection probe.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("`{tool}` not found on PATH")]
    ToolNotFound { tool: String },

    #[error("`{tool}` failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("`{tool}` timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },
}

/// Failure of a mutating action or of one of its gates.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("root privileges required (re-run with sudo)")]
    MissingPrivilege,

    #[error("precondition not met: {0}")]
    MissingPrecondition(String),

    #[error("required tool `{tool}` not found on PATH")]
    ToolNotFound { tool: String },

    #[error("`{command}` exited with code {code}: {stderr}")]
    ExternalCommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("{what} is busy: {detail}")]
    ResourceBusy { what: String, detail: String },

    #[error("declined: {0}")]
    UserDeclined(String),

    #[error("{operation} is not supported for {component}")]
    Unsupported {
        component: &'static str,
        operation: &'static str,
    },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Build an `ExternalCommandFailed` from a finished command, keeping only
    /// the tail of stderr so the reason stays a one-liner.
    pub fn command_failed(
        command: impl Into<String>,
        output: &crate::runner::CommandOutput,
    ) -> Self {
        Self::ExternalCommandFailed {
            command: command.into(),
            code: output.code.unwrap_or(-1),
            stderr: stderr_tail(&output.stderr_str()),
        }
    }
}

/// Last non-empty line of stderr, truncated to a displayable length.
/// Truncation counts characters, not bytes; localized tool output must not
/// be cut inside a multibyte sequence.
pub fn stderr_tail(stderr: &str) -> String {
    let line = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim();
    match line.char_indices().nth(200) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_string(),
    }
}
