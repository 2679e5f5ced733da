// error.rs — Error types for the escalation subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during escalation IPC.
#[derive(Debug, Error)]
pub enum EscalationError {
    /// An escalation file could not be read or written.
    #[error("escalation I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A file existed but did not parse as its expected schema.
    #[error("malformed escalation file at {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Another listener already holds the lock.
    #[error("escalation listener already running (pid {pid})")]
    ListenerAlreadyRunning { pid: i32 },

    /// No pending escalation with this id.
    #[error("no pending escalation '{0}'")]
    UnknownEscalation(String),
}
