// error.rs — Error types for the session layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while managing sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session id failed the `[A-Za-z0-9_-]+` check.
    #[error("invalid session id '{0}': only [A-Za-z0-9_-]+ is allowed")]
    InvalidSessionId(String),

    /// The requested session directory does not exist.
    #[error("no such session '{0}'")]
    UnknownSession(String),

    /// The session is closed; no further operations are possible.
    #[error("session '{0}' is closed")]
    SessionClosed(String),

    /// Session tree or config I/O failed.
    #[error("session I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// config.json is not valid JSON.
    #[error("malformed config at {path}: {source}")]
    MalformedConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Mediator(#[from] ic_mediator::MediatorError),

    #[error(transparent)]
    Escalation(#[from] ic_escalation::EscalationError),

    #[error(transparent)]
    Agent(#[from] ic_agent::AgentError),

    #[error(transparent)]
    Provider(#[from] ic_provider::ProviderError),

    #[error(transparent)]
    Egress(#[from] ic_egress::EgressError),

    #[error(transparent)]
    Container(#[from] ic_container::ContainerError),

    /// Connecting the built-in agent to the mediator socket failed.
    #[error("agent connection failed: {0}")]
    AgentConnect(String),
}
