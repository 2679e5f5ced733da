// error.rs — Error types for container sessions.

use thiserror::Error;

/// Errors that can occur while managing agent containers.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Neither docker nor podman was found on PATH.
    #[error("no container engine found (tried docker, podman)")]
    NoEngine,

    /// Spawning the engine CLI failed.
    #[error("container engine failed to start: {0}")]
    Spawn(#[from] std::io::Error),

    /// The engine CLI exited non-zero.
    #[error("container command failed ({command}): {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The agent's stdout could not be parsed by the adapter.
    #[error("could not parse agent output: {0}")]
    BadAgentOutput(String),
}
