// error.rs — Error types for the agent core.

use thiserror::Error;

/// Errors that can occur while running the built-in agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model call failed.
    #[error("model call failed: {0}")]
    Provider(#[from] ic_provider::ProviderError),

    /// The isolate rejected or aborted the script.
    #[error("script execution failed: {0}")]
    Isolate(String),

    /// A blocking task was cancelled or panicked.
    #[error("agent task failed: {0}")]
    Task(String),
}
