// error.rs — Error types for provider calls.

use thiserror::Error;

/// Errors from a chat-completion call.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key configured for the selected provider.
    #[error("no API key configured for provider '{0}'")]
    MissingKey(&'static str),

    /// The HTTP request failed (transport, timeout, TLS).
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider's response did not have the expected shape.
    #[error("unexpected provider response: {0}")]
    UnexpectedResponse(String),
}
