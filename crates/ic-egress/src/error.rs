// error.rs — Error types for the egress proxy.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the egress proxy.
#[derive(Debug, Error)]
pub enum EgressError {
    /// CA material could not be read or written.
    #[error("CA I/O error at {path}: {source}")]
    CaIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Certificate generation or signing failed.
    #[error("certificate error: {0}")]
    Certificate(#[from] rcgen::Error),

    /// TLS configuration was rejected.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Listener or tunnel I/O failed.
    #[error("proxy I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A tunnelled request was malformed beyond answering.
    #[error("malformed tunnelled request: {0}")]
    BadRequest(String),
}
