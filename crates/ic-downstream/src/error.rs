// error.rs — Error types for downstream server management.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while managing downstream servers.
#[derive(Debug, Error)]
pub enum DownstreamError {
    /// The server config file could not be read.
    #[error("failed to read server config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The server config file is not valid JSON for its schema.
    #[error("malformed server config at {path}: {source}")]
    ConfigMalformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The subprocess could not be started.
    #[error("failed to spawn server '{server}': {message}")]
    Spawn { server: String, message: String },

    /// The initialize handshake failed.
    #[error("server '{server}' failed to initialize: {message}")]
    Connect { server: String, message: String },

    /// The tools/list request failed.
    #[error("tools/list failed for server '{server}': {message}")]
    ListTools { server: String, message: String },

    /// No aggregated tool with this name.
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// A relayed tools/call failed downstream.
    #[error("call to '{server}/{tool}' failed: {message}")]
    Call {
        server: String,
        tool: String,
        message: String,
    },
}
