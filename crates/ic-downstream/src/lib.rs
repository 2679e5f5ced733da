//! # ic-downstream
//!
//! Downstream tool-server management for IronCurtain.
//!
//! Each configured server is a stdio JSON-RPC subprocess. The manager
//! spawns them concurrently, performs the initialize/list-tools handshake,
//! and keeps one client handle per server. `tools/call` requests are
//! relayed verbatim; downstream failures are surfaced as textual errors
//! with the server-side message extracted, never as opaque validator
//! output.
//!
//! The manager also serves the **roots** protocol: downstream servers that
//! ask for their permitted filesystem roots get the session sandbox plus
//! every directory the compiled policy names; roots can be added at
//! runtime (e.g. after an approved out-of-sandbox read) and every server
//! is notified.

mod config;
mod error;
mod manager;
mod roots;

pub use config::{DownstreamConfig, ServerLaunchConfig};
pub use error::DownstreamError;
pub use manager::{extract_server_message, AggregatedTool, DownstreamManager, StartErrors};
pub use roots::{RootSet, RootsHandler};
