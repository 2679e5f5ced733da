//! # ic-mediator
//!
//! The trusted mediation process of IronCurtain.
//!
//! The mediator fronts every downstream tool server as one aggregated
//! stdio JSON-RPC tool server. Each `tools/call`:
//!
//! 1. resolves the downstream server and annotation,
//! 2. normalizes path-role argument values,
//! 3. evaluates the two-phase policy,
//! 4. on `escalate`, optionally consults the auto-approver, then blocks on
//!    the file-based human escalation,
//! 5. records a redacted, fsynced audit entry, and only then
//! 6. answers the agent — forwarding downstream only on `allow`.
//!
//! Nothing in this crate can upgrade a deny to an allow: auto-approver
//! failures escalate, escalation timeouts deny, and an audit write failure
//! cancels the call outright.

mod config;
mod error;
mod server;

pub use config::MediatorConfig;
pub use error::MediatorError;
pub use server::{serve_stdio, serve_unix, Mediator, ToolCallRequest};
