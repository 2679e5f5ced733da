//! # ic-session
//!
//! Session lifecycle for IronCurtain.
//!
//! A session owns a directory tree under `$IRONCURTAIN_HOME/sessions/<id>`
//! (sandbox, escalations, sockets, audit log, logs), a running mediator
//! served on a Unix socket, and an agent — either the built-in
//! code-interpreter agent connected as a JSON-RPC client, or an external
//! agent inside a network-isolated container routed through the MITM
//! egress proxy.
//!
//! Configuration is collected once at boot (config.json plus recognized
//! environment variables) into an immutable [`Settings`] value;
//! environment reads never happen past the boot path.

mod config;
mod error;
mod paths;
mod session;

pub use config::{
    boot_settings, AutoApproveConfig, SandboxPolicy, Settings, UserConfig,
};
pub use error::SessionError;
pub use paths::{validate_session_id, HomePaths, SessionPaths};
pub use session::{AgentChoice, Session, SessionManager, SessionStatus, StartOptions};
