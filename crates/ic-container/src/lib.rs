//! # ic-container
//!
//! Container sessions for external agents (container mode).
//!
//! The agent runs in an ephemeral container with **no network**. The only
//! bind mount is the session's `sockets/` directory — escalation files and
//! the audit log are never exposed. In-container `socat` bridges loopback
//! TCP to the mounted Unix sockets: one bridge to the MITM egress proxy
//! (all HTTPS goes through it, trusted via the mounted IronCurtain CA) and
//! one to the mediator (all tool calls). Each turn is a single `exec`
//! whose stdout is parsed per agent adapter.
//!
//! The container engine (docker or podman) is driven through its CLI; the
//! image is built on first use and labelled with a content hash so
//! rebuilds happen only when the build inputs change.

mod adapter;
mod error;
mod runtime;

pub use adapter::AgentAdapter;
pub use error::ContainerError;
pub use runtime::{ContainerRuntime, ContainerSession, ContainerSpec, DEFAULT_DOCKERFILE};
