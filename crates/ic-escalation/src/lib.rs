//! # ic-escalation
//!
//! File-based escalation IPC for IronCurtain.
//!
//! When the policy engine returns `escalate`, the mediator writes
//! `request-<id>.json` into the session's escalation directory and polls
//! for `response-<id>.json`. A listener process (possibly serving many
//! sessions at once) watches the directory, shows the request to a human,
//! and writes the response. Atomic rename is the only synchronization
//! primitive: a reader either sees a complete file or none.
//!
//! The shared session registry (`session-<id>.json` files with a pid) lets
//! one listener discover every live session on the machine; a lock file
//! keeps the listener single-instance.

mod error;
mod lock;
mod protocol;
mod registry;
mod requester;
mod watcher;

pub use error::EscalationError;
pub use lock::ListenerLock;
pub use protocol::{
    write_json_atomic, EscalationDecision, EscalationDir, EscalationRequest, EscalationResponse,
    UserContext,
};
pub use registry::{SessionRegistration, SessionRegistry};
pub use requester::{request_decision, EscalationOutcome, RequesterConfig};
pub use watcher::{EscalationWatcher, ResolveStatus};
