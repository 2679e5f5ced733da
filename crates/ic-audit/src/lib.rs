//! # ic-audit
//!
//! Append-only JSONL audit log for IronCurtain.
//!
//! Every mediated tool call produces exactly one [`AuditEntry`], written as
//! one JSON line and fsynced before the decision is returned to the agent.
//! Entries are linked by `previous_hash` into a SHA-256 chain so insertion,
//! deletion, or modification of any line is detectable with
//! [`AuditLog::verify_chain`].
//!
//! The mediator never reads the log; external tailers may watch it. The
//! log is written by exactly one writer per session.

mod entry;
mod error;
pub mod hasher;
mod log;

pub use entry::{AuditEntry, CallOutcome, DecisionStatus, OutcomeStatus, PolicyDecisionRecord};
pub use error::AuditError;
pub use log::AuditLog;
