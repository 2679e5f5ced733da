// error.rs — Error types for the mediator.

use thiserror::Error;

/// Errors that can occur while starting or running the mediator.
#[derive(Debug, Error)]
pub enum MediatorError {
    /// Policy artifacts failed to load or validate. Fatal at start.
    #[error("policy configuration error: {0}")]
    Policy(#[from] ic_policy::PolicyError),

    /// The audit log could not be opened or written. An append failure
    /// cancels the call it belongs to.
    #[error("audit error: {0}")]
    Audit(#[from] ic_audit::AuditError),

    /// Escalation IPC failed in a way that is not a timeout.
    #[error("escalation error: {0}")]
    Escalation(#[from] ic_escalation::EscalationError),

    /// Downstream server management failed.
    #[error("downstream error: {0}")]
    Downstream(#[from] ic_downstream::DownstreamError),

    /// Serving the JSON-RPC endpoint failed.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}
