// requester.rs — The mediator's side of the escalation protocol.
//
// Write the request atomically, poll for the response at a fixed interval
// until the deadline, then clean up. Timeout surfaces as `TimedOut`, which
// the mediator records and treats as deny.

use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::EscalationError;
use crate::protocol::{
    read_json, write_json_atomic, EscalationDecision, EscalationDir, EscalationRequest,
    EscalationResponse,
};

/// How one escalation ended, from the requester's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationOutcome {
    Approved,
    Denied,
    /// No response arrived before the deadline; the request file was
    /// removed so the listener sees the escalation as expired.
    TimedOut,
}

/// Requester timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct RequesterConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Submit an escalation and block until a decision, or the deadline.
pub async fn request_decision(
    dir: &EscalationDir,
    request: &EscalationRequest,
    config: RequesterConfig,
) -> Result<EscalationOutcome, EscalationError> {
    let id = request.escalation_id;
    let request_path = dir.request_path(id);
    let response_path = dir.response_path(id);

    write_json_atomic(&request_path, request)?;
    tracing::info!(
        escalation_id = %id,
        tool = %request.tool_name,
        "escalation submitted, awaiting human decision"
    );

    let deadline = Instant::now() + config.timeout;
    loop {
        if let Some(response) = read_json::<EscalationResponse>(&response_path)? {
            // Consume both files so the directory holds only live state.
            let _ = std::fs::remove_file(&response_path);
            let _ = std::fs::remove_file(&request_path);
            return Ok(match response.decision {
                EscalationDecision::Approved => EscalationOutcome::Approved,
                EscalationDecision::Denied => EscalationOutcome::Denied,
            });
        }

        if Instant::now() >= deadline {
            // Removing the request is the expiry signal for the listener.
            let _ = std::fs::remove_file(&request_path);
            tracing::warn!(escalation_id = %id, "escalation timed out");
            return Ok(EscalationOutcome::TimedOut);
        }

        sleep(config.poll_interval).await;
    }
}
