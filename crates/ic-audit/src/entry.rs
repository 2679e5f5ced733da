// entry.rs — Audit entry data model.
//
// One AuditEntry per mediated tool call. Arguments are redacted *before*
// they reach this type; nothing here re-checks that, so callers must only
// hand over post-redaction values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The policy decision that applied to a call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Allow,
    Deny,
    Escalate,
}

/// What happened once the decision was enforced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The call was forwarded and the downstream server answered.
    Success,
    /// The call was blocked by policy or a failed escalation.
    Denied,
    /// The call was forwarded but failed downstream (or was cancelled).
    Error,
}

/// The decision record embedded in each entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDecisionRecord {
    pub status: DecisionStatus,
    /// Name of the rule that decided (`structural-*`, a compiled rule name,
    /// `default-deny`, or `path-normalization-failed`).
    pub rule: String,
    pub reason: String,
}

/// The downstream outcome of an allowed call, or the denial record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallOutcome {
    pub status: OutcomeStatus,
    /// Downstream result content, if any (post-redaction).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    /// Error text for `denied`/`error` outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallOutcome {
    pub fn success(content: serde_json::Value) -> Self {
        Self {
            status: OutcomeStatus::Success,
            content: Some(content),
            error: None,
        }
    }

    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Denied,
            content: None,
            error: Some(error.into()),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            content: None,
            error: Some(error.into()),
        }
    }
}

/// A single audit entry — one line in the JSONL audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the entry was recorded (UTC).
    pub timestamp: DateTime<Utc>,

    /// Correlates the entry with the agent's tool call.
    pub request_id: Uuid,

    /// Which downstream server the call was routed to (or would have been).
    pub server_name: String,

    /// The tool name as the agent issued it.
    pub tool_name: String,

    /// Redacted argument map.
    pub arguments: serde_json::Value,

    /// The policy decision that applied.
    pub policy_decision: PolicyDecisionRecord,

    /// Human/auto escalation outcome, when one happened
    /// ("approved", "denied", "timeout", "expired", "auto-approved").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_result: Option<String>,

    /// What the call produced.
    pub result: CallOutcome,

    /// Wall-clock duration of the whole mediation, in milliseconds.
    pub duration_ms: u64,

    /// Hash of the previous entry's JSON line (tamper detection).
    /// The first entry in the log has this set to None.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
}

impl AuditEntry {
    /// Create an entry with the current timestamp. The chain link is filled
    /// in by [`crate::AuditLog::append`].
    pub fn new(
        request_id: Uuid,
        server_name: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        policy_decision: PolicyDecisionRecord,
        result: CallOutcome,
        duration_ms: u64,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            server_name: server_name.into(),
            tool_name: tool_name.into(),
            arguments,
            policy_decision,
            escalation_result: None,
            result,
            duration_ms,
            previous_hash: None,
        }
    }

    /// Set the escalation result and return self (builder pattern).
    pub fn with_escalation_result(mut self, result: impl Into<String>) -> Self {
        self.escalation_result = Some(result.into());
        self
    }
}
