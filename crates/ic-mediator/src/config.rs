// config.rs — Mediator configuration.
//
// Assembled once by the session layer's boot path; immutable for the
// mediator's lifetime. Environment reads never happen here.

use std::path::PathBuf;
use std::time::Duration;

/// Everything the mediator needs to run one session.
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// The owning session.
    pub session_id: String,

    /// The per-session writable directory every agent-initiated I/O is
    /// expected to stay within by default.
    pub sandbox_dir: PathBuf,

    /// Where the append-only audit log lives.
    pub audit_log_path: PathBuf,

    /// Where escalation request/response files are exchanged.
    pub escalation_dir: PathBuf,

    /// Locations no rule may open up, read or write.
    pub protected_paths: Vec<PathBuf>,

    /// How long a human has to answer an escalation.
    pub escalation_timeout: Duration,

    /// Escalation response poll interval.
    pub escalation_poll_interval: Duration,

    /// Budget for one downstream call once allowed.
    pub downstream_call_timeout: Duration,

    /// Whether an approved escalation for a path argument also registers
    /// the containing directory as a downstream root.
    pub expand_roots_on_approval: bool,

    /// SANDBOX_POLICY=warn: a `default-deny` outcome is allowed with a
    /// loud warning instead of blocking. Explicit deny rules and
    /// structural denies are never downgraded.
    pub sandbox_warn_only: bool,
}

impl MediatorConfig {
    /// Sensible defaults for a session rooted at `session_dir`.
    pub fn for_session(session_id: impl Into<String>, session_dir: impl Into<PathBuf>) -> Self {
        let session_dir = session_dir.into();
        Self {
            session_id: session_id.into(),
            sandbox_dir: session_dir.join("sandbox"),
            audit_log_path: session_dir.join("audit.jsonl"),
            escalation_dir: session_dir.join("escalations"),
            protected_paths: Vec::new(),
            escalation_timeout: Duration::from_secs(120),
            escalation_poll_interval: Duration::from_millis(250),
            downstream_call_timeout: Duration::from_secs(60),
            expand_roots_on_approval: false,
            sandbox_warn_only: false,
        }
    }
}
