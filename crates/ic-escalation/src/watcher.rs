// watcher.rs — The listener's side of the escalation protocol.
//
// A watcher polls one session's escalation directory for new
// `request-*.json` files and holds them in memory until a human decides.
// `resolve` writes the response atomically, then re-checks the request
// file: if the requester already gave up (the file is gone), the
// escalation is Expired and must not be shown as a live decision.

use std::collections::HashMap;
use std::fs;

use uuid::Uuid;

use crate::error::EscalationError;
use crate::protocol::{
    read_json, write_json_atomic, EscalationDecision, EscalationDir, EscalationRequest,
    EscalationResponse,
};

/// What happened when the listener resolved an escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    /// The response was written while the request was still live.
    Delivered,
    /// The requester timed out first; the response will never be read.
    Expired,
}

/// Watches one escalation directory and tracks pending requests.
pub struct EscalationWatcher {
    dir: EscalationDir,
    pending: HashMap<Uuid, EscalationRequest>,
}

impl EscalationWatcher {
    pub fn new(dir: EscalationDir) -> Self {
        Self {
            dir,
            pending: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &EscalationDir {
        &self.dir
    }

    /// Scan the directory once. Returns requests that are new since the
    /// last poll, and forgets pending requests whose file disappeared
    /// (resolved elsewhere or expired).
    pub fn poll(&mut self) -> Result<Vec<EscalationRequest>, EscalationError> {
        let mut seen = Vec::new();
        let entries = match fs::read_dir(self.dir.path()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.pending.clear();
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(EscalationError::Io {
                    path: self.dir.path().to_path_buf(),
                    source,
                })
            }
        };

        let mut new_requests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EscalationError::Io {
                path: self.dir.path().to_path_buf(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name
                .strip_prefix("request-")
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|id| Uuid::parse_str(id).ok())
            else {
                continue;
            };
            seen.push(id);
            if self.pending.contains_key(&id) {
                continue;
            }
            // A request may vanish between read_dir and read; that is just
            // an expiry race, not an error.
            if let Some(request) = read_json::<EscalationRequest>(&entry.path())? {
                self.pending.insert(id, request.clone());
                new_requests.push(request);
            }
        }

        self.pending.retain(|id, _| seen.contains(id));
        Ok(new_requests)
    }

    /// Requests currently awaiting a decision, oldest id order not
    /// guaranteed.
    pub fn pending(&self) -> Vec<&EscalationRequest> {
        self.pending.values().collect()
    }

    /// Write the human's decision for a pending escalation.
    pub fn resolve(
        &mut self,
        id: Uuid,
        decision: EscalationDecision,
    ) -> Result<ResolveStatus, EscalationError> {
        if self.pending.remove(&id).is_none() {
            return Err(EscalationError::UnknownEscalation(id.to_string()));
        }

        write_json_atomic(&self.dir.response_path(id), &EscalationResponse { decision })?;

        // Post-write existence check: if the requester removed the request
        // concurrently with our write, it timed out and will never read the
        // response.
        if self.dir.request_path(id).exists() {
            Ok(ResolveStatus::Delivered)
        } else {
            let _ = fs::remove_file(self.dir.response_path(id));
            tracing::warn!(escalation_id = %id, "escalation expired before the decision landed");
            Ok(ResolveStatus::Expired)
        }
    }
}
