// protocol.rs — The on-disk escalation protocol.
//
// Three filename schemes live in a session's escalation directory:
//
//   request-<id>.json    written by the mediator (requester)
//   response-<id>.json   written by the listener (approver)
//   user-context.json    most recent human input, read by the auto-approver
//
// Every write goes through `write_json_atomic`: serialize to a temp file in
// the same directory, then rename over the final name. Rename is atomic on
// POSIX filesystems, so no reader ever observes a partial file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EscalationError;

/// The human's (or listener's) verdict on one escalation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscalationDecision {
    Approved,
    Denied,
}

/// The request file contents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRequest {
    pub escalation_id: Uuid,
    pub tool_name: String,
    pub server_name: String,
    /// Redacted argument map — plaintext never reaches the listener.
    pub arguments: serde_json::Value,
    /// Why the policy engine escalated.
    pub reason: String,
    /// Optional extra context for the human (e.g. the agent's task).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// The response file contents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EscalationResponse {
    pub decision: EscalationDecision,
}

/// The most recent human input, consumed by the auto-approver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub message: String,
    pub updated_at: DateTime<Utc>,
}

/// Serialize `value` to `path` atomically (temp file + rename).
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), EscalationError> {
    let io_err = |source| EscalationError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_err)?;

    // The temp file must live in the same directory — rename is only
    // atomic within one filesystem.
    let tmp = parent.join(format!(
        ".{}.tmp-{}",
        path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
        Uuid::new_v4()
    ));
    let json = serde_json::to_string_pretty(value).map_err(|source| EscalationError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(&tmp, json).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

/// Read and parse a JSON file, distinguishing "absent" from "malformed".
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, EscalationError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(EscalationError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let value = serde_json::from_str(&raw).map_err(|source| EscalationError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

/// Path layout for one session's escalation directory.
#[derive(Debug, Clone)]
pub struct EscalationDir {
    dir: PathBuf,
}

impl EscalationDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn request_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("request-{id}.json"))
    }

    pub fn response_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("response-{id}.json"))
    }

    pub fn user_context_path(&self) -> PathBuf {
        self.dir.join("user-context.json")
    }

    /// Record the most recent human input for the auto-approver.
    pub fn write_user_context(&self, message: &str) -> Result<(), EscalationError> {
        write_json_atomic(
            &self.user_context_path(),
            &UserContext {
                message: message.to_string(),
                updated_at: Utc::now(),
            },
        )
    }

    /// The most recent human input, if any has been recorded.
    pub fn read_user_context(&self) -> Result<Option<UserContext>, EscalationError> {
        read_json(&self.user_context_path())
    }
}
