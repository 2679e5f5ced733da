// registry.rs — Shared session registry.
//
// Interactive and PTY sessions announce themselves by writing
// `session-<id>.json` into a shared directory. Listeners poll the
// directory; a registration is alive while its pid answers a zero-signal
// probe. Each writer owns a distinct filename, so no coordination beyond
// the filesystem is needed.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EscalationError;
use crate::protocol::{read_json, write_json_atomic};

/// One session's registry entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRegistration {
    pub session_id: String,
    /// Where this session's escalation files live.
    pub escalation_dir: PathBuf,
    /// Human-readable label shown in the listener dashboard.
    pub label: String,
    pub started_at: DateTime<Utc>,
    /// Pid of the owning process. A registration without a live pid is
    /// stale and gets collected.
    pub pid: u32,
}

impl SessionRegistration {
    pub fn for_current_process(
        session_id: impl Into<String>,
        escalation_dir: impl Into<PathBuf>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            escalation_dir: escalation_dir.into(),
            label: label.into(),
            started_at: Utc::now(),
            pid: std::process::id(),
        }
    }
}

/// The shared registry directory.
pub struct SessionRegistry {
    dir: PathBuf,
}

impl SessionRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("session-{session_id}.json"))
    }

    /// Announce a session. Overwrites any previous registration with the
    /// same id.
    pub fn register(&self, registration: &SessionRegistration) -> Result<(), EscalationError> {
        write_json_atomic(&self.file_for(&registration.session_id), registration)
    }

    /// Remove a session's registration. Missing files are fine.
    pub fn deregister(&self, session_id: &str) -> Result<(), EscalationError> {
        match fs::remove_file(self.file_for(session_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EscalationError::Io {
                path: self.file_for(session_id),
                source,
            }),
        }
    }

    /// All live registrations. Stale entries (dead pid) are removed from
    /// disk as a side effect.
    pub fn list_live(&self) -> Result<Vec<SessionRegistration>, EscalationError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EscalationError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut live = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EscalationError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with("session-") || !name.ends_with(".json") {
                continue;
            }
            let Some(registration) = read_json::<SessionRegistration>(&entry.path())? else {
                continue;
            };
            if pid_alive(registration.pid) {
                live.push(registration);
            } else {
                tracing::debug!(
                    session_id = %registration.session_id,
                    pid = registration.pid,
                    "collecting stale session registration"
                );
                let _ = fs::remove_file(entry.path());
            }
        }

        live.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(live)
    }
}

/// Zero-signal liveness probe.
pub(crate) fn pid_alive(pid: u32) -> bool {
    // kill(pid, 0) checks deliverability without sending anything. EPERM
    // still means the process exists.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
