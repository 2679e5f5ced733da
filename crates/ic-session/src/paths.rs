// paths.rs — The persisted state layout.
//
//   $IRONCURTAIN_HOME/
//     ca/{ca-cert.pem, ca-key.pem}
//     config.json
//     sessions/<id>/{sandbox, escalations, sockets,
//                    audit.jsonl, session.log, interactions.jsonl}
//     pty-registry/session-<id>.json
//     escalation-listener.lock
//
// Session ids are validated before any path join — an id like "../../x"
// must never reach a join.

use std::path::{Path, PathBuf};

use crate::error::SessionError;

/// Check a session id against `[A-Za-z0-9_-]+`.
pub fn validate_session_id(id: &str) -> Result<(), SessionError> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(SessionError::InvalidSessionId(id.to_string()))
    }
}

/// Shared (non-session) locations under the home directory.
#[derive(Debug, Clone)]
pub struct HomePaths {
    pub home: PathBuf,
}

impl HomePaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn config(&self) -> PathBuf {
        self.home.join("config.json")
    }

    pub fn ca_dir(&self) -> PathBuf {
        self.home.join("ca")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }

    pub fn pty_registry_dir(&self) -> PathBuf {
        self.home.join("pty-registry")
    }

    pub fn listener_lock(&self) -> PathBuf {
        self.home.join("escalation-listener.lock")
    }

    pub fn annotations(&self) -> PathBuf {
        self.home.join("tool-annotations.json")
    }

    pub fn compiled_policy(&self) -> PathBuf {
        self.home.join("compiled-policy.json")
    }

    pub fn server_config(&self) -> PathBuf {
        self.home.join("servers.json")
    }
}

/// One session's directory tree.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub root: PathBuf,
    pub sandbox: PathBuf,
    pub escalations: PathBuf,
    pub sockets: PathBuf,
    pub audit_log: PathBuf,
    pub session_log: PathBuf,
    pub interactions: PathBuf,
}

impl SessionPaths {
    /// Build the layout for one session. Validates the id first.
    pub fn for_session(home: &Path, session_id: &str) -> Result<Self, SessionError> {
        validate_session_id(session_id)?;
        let root = home.join("sessions").join(session_id);
        Ok(Self {
            sandbox: root.join("sandbox"),
            escalations: root.join("escalations"),
            sockets: root.join("sockets"),
            audit_log: root.join("audit.jsonl"),
            session_log: root.join("session.log"),
            interactions: root.join("interactions.jsonl"),
            root,
        })
    }

    /// Create every directory of the tree.
    pub fn create_all(&self) -> Result<(), SessionError> {
        for dir in [&self.root, &self.sandbox, &self.escalations, &self.sockets] {
            std::fs::create_dir_all(dir).map_err(|source| SessionError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn mediator_socket(&self) -> PathBuf {
        self.sockets.join("mediator.sock")
    }

    pub fn egress_socket(&self) -> PathBuf {
        self.sockets.join("egress.sock")
    }

    pub fn container_ca_cert(&self) -> PathBuf {
        self.sockets.join("ca-cert.pem")
    }
}
