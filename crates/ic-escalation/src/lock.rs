// lock.rs — Single-instance enforcement for the escalation listener.
//
// Two listeners racing on the same registry would double-answer
// escalations. The lock is an exclusive-create file holding the owner's
// pid: a live pid refuses startup, a stale one is removed and acquisition
// retried once.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::EscalationError;
use crate::registry::pid_alive;

/// Held for the lifetime of the listener; the file is removed on drop.
#[derive(Debug)]
pub struct ListenerLock {
    path: PathBuf,
}

impl ListenerLock {
    /// Acquire the lock or fail with the pid of the live owner.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, EscalationError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| EscalationError::Io {
                path: path.clone(),
                source,
            })?;
        }

        match Self::try_create(&path) {
            Ok(()) => return Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(source) => return Err(EscalationError::Io { path, source }),
        }

        // The file exists. A live owner wins; a stale file is collected.
        let owner = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok());
        if let Some(pid) = owner {
            if pid_alive(pid as u32) {
                return Err(EscalationError::ListenerAlreadyRunning { pid });
            }
        }
        tracing::info!(path = %path.display(), "removing stale listener lock");
        let _ = std::fs::remove_file(&path);

        match Self::try_create(&path) {
            Ok(()) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Lost the race to another starting listener.
                let pid = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.trim().parse::<i32>().ok())
                    .unwrap_or(-1);
                Err(EscalationError::ListenerAlreadyRunning { pid })
            }
            Err(source) => Err(EscalationError::Io { path, source }),
        }
    }

    fn try_create(path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        write!(file, "{}", std::process::id())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ListenerLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_own_pid() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("escalation-listener.lock");

        let lock = ListenerLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, std::process::id().to_string());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn live_owner_refuses_second_listener() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("escalation-listener.lock");

        let _lock = ListenerLock::acquire(&path).unwrap();
        let err = ListenerLock::acquire(&path).unwrap_err();
        assert!(matches!(err, EscalationError::ListenerAlreadyRunning { .. }));
    }

    #[test]
    fn stale_lock_is_collected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("escalation-listener.lock");
        std::fs::write(&path, "4000000").unwrap();

        let lock = ListenerLock::acquire(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(lock.path()).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn garbage_lock_contents_treated_as_stale() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("escalation-listener.lock");
        std::fs::write(&path, "not-a-pid").unwrap();

        assert!(ListenerLock::acquire(&path).is_ok());
    }
}
