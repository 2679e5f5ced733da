// log.rs — Append-only JSONL audit log.
//
// One JSON object per line. Each entry is linked to the previous one via
// `previous_hash`, forming a hash chain; inserting, deleting, or modifying
// a line breaks chain verification.
//
// Durability: `append` flushes the buffered writer *and* fsyncs the file
// descriptor before returning. The caller (the mediator) only answers the
// agent after `append` succeeds, so every answered call is on disk.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::entry::AuditEntry;
use crate::error::AuditError;
use crate::hasher;

/// An append-only audit log backed by a JSONL file.
pub struct AuditLog {
    writer: BufWriter<File>,
    path: PathBuf,
    /// Hash of the last entry written — becomes `previous_hash` on the next.
    last_hash: Option<String>,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path.
    ///
    /// If the file already exists, the last line is read back to recover
    /// the hash chain state so new entries link correctly.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };

        // Append mode — existing data is never overwritten.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    /// Append an entry to the log.
    ///
    /// Sets `previous_hash` to chain this entry to the last one, writes a
    /// single JSON line, flushes, and fsyncs before returning.
    pub fn append(&mut self, entry: &mut AuditEntry) -> Result<(), AuditError> {
        self.reopen_if_rotated()?;

        entry.previous_hash = self.last_hash.clone();

        let json = serde_json::to_string(entry)?;
        self.last_hash = Some(hasher::hash_str(&json));

        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        // fsync — flush() only hands the bytes to the OS.
        self.writer.get_ref().sync_all()?;

        Ok(())
    }

    /// Read all entries from a log file, oldest first. Blank lines are
    /// skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEntry>, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok(entries)
    }

    /// Verify the integrity of a log file's hash chain.
    ///
    /// Returns `Ok(true)` if every entry's `previous_hash` matches the hash
    /// of the preceding line, or an `IntegrityViolation` if tampered.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<bool, AuditError> {
        let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut previous_hash: Option<String> = None;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let entry: AuditEntry = serde_json::from_str(&line)?;
            if entry.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: entry.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }

            // Hash the raw line, not a re-serialization — field order must
            // not affect the chain.
            previous_hash = Some(hasher::hash_str(&line));
        }

        Ok(true)
    }

    /// Return the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// If an external rotation moved the file away, start a fresh one at
    /// the same path. The new file begins a new chain.
    fn reopen_if_rotated(&mut self) -> Result<(), AuditError> {
        if self.path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| AuditError::OpenFailed {
                path: self.path.clone(),
                source,
            })?;
        self.writer = BufWriter::new(file);
        self.last_hash = None;
        Ok(())
    }

    /// Read the hash of the last entry in an existing log file.
    fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut last_line: Option<String> = None;

        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }

        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CallOutcome, DecisionStatus, PolicyDecisionRecord};
    use serde_json::json;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn entry(tool: &str) -> AuditEntry {
        AuditEntry::new(
            Uuid::new_v4(),
            "filesystem",
            tool,
            json!({}),
            PolicyDecisionRecord {
                status: DecisionStatus::Allow,
                rule: "structural-side-effect-free".to_string(),
                reason: "tool has no side effects".to_string(),
            },
            CallOutcome::success(json!(null)),
            1,
        )
    }

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            log.append(&mut entry("read_file")).unwrap();
            log.append(&mut entry("list_dir")).unwrap();
        }

        let entries = AuditLog::read_all(&log_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tool_name, "read_file");
        assert_eq!(entries[1].tool_name, "list_dir");
    }

    #[test]
    fn hash_chain_is_valid() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            for i in 0..5 {
                log.append(&mut entry(&format!("tool-{}", i))).unwrap();
            }
        }

        assert!(AuditLog::verify_chain(&log_path).unwrap());
    }

    #[test]
    fn first_entry_has_no_previous_hash() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            log.append(&mut entry("read_file")).unwrap();
        }

        let entries = AuditLog::read_all(&log_path).unwrap();
        assert!(entries[0].previous_hash.is_none());
    }

    #[test]
    fn second_entry_links_to_first() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            log.append(&mut entry("a")).unwrap();
            log.append(&mut entry("b")).unwrap();
        }

        let entries = AuditLog::read_all(&log_path).unwrap();
        assert!(entries[1].previous_hash.is_some());
    }

    #[test]
    fn reopen_log_continues_chain() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            log.append(&mut entry("a")).unwrap();
        }
        {
            let mut log = AuditLog::open(&log_path).unwrap();
            log.append(&mut entry("b")).unwrap();
        }

        assert!(AuditLog::verify_chain(&log_path).unwrap());
        assert_eq!(AuditLog::read_all(&log_path).unwrap().len(), 2);
    }

    #[test]
    fn tampered_line_breaks_verification() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        {
            let mut log = AuditLog::open(&log_path).unwrap();
            log.append(&mut entry("a")).unwrap();
            log.append(&mut entry("b")).unwrap();
            log.append(&mut entry("c")).unwrap();
        }

        // Drop the middle line.
        let content = std::fs::read_to_string(&log_path).unwrap();
        let kept: Vec<&str> = content.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        std::fs::write(&log_path, kept.join("\n")).unwrap();

        assert!(matches!(
            AuditLog::verify_chain(&log_path),
            Err(AuditError::IntegrityViolation { .. })
        ));
    }

    #[test]
    fn rotation_is_picked_up_on_next_append() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("audit.jsonl");

        let mut log = AuditLog::open(&log_path).unwrap();
        log.append(&mut entry("a")).unwrap();

        // External rotation: move the file away.
        std::fs::rename(&log_path, dir.path().join("audit.jsonl.1")).unwrap();

        log.append(&mut entry("b")).unwrap();

        let entries = AuditLog::read_all(&log_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool_name, "b");
        assert!(entries[0].previous_hash.is_none());
    }
}
