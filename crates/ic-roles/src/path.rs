// path.rs — Tilde expansion, symlink-resolving normalization, containment.
//
// Normalization contract:
//
// 1. A leading `~` or `~/` expands to the effective home directory.
// 2. Relative paths are absolutized against the current directory.
// 3. Symlinks are followed on every ancestor that exists on disk.
// 4. Non-existent trailing components are retained verbatim.
// 5. `.` is dropped and `..` is collapsed (against the real parent where
//    the prefix exists, lexically in the non-existent tail).
// 6. Trailing slashes are stripped except for the root itself.
//
// Protected-path and sandbox checks all run on normalized paths, so there
// is no substring matching anywhere in the policy layer.

use std::path::{Component, Path, PathBuf};

use crate::error::RoleError;

/// Expand a leading `~` or `~/` to the effective home directory.
///
/// Any other use of `~` (e.g. `~alice/`) is passed through untouched.
pub fn expand_tilde(raw: &str) -> Result<PathBuf, RoleError> {
    if raw == "~" {
        return dirs::home_dir().ok_or(RoleError::NoHomeDirectory);
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or(RoleError::NoHomeDirectory)?;
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(raw))
}

/// Normalize a raw path string to an absolute, symlink-resolved path.
///
/// Idempotent: normalizing an already-normalized path returns it unchanged.
pub fn normalize_path(raw: &str) -> Result<PathBuf, RoleError> {
    let expanded = expand_tilde(raw)?;
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        let cwd = std::env::current_dir().map_err(|source| RoleError::NoWorkingDirectory {
            path: raw.to_string(),
            source,
        })?;
        cwd.join(expanded)
    };

    // Walk component by component. While the prefix built so far exists on
    // disk we canonicalize it, which follows symlinks at that level; once a
    // component is missing the remainder is appended lexically.
    let mut resolved = PathBuf::new();
    let mut prefix_exists = true;
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                // When the prefix exists it is already symlink-free, so
                // popping yields the real parent. `pop()` on the root is a
                // no-op, which collapses `/..` to `/`.
                resolved.pop();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if prefix_exists {
                    if resolved.exists() {
                        resolved = resolved.canonicalize().map_err(|source| {
                            RoleError::ResolveFailed {
                                path: raw.to_string(),
                                source,
                            }
                        })?;
                    } else {
                        prefix_exists = false;
                    }
                }
            }
        }
    }

    Ok(resolved)
}

/// True iff `child` equals `within` or lies below it, separator-aligned.
///
/// `/a/b` is contained in `/a`; `/ab` is not. Both arguments are expected
/// to be normalized already.
pub fn is_contained(child: &Path, within: &Path) -> bool {
    child.starts_with(within)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~").unwrap(), home);
        assert_eq!(expand_tilde("~/notes.txt").unwrap(), home.join("notes.txt"));
    }

    #[test]
    fn tilde_user_form_passes_through() {
        assert_eq!(
            expand_tilde("~alice/notes.txt").unwrap(),
            PathBuf::from("~alice/notes.txt")
        );
    }

    #[test]
    fn absolute_path_untouched_by_expansion() {
        assert_eq!(expand_tilde("/etc/hosts").unwrap(), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn nonexistent_tail_retained_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("missing/deeper/file.txt");
        let normalized = normalize_path(raw.to_str().unwrap()).unwrap();
        let base = dir.path().canonicalize().unwrap();
        assert_eq!(normalized, base.join("missing/deeper/file.txt"));
    }

    #[test]
    fn parent_traversal_collapses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let raw = format!("{}/sub/../sub/./file.txt", dir.path().display());
        let normalized = normalize_path(&raw).unwrap();
        let base = dir.path().canonicalize().unwrap();
        assert_eq!(normalized, base.join("sub/file.txt"));
    }

    #[test]
    fn parent_traversal_in_missing_tail_collapses_lexically() {
        let dir = tempfile::tempdir().unwrap();
        let raw = format!("{}/missing/../other.txt", dir.path().display());
        let normalized = normalize_path(&raw).unwrap();
        let base = dir.path().canonicalize().unwrap();
        assert_eq!(normalized, base.join("other.txt"));
    }

    #[test]
    fn root_parent_stays_at_root() {
        assert_eq!(normalize_path("/..").unwrap(), PathBuf::from("/"));
        assert_eq!(normalize_path("/").unwrap(), PathBuf::from("/"));
    }

    #[test]
    fn trailing_slash_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let raw = format!("{}/", dir.path().display());
        let normalized = normalize_path(&raw).unwrap();
        assert_eq!(normalized, dir.path().canonicalize().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_ancestor_is_followed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real");
        std::fs::create_dir(&target).unwrap();
        let link = dir.path().join("alias");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let raw = format!("{}/file.txt", link.display());
        let normalized = normalize_path(&raw).unwrap();
        assert_eq!(
            normalized,
            target.canonicalize().unwrap().join("file.txt")
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let raw = format!("{}/sub/../sub/missing.txt", dir.path().display());
        let once = normalize_path(&raw).unwrap();
        let twice = normalize_path(once.to_str().unwrap()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn containment_is_separator_aligned() {
        assert!(is_contained(Path::new("/a/b"), Path::new("/a")));
        assert!(is_contained(Path::new("/a"), Path::new("/a")));
        assert!(!is_contained(Path::new("/ab"), Path::new("/a")));
        assert!(!is_contained(Path::new("/a"), Path::new("/a/b")));
    }
}
