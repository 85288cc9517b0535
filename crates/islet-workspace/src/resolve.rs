//! Path resolution against a workspace root.
//!
//! Every path presented by untrusted code is mapped to a canonical form
//! and checked for containment before any filesystem operation runs.
//! Symlinks are resolved before the containment check, so a link inside
//! the workspace cannot point traffic outside it.

use std::path::{Component, Path, PathBuf};

use crate::error::{WorkspaceError, WorkspaceResult};

/// Resolve `user_path` against the workspace root `root`.
///
/// Rules:
/// - whitespace is trimmed; an empty path resolves to the root itself
/// - absolute paths are taken as given, relative paths join the root
/// - `.` and `..` are collapsed lexically, then symlinks in the longest
///   existing prefix are resolved
/// - the result must be the root or a descendant of it
///
/// # Errors
///
/// Returns [`WorkspaceError::Escape`] when the canonical form leaves the
/// root, and [`WorkspaceError::RootUnavailable`] when the root itself
/// cannot be canonicalized.
pub fn resolve(user_path: &str, root: &Path) -> WorkspaceResult<PathBuf> {
    let canonical_root = root
        .canonicalize()
        .map_err(WorkspaceError::RootUnavailable)?;

    let trimmed = user_path.trim();
    if trimmed.is_empty() {
        return Ok(canonical_root);
    }

    let presented = Path::new(trimmed);
    let joined = if presented.is_absolute() {
        presented.to_path_buf()
    } else {
        canonical_root.join(presented)
    };

    let normalized = normalize(&joined);
    let resolved = resolve_existing_prefix(&normalized);

    match resolved.strip_prefix(&canonical_root) {
        Ok(rel) if !rel.components().any(|c| matches!(c, Component::ParentDir)) => Ok(resolved),
        _ => Err(WorkspaceError::Escape {
            attempted: user_path.to_string(),
            root: canonical_root,
        }),
    }
}

/// Collapse `.` and `..` components lexically.
///
/// `..` at the filesystem root stays at the root, matching kernel
/// semantics.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::RootDir);
                }
            },
            other => out.push(other),
        }
    }
    out
}

/// Resolve symlinks in the longest existing prefix of `path`, then append
/// the non-existent remainder unchanged.
///
/// This lets writes target paths that do not exist yet while still
/// following any symlink that does.
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut prefix = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match prefix.canonicalize() {
            Ok(canonical) => {
                let mut out = canonical;
                for part in remainder.iter().rev() {
                    out.push(part);
                }
                return out;
            },
            Err(_) => match (prefix.file_name(), prefix.parent()) {
                (Some(name), Some(parent)) => {
                    remainder.push(name.to_os_string());
                    prefix = parent.to_path_buf();
                },
                _ => return path.to_path_buf(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_path_resolves_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve("", dir.path()).unwrap();
        assert_eq!(resolved, dir.path().canonicalize().unwrap());
        // Whitespace-only behaves the same
        assert_eq!(resolve("  ", dir.path()).unwrap(), resolved);
    }

    #[test]
    fn test_relative_path_joins_root() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve("data/out.json", dir.path()).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(resolved.ends_with("data/out.json"));
    }

    #[test]
    fn test_parent_escape_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve("../x", dir.path()).unwrap_err();
        assert!(matches!(err, WorkspaceError::Escape { .. }));
    }

    #[test]
    fn test_deep_parent_escape_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve("../../etc/passwd", dir.path()).unwrap_err();
        assert!(matches!(err, WorkspaceError::Escape { .. }));
    }

    #[test]
    fn test_absolute_outside_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve("/etc/passwd", dir.path()).unwrap_err();
        assert!(matches!(err, WorkspaceError::Escape { .. }));
    }

    #[test]
    fn test_absolute_inside_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let inside = dir.path().join("file.txt");
        let resolved = resolve(inside.to_str().unwrap(), dir.path()).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn test_dot_segments_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve("a/./b/../c.txt", dir.path()).unwrap();
        assert!(resolved.ends_with("a/c.txt"));
    }

    #[test]
    fn test_sneaky_roundtrip_escape_fails() {
        let dir = tempfile::tempdir().unwrap();
        // Dips below the root before coming back up past it
        let err = resolve("sub/../../outside", dir.path()).unwrap_err();
        assert!(matches!(err, WorkspaceError::Escape { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_workspace_fails() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();

        let err = resolve("link/secret.txt", dir.path()).unwrap_err();
        assert!(matches!(err, WorkspaceError::Escape { .. }));
    }
}
