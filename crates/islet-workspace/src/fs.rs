//! The sandboxed filesystem surface exposed to untrusted code.
//!
//! Every operation routes its path through [`resolve`](crate::resolve)
//! first; there is no way to touch a file by a path that has not passed
//! the containment check. Writes create missing parent directories inside
//! the workspace.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::resolve::resolve;

/// Metadata for a single directory entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    /// Name of the entry (final path component).
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

/// A filesystem rooted at a workspace directory.
#[derive(Debug, Clone)]
pub struct SandboxFs {
    root: PathBuf,
}

impl SandboxFs {
    /// Create a sandboxed filesystem, creating the root if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::RootUnavailable`] if the root cannot be
    /// created or canonicalized.
    pub fn new(root: impl Into<PathBuf>) -> WorkspaceResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(WorkspaceError::RootUnavailable)?;
        let root = root
            .canonicalize()
            .map_err(WorkspaceError::RootUnavailable)?;
        Ok(Self { root })
    }

    /// The canonical workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a user-presented path against this workspace.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Escape`] when the path leaves the root.
    pub fn resolve(&self, user_path: &str) -> WorkspaceResult<PathBuf> {
        resolve(user_path, &self.root)
    }

    /// Read a file's bytes.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn read(&self, user_path: &str) -> WorkspaceResult<Vec<u8>> {
        let path = self.resolve(user_path)?;
        fs::read(&path).await.map_err(|source| io_err(path, source))
    }

    /// Read a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn read_to_string(&self, user_path: &str) -> WorkspaceResult<String> {
        let path = self.resolve(user_path)?;
        fs::read_to_string(&path)
            .await
            .map_err(|source| io_err(path, source))
    }

    /// Write bytes, creating missing parent directories inside the root.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn write(&self, user_path: &str, contents: &[u8]) -> WorkspaceResult<()> {
        let path = self.resolve(user_path)?;
        self.ensure_parent(&path).await?;
        fs::write(&path, contents)
            .await
            .map_err(|source| io_err(path, source))
    }

    /// Append bytes, creating the file and parents as needed.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn append(&self, user_path: &str, contents: &[u8]) -> WorkspaceResult<()> {
        use tokio::io::AsyncWriteExt;
        let path = self.resolve(user_path)?;
        self.ensure_parent(&path).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| io_err(path.clone(), source))?;
        file.write_all(contents)
            .await
            .map_err(|source| io_err(path, source))
    }

    /// Open a file for streaming reads.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn open_read(&self, user_path: &str) -> WorkspaceResult<fs::File> {
        let path = self.resolve(user_path)?;
        fs::File::open(&path)
            .await
            .map_err(|source| io_err(path, source))
    }

    /// List a directory.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn list(&self, user_path: &str) -> WorkspaceResult<Vec<EntryInfo>> {
        let path = self.resolve(user_path)?;
        let mut dir = fs::read_dir(&path)
            .await
            .map_err(|source| io_err(path.clone(), source))?;
        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|source| io_err(path.clone(), source))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|source| io_err(entry.path(), source))?;
            entries.push(EntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Delete a file or an empty directory.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn remove(&self, user_path: &str) -> WorkspaceResult<()> {
        let path = self.resolve(user_path)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|source| io_err(path.clone(), source))?;
        if meta.is_dir() {
            fs::remove_dir(&path)
                .await
                .map_err(|source| io_err(path, source))
        } else {
            fs::remove_file(&path)
                .await
                .map_err(|source| io_err(path, source))
        }
    }

    /// Rename within the workspace. Both endpoints are confined.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn rename(&self, from: &str, to: &str) -> WorkspaceResult<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        self.ensure_parent(&to_path).await?;
        fs::rename(&from_path, &to_path)
            .await
            .map_err(|source| io_err(from_path, source))
    }

    /// Copy within the workspace. Both endpoints are confined.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn copy(&self, from: &str, to: &str) -> WorkspaceResult<u64> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        self.ensure_parent(&to_path).await?;
        fs::copy(&from_path, &to_path)
            .await
            .map_err(|source| io_err(from_path, source))
    }

    /// Whether a path exists.
    ///
    /// # Errors
    ///
    /// Fails on escape.
    pub async fn exists(&self, user_path: &str) -> WorkspaceResult<bool> {
        let path = self.resolve(user_path)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Stat a path.
    ///
    /// # Errors
    ///
    /// Fails on escape or I/O error.
    pub async fn stat(&self, user_path: &str) -> WorkspaceResult<EntryInfo> {
        let path = self.resolve(user_path)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|source| io_err(path.clone(), source))?;
        Ok(EntryInfo {
            name: path
                .file_name()
                .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    /// Create parent directories of `path`. `path` has already passed the
    /// containment check, so its parents are inside the root by
    /// construction.
    async fn ensure_parent(&self, path: &Path) -> WorkspaceResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| io_err(parent.to_path_buf(), source))?;
        }
        Ok(())
    }
}

fn io_err(path: PathBuf, source: std::io::Error) -> WorkspaceError {
    WorkspaceError::Io { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxFs::new(dir.path()).unwrap();

        sandbox.write("out/data.txt", b"hello").await.unwrap();
        let back = sandbox.read_to_string("out/data.txt").await.unwrap();
        assert_eq!(back, "hello");
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxFs::new(dir.path()).unwrap();
        sandbox.write("a/b/c/deep.txt", b"x").await.unwrap();
        assert!(sandbox.exists("a/b/c/deep.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_escape_blocked_on_every_op() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxFs::new(dir.path()).unwrap();

        assert!(matches!(
            sandbox.write("../escape.txt", b"x").await,
            Err(WorkspaceError::Escape { .. })
        ));
        assert!(matches!(
            sandbox.read("../../etc/passwd").await,
            Err(WorkspaceError::Escape { .. })
        ));
        assert!(matches!(
            sandbox.rename("ok.txt", "../out.txt").await,
            Err(WorkspaceError::Escape { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_and_stat() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxFs::new(dir.path()).unwrap();
        sandbox.write("b.txt", b"bb").await.unwrap();
        sandbox.write("a.txt", b"a").await.unwrap();

        let entries = sandbox.list("").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[1].size, 2);

        let stat = sandbox.stat("b.txt").await.unwrap();
        assert!(!stat.is_dir);
        assert_eq!(stat.size, 2);
    }

    #[tokio::test]
    async fn test_rename_and_copy_confined() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxFs::new(dir.path()).unwrap();
        sandbox.write("src.txt", b"data").await.unwrap();

        sandbox.copy("src.txt", "copies/dup.txt").await.unwrap();
        sandbox.rename("src.txt", "moved/dst.txt").await.unwrap();

        assert!(!sandbox.exists("src.txt").await.unwrap());
        assert!(sandbox.exists("moved/dst.txt").await.unwrap());
        assert_eq!(
            sandbox.read_to_string("copies/dup.txt").await.unwrap(),
            "data"
        );
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SandboxFs::new(dir.path()).unwrap();
        sandbox.write("gone.txt", b"x").await.unwrap();
        sandbox.remove("gone.txt").await.unwrap();
        assert!(!sandbox.exists("gone.txt").await.unwrap());
    }
}
