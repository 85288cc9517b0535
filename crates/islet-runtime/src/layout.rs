//! Base directory scaffolding.
//!
//! Everything the subsystem persists lives under one base directory:
//!
//! ```text
//! <base>/
//! ├── credentials/
//! │   ├── vault.json        (encrypted blob)
//! │   └── .key              (per-install secret, 0600)
//! ├── audit/
//! │   └── audit-YYYY-MM-DD.jsonl
//! └── workspace/            (sandboxed filesystem root)
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// The base directory for one Islet installation.
#[derive(Debug, Clone)]
pub struct BaseDir {
    root: PathBuf,
}

impl BaseDir {
    /// Wrap a base directory path. Nothing is created yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The base directory itself.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where credentials live.
    #[must_use]
    pub fn credentials_dir(&self) -> PathBuf {
        self.root.join("credentials")
    }

    /// Where audit files live.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// The sandboxed workspace root.
    #[must_use]
    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join("workspace")
    }

    /// Create the directory tree.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error encountered.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.credentials_dir())?;
        std::fs::create_dir_all(self.audit_dir())?;
        std::fs::create_dir_all(self.workspace_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let base = BaseDir::new(dir.path().join("islet"));
        base.ensure().unwrap();

        assert!(base.credentials_dir().is_dir());
        assert!(base.audit_dir().is_dir());
        assert!(base.workspace_dir().is_dir());
    }
}
