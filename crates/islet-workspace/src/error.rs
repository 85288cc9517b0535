//! Workspace-related error types.

use std::path::PathBuf;

use islet_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur resolving or touching workspace paths.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A path resolved outside the workspace root.
    #[error("sandbox escape: {attempted} is outside workspace {root}")]
    Escape {
        /// The path as presented by untrusted code.
        attempted: String,
        /// The workspace root it had to stay under.
        root: PathBuf,
    },

    /// Filesystem I/O failed.
    #[error("workspace i/o error on {path}: {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The workspace root could not be prepared.
    #[error("workspace root unavailable: {0}")]
    RootUnavailable(std::io::Error),
}

impl WorkspaceError {
    /// Map onto the cross-crate taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Escape { .. } => ErrorKind::SandboxEscape,
            Self::Io { .. } | Self::RootUnavailable(_) => ErrorKind::Downstream,
        }
    }
}

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;
