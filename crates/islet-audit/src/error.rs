//! Audit-related error types.

use thiserror::Error;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// File I/O failed.
    #[error("audit i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failed.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The writer task is gone.
    #[error("audit writer closed")]
    WriterClosed,
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
