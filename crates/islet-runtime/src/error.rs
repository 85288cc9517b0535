//! Runtime-related error types.

use thiserror::Error;

/// Errors that can occur setting up or driving the orchestrator.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The base directory could not be prepared.
    #[error("base directory unavailable: {0}")]
    BaseDir(std::io::Error),

    /// The audit subsystem failed to start.
    #[error(transparent)]
    Audit(#[from] islet_audit::AuditError),

    /// The workspace could not be prepared.
    #[error(transparent)]
    Workspace(#[from] islet_workspace::WorkspaceError),

    /// A binding operation failed during setup.
    #[error(transparent)]
    Binding(#[from] islet_bindings::BindingError),

    /// The vault failed during setup.
    #[error(transparent)]
    Vault(#[from] islet_vault::VaultError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
