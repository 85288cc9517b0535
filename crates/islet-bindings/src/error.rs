//! Binding-related error types.

use islet_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur in the binding registry.
#[derive(Debug, Error)]
pub enum BindingError {
    /// No binding is registered under this name.
    #[error("unknown binding: {name}")]
    UnknownBinding {
        /// The name that was looked up.
        name: String,
    },

    /// The binding exists but has no authenticated client.
    #[error("binding {name} is not authenticated")]
    NotAuthenticated {
        /// The binding name.
        name: String,
    },

    /// The method is not in the binding's method set.
    #[error("method {method} is not allowed on binding {name}")]
    MethodNotAllowed {
        /// The binding name.
        name: String,
        /// The refused method.
        method: String,
    },

    /// The authenticated client does not expose the method.
    #[error("client for binding {name} does not expose {method}")]
    MethodNotExposed {
        /// The binding name.
        name: String,
        /// The missing method.
        method: String,
    },

    /// No credential is stored for the binding's MCP.
    #[error("no credential stored for {name}")]
    MissingCredential {
        /// The binding name.
        name: String,
    },

    /// A client returned a value that cannot be represented as JSON.
    /// This is a programming error in the client factory.
    #[error("binding {name} returned a non-serializable value: {reason}")]
    NotSerializable {
        /// The binding name.
        name: String,
        /// Why serialization failed.
        reason: String,
    },

    /// The underlying client call failed.
    #[error("binding {name} call failed: {message}")]
    Downstream {
        /// The binding name (the error's source).
        name: String,
        /// The downstream message.
        message: String,
    },

    /// The credential vault failed.
    #[error(transparent)]
    Vault(#[from] islet_vault::VaultError),
}

impl BindingError {
    /// Map onto the cross-crate taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownBinding { .. }
            | Self::NotAuthenticated { .. }
            | Self::MethodNotAllowed { .. }
            | Self::MethodNotExposed { .. }
            | Self::MissingCredential { .. } => ErrorKind::PolicyDenied,
            Self::NotSerializable { .. } | Self::Downstream { .. } | Self::Vault(_) => {
                ErrorKind::Downstream
            },
        }
    }
}

/// Result type for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;
