//! Policy-related error types.

use islet_core::ErrorKind;
use thiserror::Error;

/// Errors produced by the network policy engine.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The request was refused by static policy or by the user.
    #[error("network request denied: {reason}")]
    Denied {
        /// Why the request was refused.
        reason: String,
    },

    /// The request body exceeded the configured cap.
    #[error("request body too large: {actual} bytes (max {max})")]
    RequestTooLarge {
        /// Serialized body size.
        actual: usize,
        /// Configured cap.
        max: usize,
    },

    /// The response exceeded the configured cap.
    #[error("response too large: {actual} bytes (max {max})")]
    ResponseTooLarge {
        /// Declared or received size.
        actual: u64,
        /// Configured cap.
        max: u64,
    },

    /// The per-request deadline elapsed.
    #[error("network request timed out after {timeout_ms} ms")]
    Timeout {
        /// The configured deadline.
        timeout_ms: u64,
    },

    /// The request could not be sent or the transfer failed.
    #[error("network transfer failed: {0}")]
    Transfer(String),

    /// The URL could not be parsed.
    #[error("malformed url: {0}")]
    MalformedUrl(String),
}

impl PolicyError {
    /// Map onto the cross-crate taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Denied { .. } | Self::MalformedUrl(_) => ErrorKind::PolicyDenied,
            Self::RequestTooLarge { .. } | Self::ResponseTooLarge { .. } => {
                ErrorKind::ResourceExhaustion
            },
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transfer(_) => ErrorKind::Downstream,
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
