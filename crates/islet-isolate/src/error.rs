//! Isolate-related error types.

use islet_core::{ErrorKind, ErrorRecord};
use thiserror::Error;

use crate::tier::Tier;

/// Errors that can occur bringing up or driving an isolate.
#[derive(Debug, Error)]
pub enum IsolateError {
    /// The tier could not be brought up at all. Triggers decay to the
    /// next tier.
    #[error("isolate tier {tier} failed to start: {message}")]
    BringUp {
        /// The tier that failed.
        tier: Tier,
        /// What went wrong.
        message: String,
    },

    /// The isolate broke the broker protocol.
    #[error("broker protocol error: {0}")]
    Protocol(String),

    /// The worker process exited without a terminal message.
    #[error("worker exited unexpectedly (status {status:?})")]
    WorkerExited {
        /// Exit code, when the process was not signalled.
        status: Option<i32>,
    },

    /// The isolate was terminated by cancellation or deadline.
    #[error("isolate terminated")]
    Terminated,

    /// Serialization across the boundary failed.
    #[error("broker serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O on the broker channel failed.
    #[error("broker channel error: {0}")]
    Channel(#[from] std::io::Error),
}

impl IsolateError {
    /// Whether this failure should decay execution to the next tier.
    #[must_use]
    pub fn is_bring_up(&self) -> bool {
        matches!(self, Self::BringUp { .. })
    }

    /// Map onto the cross-crate taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Terminated => ErrorKind::Timeout,
            _ => ErrorKind::Broker,
        }
    }

    /// Render as a wire-level error record.
    #[must_use]
    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord::new(self.kind(), self.to_string())
    }
}

/// Result type for isolate operations.
pub type IsolateResult<T> = Result<T, IsolateError>;
