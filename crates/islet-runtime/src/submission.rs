//! Submission lifecycle.

use islet_core::CorrelationId;
use islet_isolate::Tier;
use serde::{Deserialize, Serialize};

/// Where a submission is in its lifecycle.
///
/// `Received → Analyzing → (Rejected | Executing) → (Succeeded | Failed
/// | TimedOut | Cancelled)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionState {
    /// Accepted, not yet analyzed.
    Received,
    /// Static analysis in progress.
    Analyzing,
    /// Rejected by analysis or package policy. Terminal.
    Rejected,
    /// Running in an isolate at the given tier.
    Executing {
        /// The tier currently executing.
        tier: Tier,
    },
    /// Completed with a value. Terminal.
    Succeeded,
    /// Completed with an error. Terminal.
    Failed,
    /// Wall-clock deadline elapsed. Terminal.
    TimedOut,
    /// Cancelled from outside. Terminal.
    Cancelled,
}

impl SubmissionState {
    /// Whether this state ends the lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Succeeded | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }
}

/// One untrusted code snippet submitted for execution.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The code.
    pub code: String,
    /// Wall-clock deadline in milliseconds.
    pub timeout_ms: u32,
    /// Correlation id attached to every event this submission produces.
    pub correlation_id: CorrelationId,
    /// Current lifecycle state.
    pub state: SubmissionState,
}

impl Submission {
    /// Create a submission in the `Received` state.
    #[must_use]
    pub fn new(code: impl Into<String>, timeout_ms: u32, correlation_id: CorrelationId) -> Self {
        Self {
            code: code.into(),
            timeout_ms,
            correlation_id,
            state: SubmissionState::Received,
        }
    }
}
