//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_runtime::prelude::*;` to import all essential types.

// Errors
pub use crate::{RuntimeError, RuntimeResult};

// Orchestration
pub use crate::{BaseDir, ExecutionEnvelope, Orchestrator, RuntimeConfig};

// Lifecycle
pub use crate::{Submission, SubmissionState};

// Collaborator seams
pub use crate::{ConsentDecision, ConsentRequest, ElicitationChannel, ToolRegistry};

// Notifications
pub use crate::{Notification, NotificationKind, SessionNotifications};
