//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{ErrorKind, ErrorRecord};

// Identifiers and time
pub use crate::{CorrelationId, SessionId, Timestamp};

// Classification
pub use crate::RiskLevel;

// Tools and results
pub use crate::{ExecutionResult, QualifiedToolName, ToolDescriptor};

// Utilities
pub use crate::{redact_url, redact_value, truncate_to_boundary};
