//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Events
pub use crate::{AuditEvent, EventContext, EventKind, Outcome, Severity};

// Log and configuration
pub use crate::{AuditConfig, AuditLog};
