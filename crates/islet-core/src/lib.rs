//! Islet Core - Foundation types for the Islet sandboxed execution subsystem.
//!
//! This crate provides:
//! - Shared identifiers and timestamps
//! - The cross-crate error taxonomy ([`ErrorKind`], [`ErrorRecord`])
//! - Risk classification ([`RiskLevel`])
//! - Tool descriptors and execution results
//! - Redaction and truncation utilities for anything that reaches a log

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod redact;
mod types;
mod utils;

pub use error::{ErrorKind, ErrorRecord};
pub use redact::{is_sensitive_key, redact_url, redact_value};
pub use types::{
    CorrelationId, ExecutionResult, LogLine, QualifiedToolName, RiskLevel, SessionId, Timestamp,
    ToolDescriptor,
};
pub use utils::truncate_to_boundary;
