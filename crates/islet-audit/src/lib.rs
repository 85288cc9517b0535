//! Islet Audit - Append-only, rotated JSONL audit logging.
//!
//! This crate provides:
//! - Structured audit events with severity, outcome, and context
//! - A single-writer append path (one JSON line per event)
//! - Daily rotation by file name plus a per-file size cap
//! - Redaction of sensitive keys and URL query strings before write
//!
//! # Example
//!
//! ```
//! use islet_audit::{AuditConfig, AuditEvent, AuditLog, EventContext, EventKind, Outcome, Severity};
//! use islet_core::SessionId;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dir = tempfile::tempdir().unwrap();
//! let log = AuditLog::open(dir.path(), AuditConfig::default()).unwrap();
//!
//! log.log(AuditEvent::new(
//!     EventKind::CodeExecutionStart,
//!     Severity::Info,
//!     Outcome::Success,
//!     EventContext::for_session(SessionId::new()),
//! ));
//! log.flush().await.unwrap();
//! assert_eq!(log.read_last(1).await.unwrap().len(), 1);
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod config;
mod error;
mod event;
mod log;

pub use config::AuditConfig;
pub use error::{AuditError, AuditResult};
pub use event::{url_digest, AuditEvent, EventContext, EventKind, Outcome, Severity};
pub use log::AuditLog;
