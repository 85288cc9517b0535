//! Islet Runtime - The submission orchestrator.
//!
//! Composes the subsystem: static analysis gates a submission, the
//! isolate executor runs it behind the broker, policy engines mediate
//! every effect, and the audit log records every decision. External
//! collaborators (the MCP tool registry and the elicitation frontend)
//! are consumed through traits.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use islet_runtime::{BaseDir, EmptyToolRegistry, Orchestrator, RuntimeConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dir = tempfile::tempdir().unwrap();
//! let base = BaseDir::new(dir.path());
//! let mut config = RuntimeConfig::default();
//! config.isolate.start_tier = islet_isolate::Tier::InProcess;
//!
//! let orchestrator =
//!     Orchestrator::new(&base, config, Arc::new(EmptyToolRegistry), None).unwrap();
//! let envelope = orchestrator.execute("return 2 + 2;", 5_000, None).await;
//! assert_eq!(envelope.result.value, Some(serde_json::json!(4.0)));
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
mod layout;
mod notify;
mod orchestrator;
mod services;
mod submission;
mod traits;

pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use layout::BaseDir;
pub use notify::{Notification, NotificationKind, SessionNotifications};
pub use orchestrator::{ExecutionEnvelope, Orchestrator};
pub use submission::{Submission, SubmissionState};
pub use traits::{EmptyToolRegistry, ToolRegistry};

// The elicitation seam lives with the policy engine; re-exported here
// because frontends implement it against the runtime.
pub use islet_policy::{ConsentDecision, ConsentRequest, ElicitationChannel};
