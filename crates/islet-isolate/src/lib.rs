//! Islet Isolate - Tiered execution of untrusted code.
//!
//! This crate provides:
//! - The script engine: OXC lowering plus a tree-walking async
//!   interpreter with instruction, value, and call-depth budgets
//! - The broker protocol: correlation-id matched messages between the
//!   isolate and the trusted host, with a 30-second per-call deadline
//! - Four tiers, strongest first: kernel-sandboxed worker subprocess,
//!   plain worker subprocess, dedicated thread, in-process — with
//!   audited decay on bring-up failure
//! - The `islet-worker` binary (the subprocess half)
//!
//! The engine has no ambient authority. Tools, bindings, the network,
//! and the filesystem exist only as [`HostServices`] supplied by the
//! trusted side; everything that crosses the boundary is a JSON copy.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod broker;
mod error;
mod executor;
mod inprocess;
mod protocol;
mod script;
mod tier;
mod worker;

pub use broker::{dispatch_request, DeadlineServices, HostServices, CALL_DEADLINE};
pub use error::{IsolateError, IsolateResult};
pub use executor::{IsolateConfig, IsolateExecutor};
pub use inprocess::IsolateOutcome;
pub use protocol::{
    BindingSurface, EngineLimits, FsOperation, HostMessage, IsolateMessage, JobSpec,
};
pub use script::{lower, sanitize_identifier, Engine, LowerError};
pub use tier::Tier;
