//! Islet Approval - Runtime-scoped package allowlisting.
//!
//! Submitted code may reference packages; whether those references are
//! acceptable is a policy decision separate from whether module loading
//! is syntactically allowed (the static analyzer's call). This crate
//! buckets referenced packages into whitelisted / needs-approval /
//! blocked, and tracks user approvals with operation, session, hour,
//! and day scopes. Operation approvals are cleared after every
//! submission and carry a one-minute expiry as a secondary guard.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod scan;
mod store;

pub use scan::{extract_packages, package_root};
pub use store::{ApprovalScope, ApprovalStore, PackageAnalysis};
