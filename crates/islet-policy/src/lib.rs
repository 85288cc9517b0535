//! Islet Policy - The network policy engine.
//!
//! This crate provides:
//! - [`NetworkPolicy`] - static allow/block configuration with the
//!   `exact` / `*.suffix` / `*` pattern grammar
//! - [`PermissionCache`] - user grants ("once" = 1 hour, "always" =
//!   process lifetime; denials are never cached)
//! - [`ElicitationChannel`] - the seam to an interactive frontend
//! - [`NetworkPolicyEngine`] - decision, consent, and mediated HTTP
//!   execution with size and deadline enforcement
//!
//! Decision order: malformed URLs are blocked; a blocked pattern match
//! overrides everything; localhost and RFC1918 targets honor their
//! static flags and otherwise defer to the user; external targets need
//! an allow-pattern match, and an empty allow list blocks them all.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod elicit;
mod engine;
mod error;
mod permission;
mod policy;

pub use elicit::{ConsentDecision, ConsentRequest, ElicitationChannel};
pub use engine::{NetworkPolicyEngine, NetworkRequest, NetworkResponse, PolicyDecision};
pub use error::{PolicyError, PolicyResult};
pub use permission::{NetworkPermission, PermissionCache};
pub use policy::{classify_host, pattern_matches, HostClass, NetworkPolicy, PolicyOverride};
