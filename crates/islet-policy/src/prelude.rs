//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_policy::prelude::*;` to import all essential types.

// Errors
pub use crate::{PolicyError, PolicyResult};

// Policy and classification
pub use crate::{HostClass, NetworkPolicy, PolicyOverride};

// Permissions and consent
pub use crate::{ConsentDecision, ConsentRequest, ElicitationChannel, PermissionCache};

// Engine
pub use crate::{NetworkPolicyEngine, NetworkRequest, NetworkResponse, PolicyDecision};
