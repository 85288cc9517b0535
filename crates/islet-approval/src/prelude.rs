//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_approval::prelude::*;` to import all essential types.

// Store and scopes
pub use crate::{ApprovalScope, ApprovalStore, PackageAnalysis};

// Extraction
pub use crate::extract_packages;
