//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_analysis::prelude::*;` to import all essential types.

// Entry points
pub use crate::{analyze, precheck};

// Results
pub use crate::{AnalysisResult, DetectedPatterns, Intent, Location, Violation, ViolationSeverity};
