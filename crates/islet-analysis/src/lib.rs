//! Islet Analysis - Static analysis of submitted code.
//!
//! Submissions are JavaScript snippets analyzed as the body of an async
//! function. The pipeline is the usual OXC one: parse, semantic build,
//! then an AST rule walk that flags the constructs the sandbox forbids
//! (prototype mutation, reflective constructors, process globals, module
//! loading, dynamic code, raw I/O). A regex [`precheck`] approximates the
//! same rules for the worker boundary but is advisory only.
//!
//! # Example
//!
//! ```
//! use islet_analysis::analyze;
//!
//! let result = analyze("const x = process.env.HOME;", &[]);
//! assert!(result.must_reject());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod analyzer;
mod precheck;
mod result;
mod walker;

pub use analyzer::analyze;
pub use precheck::precheck;
pub use result::{
    rules, AnalysisResult, DetectedPatterns, Intent, Location, Violation, ViolationSeverity,
};
