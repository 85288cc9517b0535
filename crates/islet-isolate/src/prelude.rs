//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_isolate::prelude::*;` to import all essential types.

// Errors
pub use crate::{IsolateError, IsolateResult};

// Services and protocol
pub use crate::{
    BindingSurface, EngineLimits, FsOperation, HostMessage, HostServices, IsolateMessage, JobSpec,
};

// Execution
pub use crate::{IsolateConfig, IsolateExecutor, IsolateOutcome, Tier};
