//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_workspace::prelude::*;` to import all essential types.

// Errors
pub use crate::{WorkspaceError, WorkspaceResult};

// Filesystem surface
pub use crate::{EntryInfo, SandboxFs};

// Resolution and process confinement
pub use crate::{resolve, SandboxCommand};
