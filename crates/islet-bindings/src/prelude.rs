//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_bindings::prelude::*;` to import all essential types.

// Errors
pub use crate::{BindingError, BindingResult};

// Bindings and clients
pub use crate::{AuthFactory, Binding, BindingClient, BindingKind};

// Registry
pub use crate::{BindingDescriptor, BindingRegistry};
