//! Islet Bindings - Named, credentialed clients exposed by method list.
//!
//! A binding is the only way untrusted code reaches a credentialed
//! client. The binding itself carries no secrets: the registry holds an
//! opaque client handle produced by an authentication factory that
//! borrows the credential from the vault. Messages crossing the trust
//! boundary carry binding names and JSON arguments, nothing else.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod binding;
mod error;
mod registry;

pub use binding::{AuthFactory, Binding, BindingClient, BindingKind};
pub use error::{BindingError, BindingResult};
pub use registry::{BindingDescriptor, BindingRegistry};
