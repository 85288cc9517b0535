//! Prelude module - commonly used types for convenient import.
//!
//! Use `use islet_vault::prelude::*;` to import all essential types.

// Errors
pub use crate::{VaultError, VaultResult};

// Credentials
pub use crate::{Credential, CredentialInfo, CredentialKind, Secret};

// The vault
pub use crate::CredentialVault;
