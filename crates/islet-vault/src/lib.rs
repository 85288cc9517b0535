//! Islet Vault - Encrypted at-rest credential storage.
//!
//! This crate provides:
//! - [`Credential`] / [`Secret`] - zeroizing credential types
//! - [`CredentialVault`] - the process-wide store, AES-256-GCM encrypted
//!   on disk, memory-only on initialization failure (never plaintext)
//!
//! # Security Model
//!
//! Credentials exist only in the trusted domain. The vault hands them to
//! the binding registry; nothing credential-shaped ever crosses into an
//! isolate. Key material comes from the environment when provided, or
//! from a per-install random secret stored with owner-only file mode.
//!
//! # Example
//!
//! ```
//! use islet_vault::{Credential, CredentialKind, CredentialVault};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dir = tempfile::tempdir().unwrap();
//! let vault = CredentialVault::with_secret(dir.path(), "example-secret");
//!
//! vault
//!     .store(Credential::new("github", CredentialKind::OauthToken, "gho_abc"))
//!     .await
//!     .unwrap();
//! assert_eq!(vault.list().await.len(), 1);
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod blob;
mod credential;
mod error;
mod vault;

pub use blob::{open, seal, VaultBlob, BLOB_VERSION};
pub use credential::{Credential, CredentialInfo, CredentialKind, Secret};
pub use error::{VaultError, VaultResult};
pub use vault::{CredentialVault, KEY_ENV_VAR};
