//! Islet Workspace - Path confinement and the sandboxed filesystem surface.
//!
//! This crate provides:
//! - [`resolve`] - canonical path resolution against a workspace root,
//!   failing with a sandbox-escape error on any attempt to leave it
//! - [`SandboxFs`] - the filesystem surface exposed to untrusted code;
//!   every operation routes through the resolver
//! - [`SandboxCommand`] - kernel sandbox wrapping (bwrap / Seatbelt) for
//!   worker subprocesses
//!
//! # Example
//!
//! ```
//! use islet_workspace::SandboxFs;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dir = tempfile::tempdir().unwrap();
//! let sandbox = SandboxFs::new(dir.path()).unwrap();
//!
//! sandbox.write("notes/todo.txt", b"ship it").await.unwrap();
//! assert!(sandbox.read("../outside.txt").await.is_err());
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod fs;
mod resolve;
mod sandbox;

pub use error::{WorkspaceError, WorkspaceResult};
pub use fs::{EntryInfo, SandboxFs};
pub use resolve::resolve;
pub use sandbox::SandboxCommand;
