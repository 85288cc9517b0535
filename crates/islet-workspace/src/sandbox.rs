//! Kernel-level sandbox wrapping for worker subprocesses.
//!
//! Wraps a standard OS command in a native kernel sandbox (bwrap or
//! Seatbelt) so that even the strongest-tier worker process is physically
//! restricted to its workspace. The worker's only channel to the world is
//! its stdio pipe; network namespaces are not shared, because every
//! network effect is brokered by the trusted host.

use std::io;
use std::path::Path;
use std::process::Command;

/// Wraps a command in the host OS kernel sandbox, restricted to a
/// workspace directory.
pub struct SandboxCommand;

impl SandboxCommand {
    /// Whether a kernel sandbox wrapper is available on this host.
    #[must_use]
    pub fn available() -> bool {
        #[cfg(target_os = "linux")]
        {
            which_in_path("bwrap")
        }
        #[cfg(target_os = "macos")]
        {
            which_in_path("sandbox-exec")
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            false
        }
    }

    /// Wrap the provided command so the child can only write inside
    /// `workspace_path` and has no network access.
    ///
    /// - On Linux, prepends `bwrap` with read-only host mounts, a bind of
    ///   the workspace, a disposable tmpfs, and all namespaces unshared.
    /// - On macOS, generates a Seatbelt profile and prepends
    ///   `sandbox-exec`.
    /// - On other platforms, fails; the caller decays to the next tier.
    ///
    /// # Errors
    ///
    /// Returns an error if profile generation fails or no wrapper exists.
    pub fn wrap(inner_cmd: Command, workspace_path: &Path) -> io::Result<Command> {
        let workspace_str = workspace_path.to_string_lossy().to_string();

        #[cfg(target_os = "linux")]
        {
            let mut bwrap = Command::new("bwrap");
            bwrap
                .arg("--ro-bind").arg("/").arg("/") // Read-only host (worker binary, shared libs)
                .arg("--dev").arg("/dev")
                .arg("--proc").arg("/proc")
                .arg("--bind").arg(&workspace_str).arg(&workspace_str) // Writable workspace
                .arg("--tmpfs").arg("/tmp")
                .arg("--unshare-all")               // No network, pid, ipc namespaces
                .arg("--die-with-parent");

            bwrap.arg(inner_cmd.get_program());
            for arg in inner_cmd.get_args() {
                bwrap.arg(arg);
            }
            for (k, v) in inner_cmd.get_envs() {
                if let Some(v) = v {
                    bwrap.env(k, v);
                } else {
                    bwrap.env_remove(k);
                }
            }
            if let Some(dir) = inner_cmd.get_current_dir() {
                bwrap.current_dir(dir);
            }

            Ok(bwrap)
        }

        #[cfg(target_os = "macos")]
        {
            let profile = format!(
                r#"(version 1)
(deny default)
(allow file-read*)
(allow process-exec*)
(allow process-fork)
(allow sysctl-read)
(allow file-write*
    (subpath "{workspace_str}")
    (subpath "/private/tmp")
    (subpath "/var/folders")
)"#
            );

            let profile_path =
                std::env::temp_dir().join(format!("islet_sandbox_{}.sb", uuid::Uuid::new_v4()));
            std::fs::write(&profile_path, profile)
                .map_err(|e| io::Error::other(format!("failed to write seatbelt profile: {e}")))?;

            let mut sb_cmd = Command::new("sandbox-exec");
            sb_cmd.arg("-f").arg(&profile_path);

            sb_cmd.arg(inner_cmd.get_program());
            for arg in inner_cmd.get_args() {
                sb_cmd.arg(arg);
            }
            for (k, v) in inner_cmd.get_envs() {
                if let Some(v) = v {
                    sb_cmd.env(k, v);
                } else {
                    sb_cmd.env_remove(k);
                }
            }
            if let Some(dir) = inner_cmd.get_current_dir() {
                sb_cmd.current_dir(dir);
            }

            Ok(sb_cmd)
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let _ = inner_cmd;
            Err(io::Error::other(
                "no kernel sandbox wrapper on this platform",
            ))
        }
    }
}

#[allow(dead_code)]
fn which_in_path(binary: &str) -> bool {
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(binary).is_file())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_availability_probe_does_not_panic() {
        // Result depends on the host; the probe itself must be safe.
        let _ = SandboxCommand::available();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_wrap_prepends_bwrap() {
        let dir = tempfile::tempdir().unwrap();
        let mut inner = Command::new("/bin/true");
        inner.arg("--flag");
        let wrapped = SandboxCommand::wrap(inner, dir.path()).unwrap();
        assert_eq!(wrapped.get_program(), "bwrap");
        let args: Vec<_> = wrapped.get_args().collect();
        assert!(args.iter().any(|a| *a == "--unshare-all"));
        assert!(args.iter().any(|a| *a == "/bin/true"));
        assert!(args.iter().any(|a| *a == "--flag"));
    }
}
