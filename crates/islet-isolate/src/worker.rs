//! Host side of the subprocess tiers (T1, T2).
//!
//! Spawns the `islet-worker` binary with a scrubbed environment and
//! OS resource limits, optionally wrapped in the kernel sandbox, and
//! brokers its stdio JSON-lines protocol: requests are dispatched
//! against the host services and answered by id; the terminal message
//! ends the transaction. The child is killed when the host future is
//! dropped, so cancellation and timeouts reap it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use islet_workspace::SandboxCommand;

use crate::broker::{dispatch_request, HostServices};
use crate::error::{IsolateError, IsolateResult};
use crate::inprocess::IsolateOutcome;
use crate::protocol::{HostMessage, IsolateMessage, JobSpec};
use crate::tier::Tier;

/// Address-space cap for worker processes (1 GiB).
const WORKER_MEMORY_BYTES: u64 = 1024 * 1024 * 1024;

/// Process/thread cap for worker processes.
const WORKER_MAX_PROCESSES: u64 = 16;

/// Open-file cap for worker processes.
const WORKER_MAX_OPEN_FILES: u64 = 64;

/// Locate the worker binary: explicit override, then a sibling of the
/// current executable, then `PATH`.
fn find_worker(override_path: Option<&Path>) -> IsolateResult<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(IsolateError::BringUp {
            tier: Tier::Subprocess,
            message: format!("configured worker {} not found", path.display()),
        });
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("islet-worker");
            if sibling.is_file() {
                return Ok(sibling);
            }
        }
    }
    which::which("islet-worker").map_err(|_| IsolateError::BringUp {
        tier: Tier::Subprocess,
        message: "islet-worker binary not found".to_string(),
    })
}

/// Build the worker command for a tier: scrubbed environment, workspace
/// cwd, rlimits, and (for [`Tier::Kernel`]) the kernel sandbox wrap.
fn build_command(tier: Tier, worker: &Path, workspace: &Path) -> IsolateResult<tokio::process::Command> {
    let mut cmd = std::process::Command::new(worker);
    cmd.current_dir(workspace);

    if tier == Tier::Kernel {
        if !SandboxCommand::available() {
            return Err(IsolateError::BringUp {
                tier,
                message: "no kernel sandbox wrapper available".to_string(),
            });
        }
        cmd = SandboxCommand::wrap(cmd, workspace).map_err(|e| IsolateError::BringUp {
            tier,
            message: format!("kernel sandbox wrap: {e}"),
        })?;
    }

    let mut cmd = tokio::process::Command::from(cmd);
    // Minimal environment: the scrub happens on the outermost command so
    // a sandbox wrapper cannot re-inherit the host environment. PATH is
    // pinned so the wrapper binary still resolves.
    cmd.env_clear();
    cmd.env("PATH", "/usr/local/bin:/usr/bin:/bin");
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    apply_rlimits(&mut cmd);
    Ok(cmd)
}

/// Apply `setrlimit` caps in a `pre_exec` hook.
///
/// The `unsafe` is required by POSIX: `pre_exec` runs between `fork()`
/// and `exec()` where only async-signal-safe operations are permitted,
/// and `setrlimit` qualifies.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn apply_rlimits(cmd: &mut tokio::process::Command) {
    // SAFETY: the closure only calls setrlimit with stack-local values
    // and reads errno on failure; no allocation, no locks.
    unsafe {
        cmd.pre_exec(|| {
            let limits = [
                (libc::RLIMIT_AS, WORKER_MEMORY_BYTES),
                (libc::RLIMIT_NPROC, WORKER_MAX_PROCESSES),
                (libc::RLIMIT_NOFILE, WORKER_MAX_OPEN_FILES),
            ];
            for (resource, value) in limits {
                let rlim = libc::rlimit {
                    rlim_cur: value,
                    rlim_max: value,
                };
                if libc::setrlimit(resource, &raw const rlim) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_rlimits(_cmd: &mut tokio::process::Command) {}

/// Run one submission in a worker subprocess.
pub(crate) async fn run_subprocess(
    tier: Tier,
    job: JobSpec,
    workspace: &Path,
    worker_override: Option<&Path>,
    services: Arc<dyn HostServices>,
) -> IsolateResult<IsolateOutcome> {
    let worker = find_worker(worker_override).map_err(|e| match e {
        IsolateError::BringUp { message, .. } => IsolateError::BringUp { tier, message },
        other => other,
    })?;
    let mut cmd = build_command(tier, &worker, workspace)?;
    let mut child = cmd.spawn().map_err(|e| IsolateError::BringUp {
        tier,
        message: format!("spawn: {e}"),
    })?;

    let stdin = child.stdin.take().ok_or_else(|| IsolateError::BringUp {
        tier,
        message: "worker stdin unavailable".to_string(),
    })?;
    let stdout = child.stdout.take().ok_or_else(|| IsolateError::BringUp {
        tier,
        message: "worker stdout unavailable".to_string(),
    })?;

    let writer = Arc::new(Mutex::new(stdin));
    {
        let mut line = serde_json::to_string(&HostMessage::Job { job })?;
        line.push('\n');
        let mut guard = writer.lock().await;
        guard.write_all(line.as_bytes()).await?;
        guard.flush().await?;
    }

    let mut reader = BufReader::new(stdout).lines();
    // In-flight request dispatches; aborted wholesale on termination so
    // late responses are discarded rather than written to a dead pipe.
    let mut in_flight = tokio::task::JoinSet::new();

    let outcome = loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                let status = child.wait().await.ok().and_then(|s| s.code());
                break Err(IsolateError::WorkerExited { status });
            },
            Err(e) => break Err(IsolateError::Channel(e)),
        };
        if line.trim().is_empty() {
            continue;
        }
        let message: IsolateMessage = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                warn!(%e, "unparseable worker message");
                break Err(IsolateError::Protocol(format!("bad message: {e}")));
            },
        };

        match message {
            IsolateMessage::Result { value, logs } => {
                break Ok(IsolateOutcome {
                    value,
                    logs,
                    error: None,
                });
            },
            IsolateMessage::Error { error, logs } => {
                break Ok(IsolateOutcome {
                    value: None,
                    logs,
                    error: Some(error),
                });
            },
            request => {
                let services = Arc::clone(&services);
                let writer = Arc::clone(&writer);
                in_flight.spawn(async move {
                    if let Some((id, result)) = dispatch_request(&services, request).await {
                        let response = match result {
                            Ok(value) => HostMessage::Response {
                                id,
                                value: Some(value),
                                error: None,
                            },
                            Err(error) => HostMessage::Response {
                                id,
                                value: None,
                                error: Some(error),
                            },
                        };
                        if let Ok(mut line) = serde_json::to_string(&response) {
                            line.push('\n');
                            let mut guard = writer.lock().await;
                            let _ = guard.write_all(line.as_bytes()).await;
                            let _ = guard.flush().await;
                        }
                    }
                });
            },
        }
    };

    in_flight.abort_all();
    debug!(?tier, ok = outcome.is_ok(), "worker transaction finished");
    let _ = child.kill().await;
    outcome
}
