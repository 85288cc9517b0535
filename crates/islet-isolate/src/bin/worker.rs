//! `islet-worker` - the subprocess half of the isolate.
//!
//! Reads one job from stdin, runs the engine, and brokers every
//! privileged effect back to the host over stdio JSON lines. The
//! process has no credentials, no configuration, and (under the kernel
//! tier) no network; its stdio pipe is its entire world.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use async_trait::async_trait;
use islet_core::{ErrorKind, ErrorRecord};
use serde_json::Value as Json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

use islet_isolate::{
    lower, Engine, FsOperation, HostMessage, HostServices, IsolateMessage, JobSpec,
};

fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr; stdout belongs to the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("worker runtime")?;
    runtime.block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    let first = lines
        .next_line()
        .await
        .context("reading job")?
        .context("host closed before sending a job")?;
    let HostMessage::Job { job } = serde_json::from_str(&first).context("parsing job")? else {
        bail!("first message was not a job");
    };

    let out = Arc::new(Mutex::new(std::io::stdout()));
    let services = Arc::new(StdioServices {
        next_id: AtomicU64::new(1),
        pending: Mutex::new(HashMap::new()),
        out: Arc::clone(&out),
    });

    // Advisory textual screen at the worker boundary. The host's AST
    // pass is the authoritative gate; hits here are surfaced for audit
    // but do not block on their own.
    for violation in islet_analysis::precheck(&job.code) {
        services.emit(&IsolateMessage::SecurityViolation {
            description: violation.description,
        });
    }

    // Response pump: completes pending calls; a vanished host ends the
    // process.
    {
        let services = Arc::clone(&services);
        tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<HostMessage>(&line) {
                            Ok(HostMessage::Response { id, value, error }) => {
                                services.complete(id, value, error);
                            },
                            Ok(HostMessage::Cancel) => std::process::exit(0),
                            Ok(HostMessage::Job { .. }) => {
                                // One job per process.
                                std::process::exit(2);
                            },
                            Err(_) => std::process::exit(2),
                        }
                    },
                    Ok(None) | Err(_) => std::process::exit(0),
                }
            }
        });
    }

    let terminal = execute(&job, Arc::clone(&services) as Arc<dyn HostServices>).await;
    services.emit(&terminal);
    Ok(())
}

async fn execute(job: &JobSpec, services: Arc<dyn HostServices>) -> IsolateMessage {
    let program = match lower(&job.code) {
        Ok(program) => program,
        Err(err) => {
            return IsolateMessage::Error {
                error: ErrorRecord::new(ErrorKind::Validation, err.to_string()),
                logs: Vec::new(),
            }
        },
    };
    let engine = Engine::new(services, job.limits);
    let (value, logs, error) = engine.run(&program, &job.tools, &job.bindings).await;
    match error {
        Some(error) => IsolateMessage::Error { error, logs },
        None => IsolateMessage::Result { value, logs },
    }
}

struct StdioServices {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Json, ErrorRecord>>>>,
    out: Arc<Mutex<std::io::Stdout>>,
}

impl StdioServices {
    /// Write one message as a JSON line.
    fn emit(&self, message: &IsolateMessage) {
        if let Ok(mut line) = serde_json::to_string(message) {
            line.push('\n');
            let mut out = self.out.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let _ = out.write_all(line.as_bytes());
            let _ = out.flush();
        }
    }

    fn complete(&self, id: u64, value: Option<Json>, error: Option<ErrorRecord>) {
        let sender = {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            pending.remove(&id)
        };
        if let Some(sender) = sender {
            let result = match (value, error) {
                (_, Some(error)) => Err(error),
                (Some(value), None) => Ok(value),
                (None, None) => Ok(Json::Null),
            };
            let _ = sender.send(result);
        }
    }

    /// Send a request and wait for its correlated response.
    async fn request(
        &self,
        build: impl FnOnce(u64) -> IsolateMessage,
    ) -> Result<Json, ErrorRecord> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self
                .pending
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            pending.insert(id, tx);
        }
        self.emit(&build(id));
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ErrorRecord::new(ErrorKind::Broker, "worker terminated")),
        }
    }
}

#[async_trait]
impl HostServices for StdioServices {
    async fn tool_call(&self, qualified_name: &str, params: Json) -> Result<Json, ErrorRecord> {
        let qualified_name = qualified_name.to_string();
        self.request(|id| IsolateMessage::ToolCall {
            id,
            qualified_name,
            params,
        })
        .await
    }

    async fn binding_call(
        &self,
        binding: &str,
        method: &str,
        args: Json,
    ) -> Result<Json, ErrorRecord> {
        let binding = binding.to_string();
        let method = method.to_string();
        self.request(|id| IsolateMessage::BindingCall {
            id,
            binding,
            method,
            args,
        })
        .await
    }

    async fn network_call(
        &self,
        url: &str,
        method: &str,
        headers: Option<std::collections::BTreeMap<String, String>>,
        body: Option<String>,
    ) -> Result<Json, ErrorRecord> {
        let url = url.to_string();
        let method = method.to_string();
        self.request(|id| IsolateMessage::NetworkCall {
            id,
            url,
            method,
            headers,
            body,
        })
        .await
    }

    async fn fs_call(&self, operation: FsOperation) -> Result<Json, ErrorRecord> {
        self.request(|id| IsolateMessage::FsCall { id, operation })
            .await
    }

    fn log(&self, line: String) {
        self.emit(&IsolateMessage::Log { line });
    }

    fn security_violation(&self, description: String) {
        self.emit(&IsolateMessage::SecurityViolation { description });
    }
}
