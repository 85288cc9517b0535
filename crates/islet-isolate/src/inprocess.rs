//! The in-process tier (T4) and the thread tier (T3).
//!
//! Both run the engine directly against the host services; the engine's
//! own hardening (forbidden properties, instruction and value budgets,
//! call depth) is the isolation. The thread tier additionally moves
//! execution onto a dedicated OS thread with a bounded stack, so a
//! runaway submission cannot starve the host runtime's worker threads.

use std::sync::Arc;

use islet_core::{ErrorKind, ErrorRecord};
use serde_json::Value as Json;

use crate::broker::HostServices;
use crate::error::{IsolateError, IsolateResult};
use crate::protocol::JobSpec;
use crate::script::{lower, Engine};
use crate::tier::Tier;

/// Stack size for the dedicated engine thread.
const THREAD_STACK_BYTES: usize = 8 * 1024 * 1024;

/// What one isolate run produced.
#[derive(Debug, Clone)]
pub struct IsolateOutcome {
    /// Value produced by the submission, if any.
    pub value: Option<Json>,
    /// Log lines in emission order.
    pub logs: Vec<String>,
    /// Terminal error, if the submission failed.
    pub error: Option<ErrorRecord>,
}

/// Run the engine inline on the host runtime (T4).
pub(crate) async fn run_in_process(
    job: &JobSpec,
    services: Arc<dyn HostServices>,
) -> IsolateResult<IsolateOutcome> {
    let program = match lower(&job.code) {
        Ok(program) => program,
        Err(err) => {
            return Ok(IsolateOutcome {
                value: None,
                logs: Vec::new(),
                error: Some(ErrorRecord::new(ErrorKind::Validation, err.to_string())),
            })
        },
    };
    let engine = Engine::new(services, job.limits);
    let (value, logs, error) = engine.run(&program, &job.tools, &job.bindings).await;
    Ok(IsolateOutcome { value, logs, error })
}

/// Run the engine on a dedicated OS thread (T3).
///
/// The thread owns a current-thread async runtime; results come back
/// over a oneshot. A panicking or vanishing thread surfaces as a broker
/// error, not a host crash.
pub(crate) async fn run_on_thread(
    job: JobSpec,
    services: Arc<dyn HostServices>,
) -> IsolateResult<IsolateOutcome> {
    let (tx, rx) = tokio::sync::oneshot::channel();

    let spawned = std::thread::Builder::new()
        .name("islet-engine".to_string())
        .stack_size(THREAD_STACK_BYTES)
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            let outcome = match runtime {
                Ok(runtime) => runtime.block_on(run_in_process(&job, services)),
                Err(err) => Err(IsolateError::BringUp {
                    tier: Tier::Thread,
                    message: format!("engine runtime: {err}"),
                }),
            };
            let _ = tx.send(outcome);
        });

    if let Err(err) = spawned {
        return Err(IsolateError::BringUp {
            tier: Tier::Thread,
            message: format!("thread spawn: {err}"),
        });
    }

    match rx.await {
        Ok(outcome) => outcome,
        Err(_) => Err(IsolateError::Protocol(
            "engine thread ended without a result".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use islet_core::ToolDescriptor;
    use serde_json::json;

    use crate::protocol::{BindingSurface, EngineLimits, FsOperation};

    struct NullServices;

    #[async_trait]
    impl HostServices for NullServices {
        async fn tool_call(&self, _: &str, _: Json) -> Result<Json, ErrorRecord> {
            Ok(json!("tool result"))
        }
        async fn binding_call(&self, _: &str, _: &str, _: Json) -> Result<Json, ErrorRecord> {
            Ok(Json::Null)
        }
        async fn network_call(
            &self,
            _: &str,
            _: &str,
            _: Option<std::collections::BTreeMap<String, String>>,
            _: Option<String>,
        ) -> Result<Json, ErrorRecord> {
            Ok(Json::Null)
        }
        async fn fs_call(&self, _: FsOperation) -> Result<Json, ErrorRecord> {
            Ok(Json::Null)
        }
        fn log(&self, _: String) {}
        fn security_violation(&self, _: String) {}
    }

    fn job(code: &str) -> JobSpec {
        JobSpec {
            code: code.to_string(),
            tools: vec![ToolDescriptor::new("github", "get_issue")],
            bindings: vec![BindingSurface {
                name: "jira".into(),
                methods: vec!["search".into()],
            }],
            limits: EngineLimits::default(),
        }
    }

    #[tokio::test]
    async fn test_in_process_runs() {
        let outcome = run_in_process(&job("return 1 + 1;"), Arc::new(NullServices))
            .await
            .unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.value, Some(json!(2.0)));
    }

    #[tokio::test]
    async fn test_in_process_lowering_failure_is_validation() {
        let outcome = run_in_process(&job("class A {}"), Arc::new(NullServices))
            .await
            .unwrap();
        assert_eq!(outcome.error.unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_thread_tier_runs() {
        let outcome = run_on_thread(
            job("const r = await github.get_issue({});\nreturn r;"),
            Arc::new(NullServices),
        )
        .await
        .unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(outcome.value, Some(json!("tool result")));
    }
}
