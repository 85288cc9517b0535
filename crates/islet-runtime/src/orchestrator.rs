//! The orchestrator: one entry point, the full lifecycle.
//!
//! A submission flows `Received → Analyzing → (Rejected |
//! Executing(tier)) → terminal`. Package policy and static analysis
//! gate it; the isolate executor runs it behind the broker; the
//! wall-clock deadline and the cancel signal can terminate it at any
//! point, killing the isolate and discarding late responses. Every
//! transition of interest lands in the audit log.

use std::sync::Arc;
use std::time::Duration;

use islet_analysis::analyze;
use islet_approval::ApprovalStore;
use islet_audit::{AuditEvent, AuditLog, EventContext, EventKind, Outcome, Severity};
use islet_bindings::BindingRegistry;
use islet_core::{
    truncate_to_boundary, CorrelationId, ErrorKind, ErrorRecord, ExecutionResult, SessionId,
};
use islet_isolate::{BindingSurface, IsolateExecutor, JobSpec, Tier};
use islet_policy::{ElicitationChannel, NetworkPolicyEngine};
use islet_vault::CredentialVault;
use islet_workspace::SandboxFs;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::error::RuntimeResult;
use crate::layout::BaseDir;
use crate::notify::{Notification, SessionNotifications};
use crate::services::SubmissionServices;
use crate::submission::{Submission, SubmissionState};
use crate::traits::ToolRegistry;

/// Truncation cap for code snippets and error messages in audit events.
const AUDIT_SNIPPET_BYTES: usize = 512;

/// The result envelope returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEnvelope {
    /// The execution result.
    pub result: ExecutionResult,
    /// The submission's correlation id.
    pub correlation_id: CorrelationId,
    /// Terminal lifecycle state.
    pub state: SubmissionState,
    /// The tier that ran the submission, when one did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// Pending user-visible notifications.
    pub notifications: Vec<Notification>,
}

/// Composes the subsystem and drives submissions through it.
pub struct Orchestrator {
    config: RuntimeConfig,
    session: SessionId,
    audit: AuditLog,
    vault: Arc<CredentialVault>,
    bindings: Arc<BindingRegistry>,
    policy: Arc<NetworkPolicyEngine>,
    approvals: Arc<ApprovalStore>,
    registry: Arc<dyn ToolRegistry>,
    executor: IsolateExecutor,
    sandbox: SandboxFs,
    notifications: SessionNotifications,
}

impl Orchestrator {
    /// Bring the subsystem up under a base directory.
    ///
    /// # Errors
    ///
    /// Fails when the directory tree, audit log, or workspace cannot be
    /// prepared.
    pub fn new(
        base: &BaseDir,
        config: RuntimeConfig,
        registry: Arc<dyn ToolRegistry>,
        elicitation: Option<Arc<dyn ElicitationChannel>>,
    ) -> RuntimeResult<Self> {
        base.ensure().map_err(crate::error::RuntimeError::BaseDir)?;

        let session = SessionId::new();
        let context = EventContext::for_session(session.clone());
        let audit = AuditLog::open(base.audit_dir(), config.audit.clone())?;
        let vault = Arc::new(CredentialVault::new(base.credentials_dir()));
        let bindings = Arc::new(BindingRegistry::new(
            Arc::clone(&vault),
            audit.clone(),
            context.clone(),
        ));
        let mut policy =
            NetworkPolicyEngine::new(config.network.clone(), audit.clone(), context);
        if let Some(channel) = elicitation {
            policy = policy.with_channel(channel);
        }
        let sandbox = SandboxFs::new(base.workspace_dir())?;
        let executor = IsolateExecutor::new(config.isolate.clone(), base.workspace_dir());

        info!(%session, base = %base.root().display(), "islet runtime ready");
        Ok(Self {
            config,
            session,
            audit,
            vault,
            bindings,
            policy: Arc::new(policy),
            approvals: Arc::new(ApprovalStore::new()),
            registry,
            executor,
            sandbox,
            notifications: SessionNotifications::new(),
        })
    }

    /// This process's session id.
    #[must_use]
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// The audit log handle.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The credential vault.
    #[must_use]
    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    /// The binding registry.
    #[must_use]
    pub fn bindings(&self) -> &Arc<BindingRegistry> {
        &self.bindings
    }

    /// The network policy engine.
    #[must_use]
    pub fn policy(&self) -> &Arc<NetworkPolicyEngine> {
        &self.policy
    }

    /// The package approval store.
    #[must_use]
    pub fn approvals(&self) -> &Arc<ApprovalStore> {
        &self.approvals
    }

    /// Session notifications.
    #[must_use]
    pub fn notifications(&self) -> &SessionNotifications {
        &self.notifications
    }

    /// Execute a submission to completion.
    pub async fn execute(
        &self,
        code: &str,
        timeout_ms: u32,
        correlation_id: Option<CorrelationId>,
    ) -> ExecutionEnvelope {
        self.execute_with_cancel(code, timeout_ms, correlation_id, CancellationToken::new())
            .await
    }

    /// Execute a submission with an external cancel signal.
    ///
    /// Cancellation terminates the isolate and rejects everything still
    /// in flight; the envelope reports the `Cancelled` state.
    pub async fn execute_with_cancel(
        &self,
        code: &str,
        timeout_ms: u32,
        correlation_id: Option<CorrelationId>,
        cancel: CancellationToken,
    ) -> ExecutionEnvelope {
        let correlation = correlation_id.unwrap_or_default();
        let mut submission = Submission::new(code, timeout_ms, correlation.clone());
        let context = EventContext::for_session(self.session.clone())
            .with_correlation(correlation.clone());

        let envelope = self
            .run_lifecycle(&mut submission, &context, cancel)
            .await;

        // Operation-scoped package approvals never outlive a submission.
        self.approvals.clear_operation_approvals();

        ExecutionEnvelope {
            result: envelope.0,
            correlation_id: correlation,
            state: submission.state,
            tier: envelope.1,
            notifications: self.notifications.pending(),
        }
    }

    async fn run_lifecycle(
        &self,
        submission: &mut Submission,
        context: &EventContext,
        cancel: CancellationToken,
    ) -> (ExecutionResult, Option<Tier>) {
        submission.state = SubmissionState::Analyzing;

        // Package policy gates first: blocked packages and unapproved
        // references reject before any parsing.
        let packages = self.approvals.analyze(&submission.code);
        if !packages.blocked.is_empty() {
            let reason = format!("blocked packages referenced: {}", packages.blocked.join(", "));
            return (self.reject(submission, context, &reason), None);
        }
        if !packages.needs_approval.is_empty() {
            let reason = format!(
                "packages need approval: {}",
                packages.needs_approval.join(", ")
            );
            return (self.reject(submission, context, &reason), None);
        }

        // Static analysis is authoritative.
        let tools = self.registry.list_tools().await;
        let namespaces: Vec<String> = {
            let mut set: Vec<String> = tools
                .iter()
                .map(|t| t.qualified_name.namespace.clone())
                .collect();
            set.sort();
            set.dedup();
            set
        };
        let analysis = analyze(&submission.code, &namespaces);
        if analysis.must_reject() {
            return (
                self.reject(submission, context, &analysis.rejection_reason()),
                None,
            );
        }

        // Deadline zero times out before the isolate ever starts.
        if submission.timeout_ms == 0 {
            submission.state = SubmissionState::TimedOut;
            self.audit_outcome(
                submission,
                context,
                EventKind::CodeExecutionTimeout,
                "deadline was zero",
            );
            return (
                ExecutionResult::failure(
                    ErrorRecord::new(ErrorKind::Timeout, "submission deadline elapsed"),
                    Vec::new(),
                ),
                None,
            );
        }

        self.audit.log(
            AuditEvent::new(
                EventKind::CodeExecutionStart,
                Severity::Info,
                Outcome::Success,
                context.clone(),
            )
            .with_detail("risk_level", analysis.risk_level.to_string().into())
            .with_detail(
                "intents",
                serde_json::to_value(&analysis.intents).unwrap_or_default(),
            )
            .with_detail(
                "code",
                truncate_to_boundary(&submission.code, AUDIT_SNIPPET_BYTES).into(),
            ),
        );

        let job = JobSpec {
            code: submission.code.clone(),
            tools,
            bindings: self
                .bindings
                .snapshot()
                .into_iter()
                .map(|b| BindingSurface {
                    name: b.name,
                    methods: b.methods,
                })
                .collect(),
            limits: self.executor.limits(),
        };
        let services = Arc::new(SubmissionServices {
            registry: Arc::clone(&self.registry),
            bindings: Arc::clone(&self.bindings),
            policy: Arc::clone(&self.policy),
            sandbox: self.sandbox.clone(),
            audit: self.audit.clone(),
            context: context.clone(),
        });

        submission.state = SubmissionState::Executing {
            tier: self.config.isolate.start_tier,
        };

        let audit = self.audit.clone();
        let fallback_context = context.clone();
        let execution = self.executor.execute(job, services, move |tier, err| {
            audit.log(
                AuditEvent::new(
                    EventKind::WorkerThreadFailed,
                    Severity::Warning,
                    Outcome::Failure,
                    fallback_context.clone(),
                )
                .with_detail("tier", tier.label().into())
                .with_detail("error", err.to_string().into()),
            );
        });

        let deadline = Duration::from_millis(u64::from(submission.timeout_ms));
        let outcome = tokio::select! {
            outcome = execution => Some(outcome),
            () = tokio::time::sleep(deadline) => None,
            () = cancel.cancelled() => {
                submission.state = SubmissionState::Cancelled;
                self.audit_outcome(submission, context, EventKind::CodeExecutionError, "cancelled");
                return (
                    ExecutionResult::failure(
                        ErrorRecord::new(ErrorKind::Timeout, "submission cancelled"),
                        Vec::new(),
                    ),
                    None,
                );
            },
        };

        match outcome {
            None => {
                // Deadline: dropping the execution future kills the
                // isolate; in-flight broker responses are discarded.
                submission.state = SubmissionState::TimedOut;
                self.audit_outcome(
                    submission,
                    context,
                    EventKind::CodeExecutionTimeout,
                    "wall-clock deadline elapsed",
                );
                (
                    ExecutionResult::failure(
                        ErrorRecord::new(ErrorKind::Timeout, "submission deadline elapsed"),
                        Vec::new(),
                    ),
                    None,
                )
            },
            Some(Err(isolate_err)) => {
                submission.state = SubmissionState::Failed;
                let record = isolate_err.to_record();
                self.audit_outcome(submission, context, EventKind::CodeExecutionError, &record.message);
                (ExecutionResult::failure(record, Vec::new()), None)
            },
            Some(Ok((tier, outcome))) => {
                debug!(%tier, "submission finished");
                match outcome.error {
                    None => {
                        submission.state = SubmissionState::Succeeded;
                        self.audit.log(
                            AuditEvent::new(
                                EventKind::CodeExecutionSuccess,
                                Severity::Info,
                                Outcome::Success,
                                context.clone(),
                            )
                            .with_detail("tier", tier.label().into()),
                        );
                        (
                            ExecutionResult::success(outcome.value, outcome.logs),
                            Some(tier),
                        )
                    },
                    Some(error) => {
                        submission.state = SubmissionState::Failed;
                        self.audit_outcome(
                            submission,
                            context,
                            EventKind::CodeExecutionError,
                            &error.message,
                        );
                        (ExecutionResult::failure(error, outcome.logs), Some(tier))
                    },
                }
            },
        }
    }

    fn reject(
        &self,
        submission: &mut Submission,
        context: &EventContext,
        reason: &str,
    ) -> ExecutionResult {
        submission.state = SubmissionState::Rejected;
        self.audit_outcome(submission, context, EventKind::CodeExecutionError, reason);
        ExecutionResult::failure(
            ErrorRecord::new(ErrorKind::Validation, reason.to_string()),
            Vec::new(),
        )
    }

    fn audit_outcome(
        &self,
        submission: &Submission,
        context: &EventContext,
        kind: EventKind,
        message: &str,
    ) {
        let (severity, outcome) = match kind {
            EventKind::CodeExecutionTimeout => (Severity::Warning, Outcome::Failure),
            _ => (Severity::Error, Outcome::Failure),
        };
        self.audit.log(
            AuditEvent::new(kind, severity, outcome, context.clone())
                .with_detail(
                    "error",
                    truncate_to_boundary(message, AUDIT_SNIPPET_BYTES).into(),
                )
                .with_detail(
                    "code",
                    truncate_to_boundary(&submission.code, AUDIT_SNIPPET_BYTES).into(),
                ),
        );
    }
}
