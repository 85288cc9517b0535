//! The network policy engine: decide, elicit, execute.
//!
//! `check` is the pure decision function over the static policy. The
//! engine layers the permission cache and the elicitation channel on top,
//! executes sanctioned requests with size and deadline enforcement, and
//! audits every decision.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use islet_audit::{AuditEvent, AuditLog, EventContext, EventKind, Outcome, Severity};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::elicit::{ConsentDecision, ConsentRequest, ElicitationChannel};
use crate::error::{PolicyError, PolicyResult};
use crate::permission::PermissionCache;
use crate::policy::{classify_host, HostClass, NetworkPolicy};

/// Outcome of the static policy check for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The request may proceed without user involvement.
    Allowed,
    /// The request is refused.
    Blocked {
        /// Why the request is refused.
        reason: String,
    },
    /// The request needs user consent.
    Elicit,
}

/// A network request as presented by untrusted code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRequest {
    /// Target URL.
    pub url: String,
    /// HTTP method. Defaults to GET.
    #[serde(default = "default_method")]
    pub method: String,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl NetworkRequest {
    /// A GET request for a URL.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// A response delivered back to untrusted code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkResponse {
    /// HTTP status code.
    pub status: u16,
    /// Canonical status text.
    pub status_text: String,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Response body as text.
    pub body: String,
}

/// The policy engine for one submission.
pub struct NetworkPolicyEngine {
    policy: NetworkPolicy,
    permissions: PermissionCache,
    channel: Option<Arc<dyn ElicitationChannel>>,
    audit: AuditLog,
    context: EventContext,
    http: reqwest::Client,
}

impl NetworkPolicyEngine {
    /// Create an engine over a static policy.
    ///
    /// Redirects are disabled: a redirect to another host would otherwise
    /// bypass the per-URL decision.
    #[must_use]
    pub fn new(policy: NetworkPolicy, audit: AuditLog, context: EventContext) -> Self {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            policy,
            permissions: PermissionCache::new(),
            channel: None,
            audit,
            context,
            http,
        }
    }

    /// Attach an elicitation channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn ElicitationChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// The engine's static policy.
    #[must_use]
    pub fn policy(&self) -> &NetworkPolicy {
        &self.policy
    }

    /// Static policy decision for a URL, in spec order: parse, block
    /// list, host class flags, allow list.
    #[must_use]
    pub fn check(&self, url: &str) -> PolicyDecision {
        self.check_with(&self.policy, url)
    }

    /// Static policy decision under an explicit (e.g. binding-merged)
    /// policy.
    #[must_use]
    pub fn check_with(&self, policy: &NetworkPolicy, url: &str) -> PolicyDecision {
        let Ok(parsed) = url::Url::parse(url) else {
            return PolicyDecision::Blocked {
                reason: format!("malformed URL: {url}"),
            };
        };
        let Some(host) = parsed.host_str() else {
            return PolicyDecision::Blocked {
                reason: format!("URL has no host: {url}"),
            };
        };

        if policy.is_blocked_host(host) {
            return PolicyDecision::Blocked {
                reason: format!("domain {host} is blocked by policy"),
            };
        }

        match classify_host(host) {
            HostClass::Localhost => {
                if policy.allow_localhost {
                    PolicyDecision::Allowed
                } else {
                    self.elicit_or_block("localhost access is not permitted")
                }
            },
            HostClass::PrivateIp => {
                if policy.allow_private_ips {
                    PolicyDecision::Allowed
                } else {
                    self.elicit_or_block("private address access is not permitted")
                }
            },
            HostClass::External => {
                if policy.is_allowed_host(host) {
                    PolicyDecision::Allowed
                } else if policy.allowed.is_empty() {
                    PolicyDecision::Blocked {
                        reason: "No allowed domains configured".to_string(),
                    }
                } else {
                    self.elicit_or_block(&format!("domain {host} is not in the allowed list"))
                }
            },
        }
    }

    fn elicit_or_block(&self, reason: &str) -> PolicyDecision {
        if self.channel.is_some() {
            PolicyDecision::Elicit
        } else {
            PolicyDecision::Blocked {
                reason: reason.to_string(),
            }
        }
    }

    /// Authorize a URL, eliciting consent when the static policy defers
    /// to the user. Emits the permission/denial audit events.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Denied`] when the request is refused.
    pub async fn authorize(&self, url: &str, requester: &str) -> PolicyResult<()> {
        self.authorize_with(&self.policy, url, requester).await
    }

    /// [`authorize`](Self::authorize) under an explicit policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Denied`] when the request is refused.
    pub async fn authorize_with(
        &self,
        policy: &NetworkPolicy,
        url: &str,
        requester: &str,
    ) -> PolicyResult<()> {
        match self.check_with(policy, url) {
            PolicyDecision::Allowed => Ok(()),
            PolicyDecision::Blocked { reason } => {
                self.audit_denied(url, &reason);
                Err(PolicyError::Denied { reason })
            },
            PolicyDecision::Elicit => {
                if self.permissions.is_granted(url) {
                    debug!(%url, "permission cache hit");
                    return Ok(());
                }
                let Some(channel) = &self.channel else {
                    let reason = "no elicitation channel configured".to_string();
                    self.audit_denied(url, &reason);
                    return Err(PolicyError::Denied { reason });
                };

                let hostname = url::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_default();
                let decision = channel.elicit(ConsentRequest::new(requester, url)).await;
                match decision {
                    ConsentDecision::AllowOnce => {
                        self.permissions.grant_once(url, &hostname);
                        self.audit_permission(url, EventKind::NetworkPermissionGranted, "once");
                        Ok(())
                    },
                    ConsentDecision::AllowAlways => {
                        self.permissions.grant_always(url, &hostname);
                        self.audit_permission(url, EventKind::NetworkPermissionGranted, "always");
                        Ok(())
                    },
                    ConsentDecision::Deny => {
                        self.audit_permission(url, EventKind::NetworkPermissionDenied, "deny");
                        let reason = "denied by user".to_string();
                        self.audit_denied(url, &reason);
                        Err(PolicyError::Denied { reason })
                    },
                }
            },
        }
    }

    /// Revoke a cached grant for an exact URL.
    pub fn revoke(&self, url: &str) {
        if self.permissions.revoke(url) {
            self.audit_permission(url, EventKind::NetworkPermissionRevoked, "revoked");
        }
    }

    /// Execute a request under the engine's policy.
    ///
    /// # Errors
    ///
    /// Fails on denial, size caps, deadline, or transfer errors.
    pub async fn execute(
        &self,
        request: NetworkRequest,
        requester: &str,
    ) -> PolicyResult<NetworkResponse> {
        let policy = self.policy.clone();
        self.execute_with(&policy, request, requester).await
    }

    /// Execute a request under an explicit (e.g. binding-merged) policy.
    ///
    /// # Errors
    ///
    /// Fails on denial, size caps, deadline, or transfer errors.
    pub async fn execute_with(
        &self,
        policy: &NetworkPolicy,
        request: NetworkRequest,
        requester: &str,
    ) -> PolicyResult<NetworkResponse> {
        self.authorize_with(policy, &request.url, requester).await?;

        if let Some(body) = &request.body {
            if body.len() > policy.max_request_bytes {
                return Err(PolicyError::RequestTooLarge {
                    actual: body.len(),
                    max: policy.max_request_bytes,
                });
            }
        }

        self.audit.log(
            AuditEvent::new(
                EventKind::NetworkRequestAllowed,
                Severity::Info,
                Outcome::Success,
                self.context.clone(),
            )
            .with_url(&request.url)
            .with_detail("method", request.method.clone().into())
            .with_detail("requester", requester.into()),
        );

        let deadline = Duration::from_millis(policy.timeout_ms);
        let transfer = self.transfer(policy, request);
        match tokio::time::timeout(deadline, transfer).await {
            Ok(result) => result,
            Err(_) => Err(PolicyError::Timeout {
                timeout_ms: policy.timeout_ms,
            }),
        }
    }

    /// Perform the HTTP transfer with response-size enforcement.
    ///
    /// The body is streamed and counted; when the cap is exceeded nothing
    /// that arrived is delivered to the caller.
    async fn transfer(
        &self,
        policy: &NetworkPolicy,
        request: NetworkRequest,
    ) -> PolicyResult<NetworkResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| PolicyError::Transfer(format!("invalid method: {}", request.method)))?;

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| PolicyError::Transfer(e.to_string()))?;

        if let Some(declared) = response.content_length() {
            if declared > policy.max_response_bytes {
                return Err(PolicyError::ResponseTooLarge {
                    actual: declared,
                    max: policy.max_response_bytes,
                });
            }
        }

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();

        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PolicyError::Transfer(e.to_string()))?
        {
            let received = (body.len() as u64).saturating_add(chunk.len() as u64);
            if received > policy.max_response_bytes {
                return Err(PolicyError::ResponseTooLarge {
                    actual: received,
                    max: policy.max_response_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(NetworkResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    fn audit_denied(&self, url: &str, reason: &str) {
        self.audit.log(
            AuditEvent::new(
                EventKind::NetworkRequestDenied,
                Severity::Warning,
                Outcome::Blocked,
                self.context.clone(),
            )
            .with_url(url)
            .with_detail("reason", reason.into()),
        );
    }

    fn audit_permission(&self, url: &str, kind: EventKind, scope: &str) {
        let (severity, outcome) = match kind {
            EventKind::NetworkPermissionGranted => (Severity::Info, Outcome::Success),
            EventKind::NetworkPermissionRevoked => (Severity::Info, Outcome::Success),
            _ => (Severity::Warning, Outcome::Blocked),
        };
        self.audit.log(
            AuditEvent::new(kind, severity, outcome, self.context.clone())
                .with_url(url)
                .with_detail("scope", scope.into()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use islet_core::SessionId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine(policy: NetworkPolicy) -> (NetworkPolicyEngine, AuditLog, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::open(dir.path(), islet_audit::AuditConfig::default()).unwrap();
        let context = EventContext::for_session(SessionId::new());
        (
            NetworkPolicyEngine::new(policy, audit.clone(), context),
            audit,
            dir,
        )
    }

    struct FixedChannel {
        decision: ConsentDecision,
        asked: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ElicitationChannel for FixedChannel {
        async fn elicit(&self, _request: ConsentRequest) -> ConsentDecision {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.decision
        }
    }

    #[tokio::test]
    async fn test_malformed_url_blocked() {
        let (engine, _, _dir) = engine(NetworkPolicy::default());
        assert!(matches!(
            engine.check("not a url"),
            PolicyDecision::Blocked { .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_allowlist_blocks_external_with_reason() {
        let (engine, _, _dir) = engine(NetworkPolicy::default());
        match engine.check("https://api.example.com/v1") {
            PolicyDecision::Blocked { reason } => {
                assert_eq!(reason, "No allowed domains configured");
            },
            other => panic!("expected Blocked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_allowed_domain_passes() {
        let (engine, _, _dir) = engine(NetworkPolicy {
            allowed: vec!["api.example.com".into()],
            ..NetworkPolicy::default()
        });
        assert_eq!(
            engine.check("https://api.example.com/v1"),
            PolicyDecision::Allowed
        );
    }

    #[tokio::test]
    async fn test_blocked_overrides_allowed() {
        let (engine, _, _dir) = engine(NetworkPolicy {
            allowed: vec!["*".into()],
            blocked: vec!["evil.example.com".into()],
            ..NetworkPolicy::default()
        });
        assert!(matches!(
            engine.check("https://evil.example.com/"),
            PolicyDecision::Blocked { .. }
        ));
    }

    #[tokio::test]
    async fn test_localhost_flag() {
        let (engine, _, _dir) = engine(NetworkPolicy {
            allow_localhost: true,
            ..NetworkPolicy::default()
        });
        assert_eq!(engine.check("http://127.0.0.1:8080/"), PolicyDecision::Allowed);
        assert_eq!(engine.check("http://localhost:3000/"), PolicyDecision::Allowed);
    }

    #[tokio::test]
    async fn test_private_ip_without_channel_blocked() {
        let (engine, _, _dir) = engine(NetworkPolicy::default());
        assert!(matches!(
            engine.check("http://10.0.0.5/health"),
            PolicyDecision::Blocked { .. }
        ));
    }

    #[tokio::test]
    async fn test_denied_authorize_audits() {
        let (engine, audit, _dir) = engine(NetworkPolicy::default());
        let err = engine
            .authorize("https://attacker.invalid/x", "fetch")
            .await
            .unwrap_err();
        assert!(matches!(err, PolicyError::Denied { .. }));

        audit.flush().await.unwrap();
        let events = audit.read_last(10).await.unwrap();
        let denied: Vec<_> = events
            .iter()
            .filter(|e| e.kind == EventKind::NetworkRequestDenied)
            .collect();
        assert_eq!(denied.len(), 1);
        assert_eq!(
            denied[0].details["url_hash"],
            serde_json::Value::from(islet_audit::url_digest("https://attacker.invalid/x"))
        );
    }

    #[tokio::test]
    async fn test_allow_once_elicits_exactly_once() {
        let channel = Arc::new(FixedChannel {
            decision: ConsentDecision::AllowOnce,
            asked: AtomicUsize::new(0),
        });
        let (engine, audit, _dir) = engine(NetworkPolicy::default());
        let engine = engine.with_channel(channel.clone());

        engine
            .authorize("http://10.0.0.5/health", "fetch")
            .await
            .unwrap();
        engine
            .authorize("http://10.0.0.5/health", "fetch")
            .await
            .unwrap();

        assert_eq!(channel.asked.load(Ordering::SeqCst), 1);

        audit.flush().await.unwrap();
        let events = audit.read_last(10).await.unwrap();
        let granted = events
            .iter()
            .filter(|e| e.kind == EventKind::NetworkPermissionGranted)
            .count();
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_deny_not_cached_reasks() {
        let channel = Arc::new(FixedChannel {
            decision: ConsentDecision::Deny,
            asked: AtomicUsize::new(0),
        });
        let (engine, _, _dir) = engine(NetworkPolicy::default());
        let engine = engine.with_channel(channel.clone());

        assert!(engine.authorize("http://10.0.0.5/", "fetch").await.is_err());
        assert!(engine.authorize("http://10.0.0.5/", "fetch").await.is_err());
        assert_eq!(channel.asked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_request_body_cap() {
        let (engine, _, _dir) = engine(NetworkPolicy {
            allowed: vec!["api.example.com".into()],
            max_request_bytes: 8,
            ..NetworkPolicy::default()
        });
        let mut request = NetworkRequest::get("https://api.example.com/v1");
        request.method = "POST".into();
        request.body = Some("way more than eight bytes".into());
        let err = engine.execute(request, "fetch").await.unwrap_err();
        assert!(matches!(err, PolicyError::RequestTooLarge { .. }));
    }
}
