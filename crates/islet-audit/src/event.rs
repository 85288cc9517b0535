//! Audit event types.
//!
//! Every policy decision and execution outcome is recorded as one event,
//! written as a single JSON line. Sensitive keys in `details` are redacted
//! before the event reaches disk.

use islet_core::{CorrelationId, SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A submission entered execution.
    CodeExecutionStart,
    /// A submission completed successfully.
    CodeExecutionSuccess,
    /// A submission failed (validation, broker, or downstream terminal).
    CodeExecutionError,
    /// A submission hit its wall-clock deadline.
    CodeExecutionTimeout,
    /// A network request passed policy and was executed.
    NetworkRequestAllowed,
    /// A network request was refused by policy or user.
    NetworkRequestDenied,
    /// The user granted a network permission via elicitation.
    NetworkPermissionGranted,
    /// The user denied a network permission via elicitation.
    NetworkPermissionDenied,
    /// A cached network permission was revoked.
    NetworkPermissionRevoked,
    /// Untrusted code invoked a binding method.
    BindingAccessed,
    /// A static-analysis or runtime security rule fired.
    SecurityViolation,
    /// Untrusted code attempted prototype-chain access.
    PrototypePollutionBlocked,
    /// An isolate tier failed to come up and execution decayed a tier.
    WorkerThreadFailed,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CodeExecutionStart => "code_execution_start",
            Self::CodeExecutionSuccess => "code_execution_success",
            Self::CodeExecutionError => "code_execution_error",
            Self::CodeExecutionTimeout => "code_execution_timeout",
            Self::NetworkRequestAllowed => "network_request_allowed",
            Self::NetworkRequestDenied => "network_request_denied",
            Self::NetworkPermissionGranted => "network_permission_granted",
            Self::NetworkPermissionDenied => "network_permission_denied",
            Self::NetworkPermissionRevoked => "network_permission_revoked",
            Self::BindingAccessed => "binding_accessed",
            Self::SecurityViolation => "security_violation",
            Self::PrototypePollutionBlocked => "prototype_pollution_blocked",
            Self::WorkerThreadFailed => "worker_thread_failed",
        };
        write!(f, "{s}")
    }
}

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Routine operation.
    Info,
    /// Unusual but handled.
    Warning,
    /// An operation failed.
    Error,
    /// A security boundary was exercised.
    Critical,
}

/// Outcome of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The operation succeeded.
    Success,
    /// The operation failed.
    Failure,
    /// The operation was refused before it ran.
    Blocked,
    /// The operation is awaiting an external decision.
    Pending,
}

/// Who/what the event is about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    /// MCP namespace involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_name: Option<String>,
    /// Binding involved, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding_name: Option<String>,
    /// End-user identifier, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Host session this event belongs to.
    pub session_id: SessionId,
    /// Submission correlation id, if the event belongs to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

impl EventContext {
    /// Context carrying only the session id.
    #[must_use]
    pub fn for_session(session_id: SessionId) -> Self {
        Self {
            session_id,
            ..Self::default()
        }
    }

    /// Attach a submission correlation id.
    #[must_use]
    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Attach an MCP namespace.
    #[must_use]
    pub fn with_mcp(mut self, mcp_name: impl Into<String>) -> Self {
        self.mcp_name = Some(mcp_name.into());
        self
    }

    /// Attach a binding name.
    #[must_use]
    pub fn with_binding(mut self, binding_name: impl Into<String>) -> Self {
        self.binding_name = Some(binding_name.into());
        self
    }
}

/// A single audit event. One JSON object per line on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event was created.
    pub timestamp: Timestamp,
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// How serious it is.
    pub severity: Severity,
    /// Who/what it concerns.
    pub context: EventContext,
    /// Structured payload. Redacted before write.
    pub details: Map<String, Value>,
    /// How the operation ended.
    pub outcome: Outcome,
}

impl AuditEvent {
    /// Create an event stamped now.
    #[must_use]
    pub fn new(kind: EventKind, severity: Severity, outcome: Outcome, context: EventContext) -> Self {
        Self {
            timestamp: Timestamp::now(),
            kind,
            severity,
            context,
            details: Map::new(),
            outcome,
        }
    }

    /// Attach one detail field.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Attach a URL both as a redactable string and as a stable digest.
    ///
    /// The digest lets operators correlate denied requests with the URL
    /// without the log retaining query strings.
    #[must_use]
    pub fn with_url(self, url: &str) -> Self {
        let digest = url_digest(url);
        self.with_detail("url", Value::String(url.to_string()))
            .with_detail("url_hash", Value::String(digest))
    }
}

/// Stable SHA-256 digest of a URL, hex-encoded and truncated to 16 chars.
#[must_use]
pub fn url_digest(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.chars().take(16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event = AuditEvent::new(
            EventKind::NetworkRequestDenied,
            Severity::Warning,
            Outcome::Blocked,
            EventContext::for_session(SessionId::new()),
        )
        .with_url("https://attacker.invalid/x");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "network_request_denied");
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["outcome"], "blocked");
        assert!(json["details"]["url_hash"].is_string());
    }

    #[test]
    fn test_url_digest_stable() {
        let a = url_digest("https://example.com/a?q=1");
        let b = url_digest("https://example.com/a?q=1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, url_digest("https://example.com/b"));
    }
}
