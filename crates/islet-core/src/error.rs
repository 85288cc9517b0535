//! The cross-crate error taxonomy.
//!
//! Every failure that crosses a subsystem boundary is classified by
//! [`ErrorKind`]; the wire-level form is [`ErrorRecord`]. Per-crate error
//! enums map onto this taxonomy via a `kind()` accessor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a failure, by behavior rather than by type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Static analysis rejected the submission. Terminal.
    Validation,
    /// A path resolution escaped the workspace. Terminal for the call.
    SandboxEscape,
    /// A network, binding, or tool request was refused by policy or user.
    PolicyDenied,
    /// A submission-wide or per-call deadline elapsed.
    Timeout,
    /// A memory or size cap was hit. Terminal.
    ResourceExhaustion,
    /// The isolate crashed, exited abnormally, or broke protocol. Terminal.
    Broker,
    /// A tool, binding, or network call produced an error downstream.
    Downstream,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::SandboxEscape => write!(f, "sandbox_escape"),
            Self::PolicyDenied => write!(f, "policy_denied"),
            Self::Timeout => write!(f, "timeout"),
            Self::ResourceExhaustion => write!(f, "resource_exhaustion"),
            Self::Broker => write!(f, "broker"),
            Self::Downstream => write!(f, "downstream"),
        }
    }
}

impl ErrorKind {
    /// Whether this kind ends the whole submission rather than one call.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Validation | Self::Timeout | Self::ResourceExhaustion | Self::Broker
        )
    }
}

/// Structured error as it appears in results and broker messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Human-readable message.
    pub message: String,
    /// Behavioral classification.
    pub kind: ErrorKind,
    /// Originating source, when the failure came from downstream
    /// (qualified tool name, binding name, or URL host).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Additional structured context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorRecord {
    /// Create an error record.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
            details: None,
        }
    }

    /// Attach the originating source name.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{} ({}, from {})", self.message, self.kind, source),
            None => write!(f, "{} ({})", self.message, self.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kinds() {
        assert!(ErrorKind::Validation.is_terminal());
        assert!(ErrorKind::Broker.is_terminal());
        assert!(!ErrorKind::PolicyDenied.is_terminal());
        assert!(!ErrorKind::SandboxEscape.is_terminal());
        assert!(!ErrorKind::Downstream.is_terminal());
    }

    #[test]
    fn test_record_wire_format() {
        let record = ErrorRecord::new(ErrorKind::PolicyDenied, "blocked by policy")
            .with_source("attacker.invalid");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "policy_denied");
        assert_eq!(json["source"], "attacker.invalid");
        assert!(json.get("details").is_none());
    }
}
