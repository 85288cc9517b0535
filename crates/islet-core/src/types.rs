//! Shared identifiers and wire-level types used across the subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ErrorRecord;

/// Identifier for one host process session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generate a fresh session id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id attached to one submission and every event it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    /// Generate a fresh correlation id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UTC timestamp newtype with serde support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// ISO-8601 rendering (the audit wire format).
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

/// Risk classification for a submission or action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Pure computation, no external effects.
    Low,
    /// Mediated external effects (tool calls, sanctioned fetches).
    Medium,
    /// Many external effects or sensitive namespaces.
    High,
    /// Must not execute.
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A tool name qualified by its MCP namespace.
///
/// Both `namespace:tool` and `namespace.tool` spellings are accepted on
/// input; the canonical form uses `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedToolName {
    /// MCP namespace (server name).
    pub namespace: String,
    /// Tool name within the namespace.
    pub tool: String,
}

impl QualifiedToolName {
    /// Parse a qualified name. Returns `None` when no separator is present.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let (namespace, tool) = name.split_once(':').or_else(|| name.split_once('.'))?;
        if namespace.is_empty() || tool.is_empty() {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            tool: tool.to_string(),
        })
    }

    /// Canonical `namespace:tool` rendering.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}:{}", self.namespace, self.tool)
    }
}

impl std::fmt::Display for QualifiedToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.tool)
    }
}

/// Descriptor for one registered tool, as provided by the tool registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Qualified `namespace:tool` name.
    pub qualified_name: QualifiedToolName,
    /// Human-readable description.
    pub description: Option<String>,
    /// JSON Schema for input parameters.
    pub input_schema: Value,
}

impl ToolDescriptor {
    /// Create a descriptor with an open input schema.
    #[must_use]
    pub fn new(namespace: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            qualified_name: QualifiedToolName {
                namespace: namespace.into(),
                tool: tool.into(),
            },
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// One log line emitted by untrusted code, in emission order.
pub type LogLine = String;

/// The result of executing one submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Value produced by the submission, when it completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Log lines in emission order.
    pub logs: Vec<LogLine>,
    /// Terminal error, when the submission failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl ExecutionResult {
    /// A successful result carrying a value.
    #[must_use]
    pub fn success(value: Option<Value>, logs: Vec<LogLine>) -> Self {
        Self {
            value,
            logs,
            error: None,
        }
    }

    /// A failed result carrying an error record.
    #[must_use]
    pub fn failure(error: ErrorRecord, logs: Vec<LogLine>) -> Self {
        Self {
            value: None,
            logs,
            error: Some(error),
        }
    }

    /// Whether the submission completed without a terminal error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
