//! The broker wire protocol.
//!
//! Message-typed, correlation-id matched, asynchronous. The isolate
//! initiates `tool_call` / `binding_call` / `network_call` / `fs_call`
//! requests; the host answers each with exactly one `response` matched
//! by id. `log` lines stream in emission order. A terminal `result` or
//! `error` ends the transaction. Everything crossing the boundary is a
//! message copy — no shared state, no secrets.

use std::collections::BTreeMap;

use islet_core::{ErrorRecord, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Engine resource limits shipped with the job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineLimits {
    /// Evaluation steps before the engine aborts with resource
    /// exhaustion.
    pub instruction_budget: u64,
    /// Approximate values the engine may allocate.
    pub value_budget: u64,
    /// Maximum call depth.
    pub max_call_depth: u32,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            instruction_budget: 2_000_000,
            value_budget: 500_000,
            max_call_depth: 64,
        }
    }
}

/// A binding as the isolate sees it: name and methods, nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingSurface {
    /// Name untrusted code addresses the binding by.
    pub name: String,
    /// Callable methods.
    pub methods: Vec<String>,
}

/// A filesystem operation requested by untrusted code. Paths are
/// workspace-relative as presented; confinement happens on the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FsOperation {
    /// Read a file as text.
    Read {
        /// Path within the workspace.
        path: String,
    },
    /// Write text, creating parents.
    Write {
        /// Path within the workspace.
        path: String,
        /// Contents to write.
        contents: String,
    },
    /// Append text, creating the file as needed.
    Append {
        /// Path within the workspace.
        path: String,
        /// Contents to append.
        contents: String,
    },
    /// List a directory.
    List {
        /// Path within the workspace.
        path: String,
    },
    /// Delete a file or empty directory.
    Remove {
        /// Path within the workspace.
        path: String,
    },
    /// Rename within the workspace.
    Rename {
        /// Source path.
        from: String,
        /// Destination path.
        to: String,
    },
    /// Copy within the workspace.
    Copy {
        /// Source path.
        from: String,
        /// Destination path.
        to: String,
    },
    /// Whether a path exists.
    Exists {
        /// Path within the workspace.
        path: String,
    },
    /// Stat a path.
    Stat {
        /// Path within the workspace.
        path: String,
    },
}

/// Messages from the isolate to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IsolateMessage {
    /// Invoke an MCP tool.
    ToolCall {
        /// Correlation id.
        id: u64,
        /// Qualified `namespace:tool` name.
        qualified_name: String,
        /// Tool parameters.
        params: Value,
    },
    /// Invoke a binding method.
    BindingCall {
        /// Correlation id.
        id: u64,
        /// Binding name.
        binding: String,
        /// Method name.
        method: String,
        /// Arguments.
        args: Value,
    },
    /// Perform a policy-mediated network request.
    NetworkCall {
        /// Correlation id.
        id: u64,
        /// Target URL.
        url: String,
        /// HTTP method.
        method: String,
        /// Request headers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<BTreeMap<String, String>>,
        /// Request body.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },
    /// Perform a sandboxed filesystem operation.
    FsCall {
        /// Correlation id.
        id: u64,
        /// The operation.
        #[serde(flatten)]
        operation: FsOperation,
    },
    /// A log line emitted by untrusted code.
    Log {
        /// The line.
        line: String,
    },
    /// The engine blocked a forbidden runtime construct.
    SecurityViolation {
        /// What was blocked.
        description: String,
    },
    /// Terminal: the submission completed.
    Result {
        /// Produced value, if any.
        value: Option<Value>,
        /// Log lines in emission order.
        logs: Vec<String>,
    },
    /// Terminal: the submission failed.
    Error {
        /// The failure.
        error: ErrorRecord,
        /// Log lines in emission order.
        logs: Vec<String>,
    },
}

impl IsolateMessage {
    /// Whether this message ends the transaction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }
}

/// Everything an isolate needs to run one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// The submitted code.
    pub code: String,
    /// Tools the isolate may surface.
    pub tools: Vec<ToolDescriptor>,
    /// Bindings the isolate may surface.
    pub bindings: Vec<BindingSurface>,
    /// Engine resource limits.
    pub limits: EngineLimits,
}

/// Messages from the host to the isolate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// The job: sent exactly once, first.
    Job {
        /// The job payload.
        #[serde(flatten)]
        job: JobSpec,
    },
    /// Answer to one isolate request, matched by id.
    Response {
        /// Correlation id of the request.
        id: u64,
        /// The value, on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        /// The error, on failure.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorRecord>,
    },
    /// Stop immediately; no further responses will arrive.
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_message_wire_shape() {
        let msg = IsolateMessage::ToolCall {
            id: 7,
            qualified_name: "github:create_issue".into(),
            params: serde_json::json!({"title": "x"}),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "tool_call");
        assert_eq!(json["id"], 7);
    }

    #[test]
    fn test_fs_call_flattens_operation() {
        let msg = IsolateMessage::FsCall {
            id: 1,
            operation: FsOperation::Write {
                path: "out.txt".into(),
                contents: "x".into(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "fs_call");
        assert_eq!(json["op"], "write");
        assert_eq!(json["path"], "out.txt");
    }

    #[test]
    fn test_terminal_detection() {
        let result = IsolateMessage::Result {
            value: None,
            logs: vec![],
        };
        assert!(result.is_terminal());
        let log = IsolateMessage::Log { line: "x".into() };
        assert!(!log.is_terminal());
    }

    #[test]
    fn test_response_roundtrip() {
        let msg = HostMessage::Response {
            id: 3,
            value: Some(serde_json::json!(42)),
            error: None,
        };
        let line = serde_json::to_string(&msg).unwrap();
        let back: HostMessage = serde_json::from_str(&line).unwrap();
        match back {
            HostMessage::Response { id, value, .. } => {
                assert_eq!(id, 3);
                assert_eq!(value, Some(serde_json::json!(42)));
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
