//! The trusted half of the broker: [`HostServices`] wired to the real
//! registries and policy engine.

use std::sync::Arc;

use async_trait::async_trait;
use islet_audit::{AuditEvent, AuditLog, EventContext, EventKind, Outcome, Severity};
use islet_bindings::BindingRegistry;
use islet_core::{ErrorRecord, QualifiedToolName};
use islet_isolate::{FsOperation, HostServices};
use islet_policy::{NetworkPolicyEngine, NetworkRequest};
use islet_workspace::{SandboxFs, WorkspaceError};
use serde_json::Value;
use tracing::debug;

use crate::traits::ToolRegistry;

/// Host services for one submission.
pub(crate) struct SubmissionServices {
    pub(crate) registry: Arc<dyn ToolRegistry>,
    pub(crate) bindings: Arc<BindingRegistry>,
    pub(crate) policy: Arc<NetworkPolicyEngine>,
    pub(crate) sandbox: SandboxFs,
    pub(crate) audit: AuditLog,
    pub(crate) context: EventContext,
}

#[async_trait]
impl HostServices for SubmissionServices {
    async fn tool_call(&self, qualified_name: &str, params: Value) -> Result<Value, ErrorRecord> {
        let canonical = QualifiedToolName::parse(qualified_name)
            .map_or_else(|| qualified_name.to_string(), |q| q.canonical());
        self.registry
            .invoke(&canonical, params)
            .await
            .map_err(|record| {
                if record.source.is_some() {
                    record
                } else {
                    record.with_source(canonical.clone())
                }
            })
    }

    async fn binding_call(
        &self,
        binding: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, ErrorRecord> {
        self.bindings
            .execute(binding, method, args)
            .await
            .map_err(|err| {
                ErrorRecord::new(err.kind(), err.to_string()).with_source(binding.to_string())
            })
    }

    async fn network_call(
        &self,
        url: &str,
        method: &str,
        headers: Option<std::collections::BTreeMap<String, String>>,
        body: Option<String>,
    ) -> Result<Value, ErrorRecord> {
        let request = NetworkRequest {
            url: url.to_string(),
            method: method.to_string(),
            headers: headers.unwrap_or_default(),
            body,
        };
        let source = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());

        match self.policy.execute(request, "fetch").await {
            Ok(response) => serde_json::to_value(&response).map_err(|e| {
                ErrorRecord::new(
                    islet_core::ErrorKind::Broker,
                    format!("response serialization: {e}"),
                )
            }),
            Err(err) => Err(ErrorRecord::new(err.kind(), err.to_string()).with_source(source)),
        }
    }

    async fn fs_call(&self, operation: FsOperation) -> Result<Value, ErrorRecord> {
        let result = match operation {
            FsOperation::Read { path } => self
                .sandbox
                .read_to_string(&path)
                .await
                .map(Value::String),
            FsOperation::Write { path, contents } => self
                .sandbox
                .write(&path, contents.as_bytes())
                .await
                .map(|()| Value::Null),
            FsOperation::Append { path, contents } => self
                .sandbox
                .append(&path, contents.as_bytes())
                .await
                .map(|()| Value::Null),
            FsOperation::List { path } => self.sandbox.list(&path).await.and_then(|entries| {
                serde_json::to_value(entries).map_err(|e| WorkspaceError::Io {
                    path: std::path::PathBuf::from(path),
                    source: std::io::Error::other(e),
                })
            }),
            FsOperation::Remove { path } => {
                self.sandbox.remove(&path).await.map(|()| Value::Null)
            },
            FsOperation::Rename { from, to } => {
                self.sandbox.rename(&from, &to).await.map(|()| Value::Null)
            },
            FsOperation::Copy { from, to } => {
                self.sandbox.copy(&from, &to).await.map(Value::from)
            },
            FsOperation::Exists { path } => {
                self.sandbox.exists(&path).await.map(Value::Bool)
            },
            FsOperation::Stat { path } => self.sandbox.stat(&path).await.and_then(|info| {
                serde_json::to_value(info).map_err(|e| WorkspaceError::Io {
                    path: std::path::PathBuf::from(path),
                    source: std::io::Error::other(e),
                })
            }),
        };

        result.map_err(|err| {
            if matches!(err, WorkspaceError::Escape { .. }) {
                self.audit.log(
                    AuditEvent::new(
                        EventKind::SecurityViolation,
                        Severity::Critical,
                        Outcome::Blocked,
                        self.context.clone(),
                    )
                    .with_detail("violation", "sandbox_escape".into())
                    .with_detail("detail", err.to_string().into()),
                );
            }
            ErrorRecord::new(err.kind(), err.to_string())
        })
    }

    fn log(&self, line: String) {
        debug!(target: "islet::submission", %line, "isolate log");
    }

    fn security_violation(&self, description: String) {
        let kind = if description.contains("__proto__")
            || description.contains("prototype")
            || description.contains("constructor")
        {
            EventKind::PrototypePollutionBlocked
        } else {
            EventKind::SecurityViolation
        };
        self.audit.log(
            AuditEvent::new(kind, Severity::Critical, Outcome::Blocked, self.context.clone())
                .with_detail("description", description.into()),
        );
    }
}
