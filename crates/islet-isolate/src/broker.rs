//! The trusted-side service seam and the per-call deadline wrapper.
//!
//! The engine never touches tools, bindings, the network, or the
//! filesystem directly; it calls [`HostServices`]. The runtime supplies
//! the implementation wired to the real registries. Every call carries
//! its own 30-second deadline, independent of the submission deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use islet_core::{ErrorKind, ErrorRecord};
use serde_json::Value;

use crate::protocol::{FsOperation, IsolateMessage};

/// Per-call deadline for tool, binding, network, and fs requests.
pub const CALL_DEADLINE: Duration = Duration::from_secs(30);

/// Trusted-side services the engine may invoke.
///
/// All values are JSON copies; failures are [`ErrorRecord`]s that
/// surface to untrusted code as catchable errors.
#[async_trait]
pub trait HostServices: Send + Sync {
    /// Invoke an MCP tool.
    async fn tool_call(&self, qualified_name: &str, params: Value) -> Result<Value, ErrorRecord>;

    /// Invoke a binding method.
    async fn binding_call(
        &self,
        binding: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, ErrorRecord>;

    /// Perform a policy-mediated network request. Returns the response
    /// as a JSON object `{status, status_text, headers, body}`.
    async fn network_call(
        &self,
        url: &str,
        method: &str,
        headers: Option<std::collections::BTreeMap<String, String>>,
        body: Option<String>,
    ) -> Result<Value, ErrorRecord>;

    /// Perform a sandboxed filesystem operation.
    async fn fs_call(&self, operation: FsOperation) -> Result<Value, ErrorRecord>;

    /// Record a log line emitted by untrusted code.
    fn log(&self, line: String);

    /// Record a blocked runtime construct (audited by the host).
    fn security_violation(&self, description: String);
}

/// Wraps a [`HostServices`] with the per-call deadline.
pub struct DeadlineServices<S> {
    inner: S,
    deadline: Duration,
}

impl<S> DeadlineServices<S> {
    /// Wrap services with the default 30-second per-call deadline.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            deadline: CALL_DEADLINE,
        }
    }

    /// Wrap services with an explicit deadline (tests).
    #[must_use]
    pub fn with_deadline(inner: S, deadline: Duration) -> Self {
        Self { inner, deadline }
    }

    async fn bound<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T, ErrorRecord>> + Send,
    ) -> Result<T, ErrorRecord> {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(ErrorRecord::new(
                ErrorKind::Timeout,
                format!("{what} exceeded the {}s per-call deadline", self.deadline.as_secs()),
            )),
        }
    }
}

#[async_trait]
impl<S: HostServices> HostServices for DeadlineServices<S> {
    async fn tool_call(&self, qualified_name: &str, params: Value) -> Result<Value, ErrorRecord> {
        self.bound("tool call", self.inner.tool_call(qualified_name, params))
            .await
    }

    async fn binding_call(
        &self,
        binding: &str,
        method: &str,
        args: Value,
    ) -> Result<Value, ErrorRecord> {
        self.bound("binding call", self.inner.binding_call(binding, method, args))
            .await
    }

    async fn network_call(
        &self,
        url: &str,
        method: &str,
        headers: Option<std::collections::BTreeMap<String, String>>,
        body: Option<String>,
    ) -> Result<Value, ErrorRecord> {
        self.bound(
            "network call",
            self.inner.network_call(url, method, headers, body),
        )
        .await
    }

    async fn fs_call(&self, operation: FsOperation) -> Result<Value, ErrorRecord> {
        self.bound("fs call", self.inner.fs_call(operation)).await
    }

    fn log(&self, line: String) {
        self.inner.log(line);
    }

    fn security_violation(&self, description: String) {
        self.inner.security_violation(description);
    }
}

/// Dispatch one isolate request message against the services.
///
/// Returns `None` for messages that are not requests (logs, terminals).
pub async fn dispatch_request(
    services: &Arc<dyn HostServices>,
    message: IsolateMessage,
) -> Option<(u64, Result<Value, ErrorRecord>)> {
    match message {
        IsolateMessage::ToolCall {
            id,
            qualified_name,
            params,
        } => Some((id, services.tool_call(&qualified_name, params).await)),
        IsolateMessage::BindingCall {
            id,
            binding,
            method,
            args,
        } => Some((id, services.binding_call(&binding, &method, args).await)),
        IsolateMessage::NetworkCall {
            id,
            url,
            method,
            headers,
            body,
        } => Some((id, services.network_call(&url, &method, headers, body).await)),
        IsolateMessage::FsCall { id, operation } => {
            Some((id, services.fs_call(operation).await))
        },
        IsolateMessage::Log { line } => {
            services.log(line);
            None
        },
        IsolateMessage::SecurityViolation { description } => {
            services.security_violation(description);
            None
        },
        IsolateMessage::Result { .. } | IsolateMessage::Error { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowServices;

    #[async_trait]
    impl HostServices for SlowServices {
        async fn tool_call(&self, _: &str, _: Value) -> Result<Value, ErrorRecord> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
        async fn binding_call(&self, _: &str, _: &str, _: Value) -> Result<Value, ErrorRecord> {
            Ok(Value::Null)
        }
        async fn network_call(
            &self,
            _: &str,
            _: &str,
            _: Option<std::collections::BTreeMap<String, String>>,
            _: Option<String>,
        ) -> Result<Value, ErrorRecord> {
            Ok(Value::Null)
        }
        async fn fs_call(&self, _: FsOperation) -> Result<Value, ErrorRecord> {
            Ok(Value::Null)
        }
        fn log(&self, _: String) {}
        fn security_violation(&self, _: String) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_call_deadline() {
        let services = DeadlineServices::with_deadline(SlowServices, Duration::from_millis(50));
        let err = services
            .tool_call("ns:op", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }
}
