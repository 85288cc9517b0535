//! Binding descriptors and the client seam.
//!
//! A binding names a trusted client and the methods untrusted code may
//! call on it. It carries no secrets; the credentialed client handle
//! lives in the registry and never crosses the trust boundary.

use async_trait::async_trait;
use islet_policy::PolicyOverride;
use islet_vault::Credential;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BindingResult;

/// What kind of client a binding wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingKind {
    /// A plain HTTP API client.
    Http,
    /// A vendor SDK wrapper.
    Sdk,
    /// A database client.
    Database,
    /// Anything else.
    Custom,
    /// A client that talks to the local network.
    LocalNetwork,
}

/// A named, method-scoped binding. No secrets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    /// Name untrusted code addresses the binding by.
    pub name: String,
    /// What kind of client it wraps.
    pub kind: BindingKind,
    /// Methods untrusted code may call, in declaration order.
    pub methods: Vec<String>,
    /// Per-binding network policy override, merged over the global
    /// policy when the client goes on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_policy_override: Option<PolicyOverride>,
}

impl Binding {
    /// Create a binding.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: BindingKind,
        methods: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut seen = std::collections::HashSet::new();
        let methods = methods
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| seen.insert(m.clone()))
            .collect();
        Self {
            name: name.into(),
            kind,
            methods,
            network_policy_override: None,
        }
    }

    /// Attach a network policy override.
    #[must_use]
    pub fn with_policy_override(mut self, over: PolicyOverride) -> Self {
        self.network_policy_override = Some(over);
        self
    }

    /// Whether the method is in this binding's method set.
    #[must_use]
    pub fn allows_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m == method)
    }
}

/// An authenticated, opaque client handle held by the registry.
///
/// Implementations are produced by an [`AuthFactory`] that borrows the
/// credential; the handle itself must not retain secret material in any
/// form it would serialize or log.
#[async_trait]
pub trait BindingClient: Send + Sync {
    /// Whether the client exposes this method.
    fn exposes(&self, method: &str) -> bool;

    /// Invoke a method. Arguments and result are JSON values; anything
    /// that cannot be represented as JSON is a programming error
    /// surfaced as [`NotSerializable`](crate::BindingError::NotSerializable).
    async fn call(&self, method: &str, args: Value) -> BindingResult<Value>;
}

/// Factory that turns a borrowed credential into an authenticated
/// client handle.
pub type AuthFactory =
    Box<dyn FnOnce(&Credential) -> BindingResult<std::sync::Arc<dyn BindingClient>> + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_set_deduplicates() {
        let binding = Binding::new(
            "github",
            BindingKind::Http,
            ["createIssue", "getIssue", "createIssue"],
        );
        assert_eq!(binding.methods.len(), 2);
        assert!(binding.allows_method("createIssue"));
        assert!(!binding.allows_method("deleteRepo"));
    }

    #[test]
    fn test_binding_serializes_without_secrets() {
        let binding = Binding::new("jira", BindingKind::Sdk, ["search"]);
        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(json["kind"], "sdk");
        assert!(json.get("network_policy_override").is_none());
    }
}
