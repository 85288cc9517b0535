//! The binding registry: the only place credentials meet clients.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use islet_audit::{AuditEvent, AuditLog, EventContext, EventKind, Outcome, Severity};
use islet_policy::NetworkPolicy;
use islet_vault::{Credential, CredentialVault};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::binding::{AuthFactory, Binding, BindingClient, BindingKind};
use crate::error::{BindingError, BindingResult};

/// Snapshot of a binding as shown to the isolate: name and methods only.
#[derive(Debug, Clone, Serialize)]
pub struct BindingDescriptor {
    /// Binding name.
    pub name: String,
    /// What kind of client it wraps.
    pub kind: BindingKind,
    /// Callable methods.
    pub methods: Vec<String>,
}

/// Process-wide registry of bindings and their authenticated clients.
///
/// Reads are concurrent; mutation is serialized through the write lock.
pub struct BindingRegistry {
    vault: Arc<CredentialVault>,
    audit: AuditLog,
    context: EventContext,
    bindings: RwLock<HashMap<String, Binding>>,
    clients: RwLock<HashMap<String, Arc<dyn BindingClient>>>,
}

impl BindingRegistry {
    /// Create a registry over a credential vault.
    #[must_use]
    pub fn new(vault: Arc<CredentialVault>, audit: AuditLog, context: EventContext) -> Self {
        Self {
            vault,
            audit,
            context,
            bindings: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Store a credential for later authentication.
    ///
    /// # Errors
    ///
    /// Fails if the vault cannot persist the credential.
    pub async fn register_credential(&self, credential: Credential) -> BindingResult<()> {
        self.vault.store(credential).await?;
        Ok(())
    }

    /// Register (or replace) a binding definition.
    pub fn create_binding(&self, binding: Binding) {
        debug!(name = %binding.name, "registering binding");
        let mut bindings = write_lock(&self.bindings);
        bindings.insert(binding.name.clone(), binding);
    }

    /// Authenticate a binding: fetch its credential from the vault and
    /// run the factory to obtain an opaque client handle.
    ///
    /// The factory borrows the credential; nothing secret is retained
    /// outside the vault and the client's own connection state.
    ///
    /// # Errors
    ///
    /// Fails when the binding or its credential is missing, or when the
    /// factory fails.
    pub async fn authenticate(&self, name: &str, factory: AuthFactory) -> BindingResult<()> {
        {
            let bindings = read_lock(&self.bindings);
            if !bindings.contains_key(name) {
                return Err(BindingError::UnknownBinding {
                    name: name.to_string(),
                });
            }
        }
        let credential =
            self.vault
                .retrieve(name)
                .await
                .ok_or_else(|| BindingError::MissingCredential {
                    name: name.to_string(),
                })?;

        let client = factory(&credential)?;
        let mut clients = write_lock(&self.clients);
        clients.insert(name.to_string(), client);
        Ok(())
    }

    /// Execute a method on an authenticated binding.
    ///
    /// Refuses when no authenticated client exists, when the method is
    /// outside the binding's method set, or when the client does not
    /// expose it. Successful access is audited as `binding_accessed`.
    ///
    /// # Errors
    ///
    /// See [`BindingError`].
    pub async fn execute(&self, name: &str, method: &str, args: Value) -> BindingResult<Value> {
        let binding = {
            let bindings = read_lock(&self.bindings);
            bindings
                .get(name)
                .cloned()
                .ok_or_else(|| BindingError::UnknownBinding {
                    name: name.to_string(),
                })?
        };

        if !binding.allows_method(method) {
            self.audit_access(name, method, Outcome::Blocked);
            return Err(BindingError::MethodNotAllowed {
                name: name.to_string(),
                method: method.to_string(),
            });
        }

        let client = {
            let clients = read_lock(&self.clients);
            clients
                .get(name)
                .cloned()
                .ok_or_else(|| BindingError::NotAuthenticated {
                    name: name.to_string(),
                })?
        };

        if !client.exposes(method) {
            self.audit_access(name, method, Outcome::Blocked);
            return Err(BindingError::MethodNotExposed {
                name: name.to_string(),
                method: method.to_string(),
            });
        }

        let result = client.call(method, args).await;
        self.audit_access(
            name,
            method,
            if result.is_ok() {
                Outcome::Success
            } else {
                Outcome::Failure
            },
        );
        result
    }

    /// Remove a binding and its client, if any.
    pub fn remove_binding(&self, name: &str) -> bool {
        let mut clients = write_lock(&self.clients);
        clients.remove(name);
        let mut bindings = write_lock(&self.bindings);
        bindings.remove(name).is_some()
    }

    /// Snapshot of every binding, names and methods only. This is what
    /// crosses to the isolate.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BindingDescriptor> {
        let bindings = read_lock(&self.bindings);
        let mut list: Vec<BindingDescriptor> = bindings
            .values()
            .map(|b| BindingDescriptor {
                name: b.name.clone(),
                kind: b.kind,
                methods: b.methods.clone(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// The effective network policy for a binding: its override merged
    /// over the global policy.
    #[must_use]
    pub fn policy_for(&self, name: &str, global: &NetworkPolicy) -> NetworkPolicy {
        let bindings = read_lock(&self.bindings);
        match bindings.get(name).and_then(|b| b.network_policy_override.as_ref()) {
            Some(over) => global.merged_with(over),
            None => global.clone(),
        }
    }

    fn audit_access(&self, name: &str, method: &str, outcome: Outcome) {
        self.audit.log(
            AuditEvent::new(
                EventKind::BindingAccessed,
                Severity::Info,
                outcome,
                self.context.clone().with_binding(name),
            )
            .with_detail("binding", name.into())
            .with_detail("method", method.into()),
        );
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| {
        tracing::warn!("binding registry lock poisoned, recovering");
        e.into_inner()
    })
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| {
        tracing::warn!("binding registry lock poisoned, recovering");
        e.into_inner()
    })
}
