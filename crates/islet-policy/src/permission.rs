//! Cache of user-granted network permissions.
//!
//! Only grants are cached: "Allow Once" for one hour, "Allow Always" for
//! the process lifetime. Denials are never cached, so a later request for
//! the same URL asks again. Expired entries are treated as absent and
//! cleaned up on access.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long an "Allow Once" grant stays valid.
const ONCE_VALIDITY: Duration = Duration::hours(1);

/// A cached permission for one exact URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPermission {
    /// The exact URL the grant applies to.
    pub url: String,
    /// Hostname extracted at grant time.
    pub hostname: String,
    /// Always `true` for cached entries; denials are not cached.
    pub approved: bool,
    /// When the grant was made.
    pub granted_at: DateTime<Utc>,
    /// Absent ⇒ valid for the process lifetime.
    pub expires_at: Option<DateTime<Utc>>,
}

impl NetworkPermission {
    /// Whether the grant is still valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.expires_at.is_none_or(|at| Utc::now() < at)
    }
}

/// Thread-safe permission cache, keyed by exact URL.
#[derive(Debug, Default)]
pub struct PermissionCache {
    grants: RwLock<HashMap<String, NetworkPermission>>,
}

impl PermissionCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an "Allow Once" grant (valid for one hour).
    #[allow(clippy::arithmetic_side_effects)]
    pub fn grant_once(&self, url: &str, hostname: &str) {
        self.insert(url, hostname, Some(Utc::now() + ONCE_VALIDITY));
    }

    /// Record an "Allow Always" grant (valid for the process lifetime).
    pub fn grant_always(&self, url: &str, hostname: &str) {
        self.insert(url, hostname, None);
    }

    /// Whether a valid grant exists for this exact URL.
    ///
    /// Expired entries are removed as a side effect.
    #[must_use]
    pub fn is_granted(&self, url: &str) -> bool {
        let mut grants = self.grants.write().unwrap_or_else(|e| {
            tracing::warn!("permission cache lock poisoned, recovering");
            e.into_inner()
        });
        grants.retain(|_, p| p.is_valid());
        grants.get(url).is_some_and(|p| p.approved)
    }

    /// Drop a grant, returning whether one existed.
    pub fn revoke(&self, url: &str) -> bool {
        let mut grants = self.grants.write().unwrap_or_else(|e| {
            tracing::warn!("permission cache lock poisoned, recovering");
            e.into_inner()
        });
        grants.remove(url).is_some()
    }

    /// Number of currently valid grants.
    #[must_use]
    pub fn len(&self) -> usize {
        let grants = self.grants.read().unwrap_or_else(|e| e.into_inner());
        grants.values().filter(|p| p.is_valid()).count()
    }

    /// Whether no valid grants exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, url: &str, hostname: &str, expires_at: Option<DateTime<Utc>>) {
        let mut grants = self.grants.write().unwrap_or_else(|e| {
            tracing::warn!("permission cache lock poisoned, recovering");
            e.into_inner()
        });
        grants.insert(
            url.to_string(),
            NetworkPermission {
                url: url.to_string(),
                hostname: hostname.to_string(),
                approved: true,
                granted_at: Utc::now(),
                expires_at,
            },
        );
    }
}
