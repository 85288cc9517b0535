//! The approval store: which packages may be imported, and for how long.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::scan::extract_packages;

/// Packages that are always approved.
const BUILTIN_ALLOWLIST: &[&str] = &[
    "lodash",
    "date-fns",
    "uuid",
    "zod",
    "yaml",
    "csv-parse",
    "papaparse",
];

/// Packages (and node built-ins) that are never approvable: they carry
/// raw process, filesystem, or network capability.
const BUILTIN_BLOCKLIST: &[&str] = &[
    "child_process",
    "fs",
    "net",
    "http",
    "https",
    "dgram",
    "tls",
    "os",
    "process",
    "vm",
    "worker_threads",
    "cluster",
];

/// How long an approval lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalScope {
    /// This submission only. Cleared after execution; also carries a
    /// one-minute expiry as a secondary guard.
    Operation,
    /// For the process lifetime.
    Session,
    /// For one hour.
    Hour,
    /// For one day.
    Day,
}

impl ApprovalScope {
    #[allow(clippy::arithmetic_side_effects)]
    fn expiry_from(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Operation => Some(now + Duration::minutes(1)),
            Self::Session => None,
            Self::Hour => Some(now + Duration::hours(1)),
            Self::Day => Some(now + Duration::days(1)),
        }
    }
}

impl std::fmt::Display for ApprovalScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operation => write!(f, "operation"),
            Self::Session => write!(f, "session"),
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}

#[derive(Debug, Clone)]
struct Approval {
    scope: ApprovalScope,
    expires_at: Option<DateTime<Utc>>,
}

impl Approval {
    fn is_valid(&self) -> bool {
        self.expires_at.is_none_or(|at| Utc::now() < at)
    }
}

/// Buckets for the packages a submission references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageAnalysis {
    /// Always approved (built-in allowlist or an active approval).
    pub whitelisted: Vec<String>,
    /// Neither allowed nor blocked; needs a user decision.
    pub needs_approval: Vec<String>,
    /// Never approvable.
    pub blocked: Vec<String>,
}

impl PackageAnalysis {
    /// Whether the submission can proceed without any decision.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        self.needs_approval.is_empty() && self.blocked.is_empty()
    }
}

/// Thread-safe store of package approvals.
#[derive(Debug, Default)]
pub struct ApprovalStore {
    approvals: RwLock<HashMap<String, Approval>>,
}

impl ApprovalStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket every package the code references.
    #[must_use]
    pub fn analyze(&self, code: &str) -> PackageAnalysis {
        let mut analysis = PackageAnalysis::default();
        for package in extract_packages(code) {
            if BUILTIN_BLOCKLIST.contains(&package.as_str()) {
                analysis.blocked.push(package);
            } else if BUILTIN_ALLOWLIST.contains(&package.as_str()) || self.is_approved(&package) {
                analysis.whitelisted.push(package);
            } else {
                analysis.needs_approval.push(package);
            }
        }
        analysis
    }

    /// Approve a package for a scope. Blocklisted packages are refused.
    ///
    /// Returns whether the approval was recorded.
    pub fn approve(&self, package: &str, scope: ApprovalScope) -> bool {
        if BUILTIN_BLOCKLIST.contains(&package) {
            tracing::warn!(%package, "refusing to approve blocklisted package");
            return false;
        }
        let mut approvals = self.lock_write();
        approvals.insert(
            package.to_string(),
            Approval {
                scope,
                expires_at: scope.expiry_from(Utc::now()),
            },
        );
        true
    }

    /// Whether a package is currently approved.
    ///
    /// Built-in allowlist entries are always approved; blocklist entries
    /// never are. Expired approvals are cleaned up as a side effect.
    #[must_use]
    pub fn is_approved(&self, package: &str) -> bool {
        if BUILTIN_BLOCKLIST.contains(&package) {
            return false;
        }
        if BUILTIN_ALLOWLIST.contains(&package) {
            return true;
        }
        let mut approvals = self.lock_write();
        approvals.retain(|_, a| a.is_valid());
        approvals.contains_key(package)
    }

    /// Drop every operation-scoped approval. Called after each
    /// submission completes.
    pub fn clear_operation_approvals(&self) {
        let mut approvals = self.lock_write();
        approvals.retain(|_, a| a.scope != ApprovalScope::Operation);
    }

    /// Number of live approvals.
    #[must_use]
    pub fn len(&self) -> usize {
        let approvals = self.approvals.read().unwrap_or_else(|e| e.into_inner());
        approvals.values().filter(|a| a.is_valid()).count()
    }

    /// Whether no live approvals exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Approval>> {
        self.approvals.write().unwrap_or_else(|e| {
            tracing::warn!("approval store lock poisoned, recovering");
            e.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_allowlist_always_approved() {
        let store = ApprovalStore::new();
        assert!(store.is_approved("lodash"));
        assert!(store.is_approved("uuid"));
    }

    #[test]
    fn test_blocklist_never_approvable() {
        let store = ApprovalStore::new();
        assert!(!store.is_approved("child_process"));
        assert!(!store.approve("child_process", ApprovalScope::Session));
        assert!(!store.is_approved("child_process"));
    }

    #[test]
    fn test_analyze_buckets() {
        let store = ApprovalStore::new();
        store.approve("axios", ApprovalScope::Session);
        let code = r#"
            const _ = require("lodash");
            const axios = require("axios");
            const cp = require("child_process");
            const left = require("left-pad");
        "#;
        let analysis = store.analyze(code);
        assert_eq!(analysis.whitelisted, vec!["lodash", "axios"]);
        assert_eq!(analysis.blocked, vec!["child_process"]);
        assert_eq!(analysis.needs_approval, vec!["left-pad"]);
        assert!(!analysis.is_clear());
    }

    #[test]
    fn test_operation_approvals_cleared_after_execution() {
        let store = ApprovalStore::new();
        store.approve("left-pad", ApprovalScope::Operation);
        assert!(store.is_approved("left-pad"));

        store.clear_operation_approvals();
        assert!(!store.is_approved("left-pad"));
    }

    #[test]
    fn test_session_approvals_survive_clearing() {
        let store = ApprovalStore::new();
        store.approve("axios", ApprovalScope::Session);
        store.clear_operation_approvals();
        assert!(store.is_approved("axios"));
    }

    #[test]
    fn test_clean_code_is_clear() {
        let store = ApprovalStore::new();
        let analysis = store.analyze("const x = 1 + 2;");
        assert!(analysis.is_clear());
        assert!(analysis.whitelisted.is_empty());
    }
}
