//! Audit configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the audit subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Master switch. When off, `log` is a no-op.
    pub enabled: bool,
    /// Include truncated code snippets in execution events.
    pub include_code_snippets: bool,
    /// Redact sensitive keys and URL query strings before write.
    pub redact_sensitive_data: bool,
    /// Per-file size cap; exceeding it rolls the file over.
    pub max_file_bytes: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_code_snippets: false,
            redact_sensitive_data: true,
            max_file_bytes: 10 * 1024 * 1024,
        }
    }
}
