//! Analysis result types.

use islet_core::RiskLevel;
use serde::{Deserialize, Serialize};

/// Numeric identifiers for the structural rules.
pub mod rules {
    /// Prototype-chain mutation (`__proto__`, `prototype`,
    /// `setPrototypeOf`).
    pub const PROTOTYPE_MUTATION: u32 = 1;
    /// Reflective constructor access (`fn.constructor`).
    pub const REFLECTIVE_CONSTRUCTOR: u32 = 2;
    /// Process-global handles (`process.*`).
    pub const PROCESS_GLOBAL: u32 = 3;
    /// Module loading (`import`, `require`).
    pub const MODULE_LOADING: u32 = 4;
    /// Dynamic code execution (`eval`, `new Function`).
    pub const DYNAMIC_CODE: u32 = 5;
    /// Raw child-process, filesystem, or network API references.
    pub const RAW_IO: u32 = 6;
    /// The source failed to parse.
    pub const SYNTAX: u32 = 7;
    /// The semantic pass rejected the source.
    pub const SEMANTIC: u32 = 8;
}

/// Severity of a rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Noted but not blocking.
    Warning,
    /// Blocks execution.
    Critical,
}

/// Source location, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// 1-based line.
    pub line: u32,
    /// 1-based column (byte offset within the line).
    pub column: u32,
}

/// One rule violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Numeric rule id (see [`rules`]).
    pub rule_id: u32,
    /// Severity; `Critical` mandates rejection.
    pub severity: ViolationSeverity,
    /// Human-readable description.
    pub description: String,
    /// Where in the source, when an AST offset exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// What the submission intends to do, judged from its call shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    /// Calls MCP tools.
    ToolCall,
    /// Pure data reshaping.
    DataTransformation,
    /// Fetches over the network.
    NetworkFetch,
    /// Touches the sandboxed filesystem.
    FileIo,
}

/// Call shapes detected during the walk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedPatterns {
    /// MCP namespaces referenced by `ns.op(...)` call shapes.
    pub mcp_calls: Vec<String>,
    /// Number of `fetch(...)` calls.
    pub fetch_calls: usize,
    /// Number of `files.*(...)` calls.
    pub file_calls: usize,
    /// Number of binding-shaped calls that matched no known namespace.
    pub other_member_calls: usize,
}

impl DetectedPatterns {
    /// Total count of external-effect call sites.
    #[must_use]
    pub fn external_effect_count(&self) -> usize {
        self.mcp_calls
            .len()
            .saturating_add(self.fetch_calls)
            .saturating_add(self.file_calls)
    }
}

/// The analyzer's verdict on one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Violations found, in source order.
    pub violations: Vec<Violation>,
    /// Call shapes detected.
    pub detected_patterns: DetectedPatterns,
    /// Intents inferred from the call shapes.
    pub intents: Vec<Intent>,
    /// Combined risk classification.
    pub risk_level: RiskLevel,
}

impl AnalysisResult {
    /// Whether any violation is critical.
    #[must_use]
    pub fn has_critical(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == ViolationSeverity::Critical)
    }

    /// Whether the submission must be rejected: a critical violation or
    /// critical risk.
    #[must_use]
    pub fn must_reject(&self) -> bool {
        self.has_critical() || self.risk_level >= RiskLevel::Critical
    }

    /// A short human-readable rejection reason listing the rule ids.
    #[must_use]
    pub fn rejection_reason(&self) -> String {
        let critical: Vec<&Violation> = self
            .violations
            .iter()
            .filter(|v| v.severity == ViolationSeverity::Critical)
            .collect();
        if critical.is_empty() {
            return format!("risk level {} exceeds the execution threshold", self.risk_level);
        }
        let mut ids: Vec<u32> = critical.iter().map(|v| v.rule_id).collect();
        ids.sort_unstable();
        ids.dedup();
        let descriptions: Vec<&str> = critical
            .iter()
            .take(3)
            .map(|v| v.description.as_str())
            .collect();
        format!(
            "rejected by rules {:?}: {}",
            ids,
            descriptions.join("; ")
        )
    }
}
