//! Regex-level pre-check.
//!
//! A cheap textual screen run at the worker boundary before code reaches
//! an interpreter. Advisory only: it can be fooled by string tricks in
//! both directions, so it must never be the sole gate — the AST pass in
//! [`analyze`](crate::analyze) is authoritative and always runs on the
//! host.

use std::sync::OnceLock;

use regex::Regex;

use crate::result::{rules, Violation, ViolationSeverity};

/// Textual patterns paired with the rule they approximate.
const PATTERNS: &[(u32, &str, &str)] = &[
    (
        rules::PROTOTYPE_MUTATION,
        r"__proto__|setPrototypeOf|\bprototype\b",
        "prototype chain manipulation",
    ),
    (
        rules::REFLECTIVE_CONSTRUCTOR,
        r"\.constructor\s*\(",
        "reflective constructor invocation",
    ),
    (
        rules::PROCESS_GLOBAL,
        r"\bprocess\s*\.",
        "process global access",
    ),
    (
        rules::MODULE_LOADING,
        r"\brequire\s*\(|\bimport\s*\(|^\s*import\s",
        "module loading",
    ),
    (
        rules::DYNAMIC_CODE,
        r"\beval\s*\(|new\s+Function\b",
        "dynamic code execution",
    ),
    (
        rules::RAW_IO,
        r"\bchild_process\b|\bfs\s*\.\s*(read|write|unlink|rm)",
        "raw I/O access",
    ),
];

/// Screen code textually. Returns advisory violations (no locations).
#[must_use]
pub fn precheck(code: &str) -> Vec<Violation> {
    static COMPILED: OnceLock<Vec<(u32, Regex, &'static str)>> = OnceLock::new();
    let compiled = COMPILED.get_or_init(|| {
        PATTERNS
            .iter()
            .filter_map(|(rule, pattern, description)| {
                Regex::new(pattern).ok().map(|re| (*rule, re, *description))
            })
            .collect()
    });

    compiled
        .iter()
        .filter(|(_, re, _)| re.is_match(code))
        .map(|(rule_id, _, description)| Violation {
            rule_id: *rule_id,
            severity: ViolationSeverity::Warning,
            description: format!("pre-check match: {description}"),
            location: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code_passes() {
        assert!(precheck("const x = 1 + 2;").is_empty());
    }

    #[test]
    fn test_proto_flagged() {
        let hits = precheck("a.__proto__.x = 1");
        assert!(hits.iter().any(|v| v.rule_id == rules::PROTOTYPE_MUTATION));
    }

    #[test]
    fn test_precheck_is_advisory_severity() {
        let hits = precheck("eval('1')");
        assert!(hits
            .iter()
            .all(|v| v.severity == ViolationSeverity::Warning));
    }

    #[test]
    fn test_require_flagged() {
        let hits = precheck(r#"const x = require("fs")"#);
        assert!(hits.iter().any(|v| v.rule_id == rules::MODULE_LOADING));
    }
}
