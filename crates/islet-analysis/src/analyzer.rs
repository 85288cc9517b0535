//! The analyzer entry point.
//!
//! Parses the submission with OXC, runs the semantic builder, walks the
//! AST rules, then classifies intent and risk. Deterministic and free of
//! side effects; the same snippet always produces the same result.

use islet_core::RiskLevel;
use oxc::ast_visit::Visit;
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc_allocator::Allocator;

use crate::result::{
    rules, AnalysisResult, DetectedPatterns, Intent, Violation, ViolationSeverity,
};
use crate::walker::RuleWalker;

/// Submissions are analyzed (and later executed) as the body of an async
/// function, so top-level `await` and `return` are both legal.
const WRAPPER_PREFIX: &str = "async () => {\n";
const WRAPPER_SUFFIX: &str = "\n}";

/// External-effect call count beyond which a submission is high risk.
const HIGH_EFFECT_THRESHOLD: usize = 10;

/// Analyze a submission.
///
/// `available_mcps` is the set of namespaces the caller has registered;
/// member calls on those namespaces are classified as tool calls, the
/// rest as binding-shaped calls.
#[must_use]
pub fn analyze(code: &str, available_mcps: &[String]) -> AnalysisResult {
    let wrapped = format!("{WRAPPER_PREFIX}{code}{WRAPPER_SUFFIX}");
    let allocator = Allocator::default();
    let source_type = SourceType::mjs();

    let parse_ret = Parser::new(&allocator, &wrapped, source_type).parse();
    if parse_ret.panicked || !parse_ret.errors.is_empty() {
        let violations = parse_ret
            .errors
            .iter()
            .map(|e| Violation {
                rule_id: rules::SYNTAX,
                severity: ViolationSeverity::Critical,
                description: format!("parse error: {e}"),
                location: None,
            })
            .collect();
        return AnalysisResult {
            violations,
            detected_patterns: DetectedPatterns::default(),
            intents: Vec::new(),
            risk_level: RiskLevel::Critical,
        };
    }
    let program = parse_ret.program;

    // Semantic pass: scope/redeclaration checks the parser alone misses.
    let sem_ret = SemanticBuilder::new().build(&program);
    let mut violations: Vec<Violation> = sem_ret
        .errors
        .iter()
        .map(|e| Violation {
            rule_id: rules::SEMANTIC,
            severity: ViolationSeverity::Critical,
            description: format!("semantic error: {e}"),
            location: None,
        })
        .collect();

    let mut walker = RuleWalker::new(code, WRAPPER_PREFIX.len() as u32);
    walker.visit_program(&program);

    violations.extend(walker.violations);
    dedup_violations(&mut violations);

    // Partition member calls into tool calls (known namespaces) and
    // binding-shaped calls.
    let mut mcp_calls: Vec<String> = Vec::new();
    let mut other_member_calls = 0usize;
    for (object, _method) in &walker.member_calls {
        if available_mcps.iter().any(|ns| ns == object) {
            if !mcp_calls.contains(object) {
                mcp_calls.push(object.clone());
            }
        } else {
            other_member_calls = other_member_calls.saturating_add(1);
        }
    }

    let detected_patterns = DetectedPatterns {
        mcp_calls,
        fetch_calls: walker.fetch_calls,
        file_calls: walker.file_calls,
        other_member_calls,
    };

    let intents = classify_intents(&detected_patterns);
    let risk_level = classify_risk(&violations, &detected_patterns);

    AnalysisResult {
        violations,
        detected_patterns,
        intents,
        risk_level,
    }
}

/// The same construct can be flagged from more than one walk path
/// (e.g. `new Function` and its callee identifier); keep one.
fn dedup_violations(violations: &mut Vec<Violation>) {
    let mut seen = std::collections::HashSet::new();
    violations.retain(|v| seen.insert((v.rule_id, v.location.map(|l| (l.line, l.column)))));
}

fn classify_intents(patterns: &DetectedPatterns) -> Vec<Intent> {
    let mut intents = Vec::new();
    if !patterns.mcp_calls.is_empty() || patterns.other_member_calls > 0 {
        intents.push(Intent::ToolCall);
    }
    if patterns.fetch_calls > 0 {
        intents.push(Intent::NetworkFetch);
    }
    if patterns.file_calls > 0 {
        intents.push(Intent::FileIo);
    }
    if intents.is_empty() {
        intents.push(Intent::DataTransformation);
    }
    intents
}

/// Combine violations and effect counts into a risk level.
///
/// Any critical violation is critical risk. Otherwise risk scales with
/// the number of external-effect call sites.
fn classify_risk(violations: &[Violation], patterns: &DetectedPatterns) -> RiskLevel {
    if violations
        .iter()
        .any(|v| v.severity == ViolationSeverity::Critical)
    {
        return RiskLevel::Critical;
    }
    let effects = patterns
        .external_effect_count()
        .saturating_add(patterns.other_member_calls);
    if effects == 0 {
        RiskLevel::Low
    } else if effects <= HIGH_EFFECT_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_bare(code: &str) -> AnalysisResult {
        analyze(code, &[])
    }

    #[test]
    fn test_clean_code_is_low_risk() {
        let result = analyze_bare("const x = [1, 2, 3].map(n => n * 2);");
        assert!(result.violations.is_empty());
        assert_eq!(result.risk_level, islet_core::RiskLevel::Low);
        assert_eq!(result.intents, vec![Intent::DataTransformation]);
        assert!(!result.must_reject());
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let code = "const a = eval; tools.run({});";
        let first = serde_json::to_string(&analyze_bare(code)).unwrap();
        let second = serde_json::to_string(&analyze_bare(code)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_proto_access_rejected() {
        let result = analyze_bare(r#"obj.__proto__.polluted = true;"#);
        assert!(result.must_reject());
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::PROTOTYPE_MUTATION));
    }

    #[test]
    fn test_computed_proto_access_rejected() {
        let result = analyze_bare(r#"obj["__proto__"]["x"] = 1;"#);
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::PROTOTYPE_MUTATION));
    }

    #[test]
    fn test_set_prototype_of_rejected() {
        let result = analyze_bare("Object.setPrototypeOf(a, b);");
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::PROTOTYPE_MUTATION));
    }

    #[test]
    fn test_reflective_constructor_rejected() {
        let result = analyze_bare(r#"(function(){}).constructor("return 1")();"#);
        assert!(result.must_reject());
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::REFLECTIVE_CONSTRUCTOR));
    }

    #[test]
    fn test_process_global_rejected() {
        let result = analyze_bare("const env = process.env;");
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::PROCESS_GLOBAL));
    }

    #[test]
    fn test_require_rejected() {
        let result = analyze_bare(r#"const fsmod = require("fs");"#);
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::MODULE_LOADING));
    }

    #[test]
    fn test_dynamic_import_rejected() {
        let result = analyze_bare(r#"const m = await import("left-pad");"#);
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::MODULE_LOADING));
    }

    #[test]
    fn test_eval_and_new_function_rejected() {
        let result = analyze_bare(r#"eval("1"); new Function("x", "return x");"#);
        let dynamic = result
            .violations
            .iter()
            .filter(|v| v.rule_id == rules::DYNAMIC_CODE)
            .count();
        assert!(dynamic >= 2);
    }

    #[test]
    fn test_raw_io_global_rejected() {
        let result = analyze_bare("fs.readFileSync('/etc/passwd');");
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::RAW_IO));
    }

    #[test]
    fn test_syntax_error_rejected() {
        let result = analyze_bare("const = ;");
        assert!(result.must_reject());
        assert!(result
            .violations
            .iter()
            .any(|v| v.rule_id == rules::SYNTAX));
    }

    #[test]
    fn test_top_level_await_and_return_accepted() {
        let result = analyze(
            "const value = await github.getIssue({ id: 1 });\nreturn value;",
            &["github".to_string()],
        );
        assert!(result.violations.is_empty(), "{:?}", result.violations);
        assert_eq!(result.detected_patterns.mcp_calls, vec!["github"]);
        assert_eq!(result.risk_level, islet_core::RiskLevel::Medium);
    }

    #[test]
    fn test_violation_location_points_into_snippet() {
        let result = analyze_bare("const ok = 1;\nconst bad = process.pid;");
        let violation = result
            .violations
            .iter()
            .find(|v| v.rule_id == rules::PROCESS_GLOBAL)
            .expect("process violation");
        let location = violation.location.expect("has location");
        assert_eq!(location.line, 2);
        assert!(location.column > 1);
    }

    #[test]
    fn test_fetch_counts_toward_network_intent() {
        let result = analyze_bare(r#"const r = await fetch("https://api.example.com/");"#);
        assert_eq!(result.detected_patterns.fetch_calls, 1);
        assert!(result.intents.contains(&Intent::NetworkFetch));
        assert_eq!(result.risk_level, islet_core::RiskLevel::Medium);
    }

    #[test]
    fn test_many_effects_is_high_risk() {
        let mut code = String::new();
        for i in 0..12 {
            code.push_str(&format!("await fetch(\"https://api.example.com/{i}\");\n"));
        }
        let result = analyze_bare(&code);
        assert_eq!(result.risk_level, islet_core::RiskLevel::High);
        assert!(!result.must_reject());
    }
}
