//! Package specifier extraction.
//!
//! Pulls `require`/`import` specifiers out of submitted code so they can
//! be bucketed against the allow and block lists. This scan is about
//! package *policy*; whether module loading is permitted at all is the
//! static analyzer's call.

use std::sync::OnceLock;

use regex::Regex;

/// Extract unique package names referenced by the code, in first-seen
/// order.
///
/// Handles `require("pkg")`, `import ... from "pkg"`, bare
/// `import "pkg"`, and dynamic `import("pkg")`. Relative specifiers
/// (`./x`, `../x`) are not packages and are skipped. Scoped packages
/// keep their scope (`@org/name`); deep imports collapse to the package
/// root.
#[must_use]
pub fn extract_packages(code: &str) -> Vec<String> {
    static SPECIFIER: OnceLock<Regex> = OnceLock::new();
    let specifier = SPECIFIER.get_or_init(|| {
        Regex::new(
            r#"(?x)
            (?: require \s* \( \s* ['"]([^'"]+)['"] )
          | (?: \bimport \s* \( \s* ['"]([^'"]+)['"] )
          | (?: \bimport \s+ (?: [\w$\{\}\s,*]+ \s+ from \s+ )? ['"]([^'"]+)['"] )
            "#,
        )
        .unwrap_or_else(|e| unreachable!("specifier regex is static: {e}"))
    });

    let mut seen = std::collections::HashSet::new();
    let mut packages = Vec::new();
    for caps in specifier.captures_iter(code) {
        let raw = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str());
        let Some(raw) = raw else { continue };
        if raw.starts_with('.') || raw.starts_with('/') {
            continue;
        }
        let root = package_root(raw);
        if seen.insert(root.clone()) {
            packages.push(root);
        }
    }
    packages
}

/// Collapse a specifier to its package root: `lodash/fp` → `lodash`,
/// `@org/pkg/sub` → `@org/pkg`.
#[must_use]
pub fn package_root(specifier: &str) -> String {
    let mut parts = specifier.split('/');
    match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => format!("{scope}/{name}"),
        (Some(name), _) => name.to_string(),
        (None, _) => specifier.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_specifier() {
        let packages = extract_packages(r#"const _ = require("lodash");"#);
        assert_eq!(packages, vec!["lodash"]);
    }

    #[test]
    fn test_static_import_forms() {
        let code = r#"
            import axios from "axios";
            import { parse } from "yaml";
            import "polyfill";
        "#;
        let packages = extract_packages(code);
        assert_eq!(packages, vec!["axios", "yaml", "polyfill"]);
    }

    #[test]
    fn test_dynamic_import() {
        let packages = extract_packages(r#"const m = await import("date-fns");"#);
        assert_eq!(packages, vec!["date-fns"]);
    }

    #[test]
    fn test_relative_specifiers_skipped() {
        let packages = extract_packages(r#"const x = require("./local"); import y from "../up";"#);
        assert!(packages.is_empty());
    }

    #[test]
    fn test_deep_and_scoped_roots() {
        assert_eq!(package_root("lodash/fp"), "lodash");
        assert_eq!(package_root("@octokit/rest/endpoints"), "@octokit/rest");
        assert_eq!(package_root("uuid"), "uuid");
    }

    #[test]
    fn test_duplicates_collapse() {
        let code = r#"require("uuid"); require("uuid"); import u from "uuid/v4";"#;
        assert_eq!(extract_packages(code), vec!["uuid"]);
    }
}
