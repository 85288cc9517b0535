//! The AST rule walker.
//!
//! Flags forbidden constructs at the syntax level. Shadowing does not
//! excuse a name: any reference to a forbidden global is flagged, which
//! keeps the gate deterministic and err-on-the-side-of-rejection.

use oxc::ast::ast::{
    CallExpression, ComputedMemberExpression, Expression, ImportDeclaration, ImportExpression,
    NewExpression, ObjectProperty, PropertyKey, StaticMemberExpression,
};
use oxc::ast_visit::{walk, Visit};

use crate::result::{rules, Location, Violation, ViolationSeverity};

/// Properties whose access mutates or escapes via the prototype chain.
const PROTO_PROPERTIES: &[&str] = &["__proto__", "prototype"];

/// Globals that reach raw process, filesystem, or network capability.
const RAW_IO_GLOBALS: &[&str] = &[
    "child_process",
    "fs",
    "net",
    "http",
    "https",
    "dgram",
    "tls",
    "Deno",
    "Bun",
];

/// Builtins whose member calls are pure computation, not external
/// effects.
const PURE_NAMESPACES: &[&str] = &[
    "console", "JSON", "Math", "Object", "Array", "Promise", "Date", "Number", "String", "Boolean",
];

pub(crate) struct RuleWalker<'s> {
    source: &'s str,
    /// Byte offset of the analysis wrapper; subtracted before locations
    /// are reported.
    span_base: u32,
    pub(crate) violations: Vec<Violation>,
    /// `(object, method)` pairs for namespace-shaped member calls.
    pub(crate) member_calls: Vec<(String, String)>,
    pub(crate) fetch_calls: usize,
    pub(crate) file_calls: usize,
}

impl<'s> RuleWalker<'s> {
    pub(crate) fn new(source: &'s str, span_base: u32) -> Self {
        Self {
            source,
            span_base,
            violations: Vec::new(),
            member_calls: Vec::new(),
            fetch_calls: 0,
            file_calls: 0,
        }
    }

    fn flag(&mut self, rule_id: u32, description: impl Into<String>, offset: u32) {
        self.violations.push(Violation {
            rule_id,
            severity: ViolationSeverity::Critical,
            description: description.into(),
            location: Some(self.location(offset)),
        });
    }

    /// Map a byte offset in the wrapped source back to a 1-based
    /// line/column in the submitted snippet.
    fn location(&self, offset: u32) -> Location {
        let offset = (offset.saturating_sub(self.span_base)) as usize;
        let prefix = self.source.get(..offset).unwrap_or(self.source);
        let line = prefix.bytes().filter(|b| *b == b'\n').count() as u32;
        let column = prefix
            .rfind('\n')
            .map_or(offset, |nl| offset.saturating_sub(nl).saturating_sub(1));
        Location {
            line: line.saturating_add(1),
            column: (column as u32).saturating_add(1),
        }
    }
}

impl<'a> Visit<'a> for RuleWalker<'_> {
    fn visit_static_member_expression(&mut self, it: &StaticMemberExpression<'a>) {
        let property = it.property.name.as_str();
        if PROTO_PROPERTIES.contains(&property) {
            self.flag(
                rules::PROTOTYPE_MUTATION,
                format!("prototype chain access via `.{property}`"),
                it.span.start,
            );
        } else if property == "constructor" {
            self.flag(
                rules::REFLECTIVE_CONSTRUCTOR,
                "reflective constructor access via `.constructor`",
                it.span.start,
            );
        }
        walk::walk_static_member_expression(self, it);
    }

    fn visit_computed_member_expression(&mut self, it: &ComputedMemberExpression<'a>) {
        if let Expression::StringLiteral(lit) = &it.expression {
            let key = lit.value.as_str();
            if PROTO_PROPERTIES.contains(&key) {
                self.flag(
                    rules::PROTOTYPE_MUTATION,
                    format!("prototype chain access via [\"{key}\"]"),
                    it.span.start,
                );
            } else if key == "constructor" {
                self.flag(
                    rules::REFLECTIVE_CONSTRUCTOR,
                    "reflective constructor access via [\"constructor\"]",
                    it.span.start,
                );
            }
        }
        walk::walk_computed_member_expression(self, it);
    }

    fn visit_object_property(&mut self, it: &ObjectProperty<'a>) {
        if let PropertyKey::StaticIdentifier(ident) = &it.key {
            if ident.name == "__proto__" {
                self.flag(
                    rules::PROTOTYPE_MUTATION,
                    "prototype override via `__proto__` object key",
                    it.span.start,
                );
            }
        }
        walk::walk_object_property(self, it);
    }

    fn visit_identifier_reference(&mut self, it: &oxc::ast::ast::IdentifierReference<'a>) {
        let name = it.name.as_str();
        match name {
            "process" => self.flag(
                rules::PROCESS_GLOBAL,
                "reference to the `process` global",
                it.span.start,
            ),
            "require" => self.flag(
                rules::MODULE_LOADING,
                "reference to `require`",
                it.span.start,
            ),
            "eval" => self.flag(
                rules::DYNAMIC_CODE,
                "reference to `eval`",
                it.span.start,
            ),
            "Function" => self.flag(
                rules::DYNAMIC_CODE,
                "reference to the `Function` constructor",
                it.span.start,
            ),
            other if RAW_IO_GLOBALS.contains(&other) => self.flag(
                rules::RAW_IO,
                format!("reference to raw I/O global `{other}`"),
                it.span.start,
            ),
            _ => {},
        }
        walk::walk_identifier_reference(self, it);
    }

    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        match &it.callee {
            Expression::Identifier(ident) if ident.name == "fetch" => {
                self.fetch_calls = self.fetch_calls.saturating_add(1);
            },
            Expression::StaticMemberExpression(member) => {
                if let Expression::Identifier(object) = &member.object {
                    let object_name = object.name.as_str();
                    let method = member.property.name.as_str();
                    if (object_name == "Object" || object_name == "Reflect")
                        && method == "setPrototypeOf"
                    {
                        self.flag(
                            rules::PROTOTYPE_MUTATION,
                            format!("prototype mutation via {object_name}.setPrototypeOf"),
                            it.span.start,
                        );
                    } else if object_name == "files" {
                        self.file_calls = self.file_calls.saturating_add(1);
                    } else if !PURE_NAMESPACES.contains(&object_name) {
                        self.member_calls
                            .push((object_name.to_string(), method.to_string()));
                    }
                }
            },
            _ => {},
        }
        walk::walk_call_expression(self, it);
    }

    fn visit_new_expression(&mut self, it: &NewExpression<'a>) {
        if let Expression::Identifier(ident) = &it.callee {
            if ident.name == "Function" {
                self.flag(
                    rules::DYNAMIC_CODE,
                    "dynamic code via `new Function`",
                    it.span.start,
                );
            }
        }
        walk::walk_new_expression(self, it);
    }

    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        self.flag(
            rules::MODULE_LOADING,
            format!("static import of \"{}\"", it.source.value),
            it.span.start,
        );
        walk::walk_import_declaration(self, it);
    }

    fn visit_import_expression(&mut self, it: &ImportExpression<'a>) {
        self.flag(
            rules::MODULE_LOADING,
            "dynamic import()",
            it.span.start,
        );
        walk::walk_import_expression(self, it);
    }
}
