//! Runtime values.
//!
//! Arrays and objects are reference types, as untrusted code expects;
//! closures capture their defining scope. Every crossing to the broker
//! converts to and from plain JSON, so nothing reference-shaped ever
//! leaves the engine.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::Value as Json;

use super::ast::Stmt;

/// A lexical scope: variables plus a parent link.
#[derive(Debug, Default)]
pub struct Scope {
    /// Variables declared in this scope.
    pub vars: std::collections::HashMap<String, Value>,
    /// Enclosing scope.
    pub parent: Option<Env>,
}

/// Shared handle to a scope.
pub type Env = Arc<Mutex<Scope>>;

/// Create a child scope of `parent`.
#[must_use]
pub fn child_env(parent: &Env) -> Env {
    Arc::new(Mutex::new(Scope {
        vars: std::collections::HashMap::new(),
        parent: Some(Arc::clone(parent)),
    }))
}

/// Look a name up through the scope chain.
#[must_use]
pub fn lookup(env: &Env, name: &str) -> Option<Value> {
    let mut current = Arc::clone(env);
    loop {
        let next = {
            let scope = current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(value) = scope.vars.get(name) {
                return Some(value.clone());
            }
            scope.parent.clone()
        };
        match next {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// Assign to an existing name in the scope chain. Returns `false` when
/// the name is not declared anywhere.
#[must_use]
pub fn assign(env: &Env, name: &str, value: Value) -> bool {
    let mut current = Arc::clone(env);
    loop {
        let next = {
            let mut scope = current.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if scope.vars.contains_key(name) {
                scope.vars.insert(name.to_string(), value);
                return true;
            }
            scope.parent.clone()
        };
        match next {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// Declare a name in the innermost scope.
pub fn declare(env: &Env, name: &str, value: Value) {
    let mut scope = env.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    scope.vars.insert(name.to_string(), value);
}

/// A user-defined function.
#[derive(Debug)]
pub struct Closure {
    /// Parameter names.
    pub params: Vec<String>,
    /// Body statements.
    pub body: Arc<Vec<Stmt>>,
    /// Captured environment.
    pub env: Env,
}

/// Built-in `Math` methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    /// `Math.abs`
    Abs,
    /// `Math.floor`
    Floor,
    /// `Math.ceil`
    Ceil,
    /// `Math.round`
    Round,
    /// `Math.max`
    Max,
    /// `Math.min`
    Min,
    /// `Math.sqrt`
    Sqrt,
    /// `Math.pow`
    Pow,
    /// `Math.random`
    Random,
}

/// Built-in `files` methods, each brokered through the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFn {
    /// `files.readFile`
    Read,
    /// `files.writeFile`
    Write,
    /// `files.appendFile`
    Append,
    /// `files.listFiles`
    List,
    /// `files.removeFile`
    Remove,
    /// `files.rename`
    Rename,
    /// `files.copy`
    Copy,
    /// `files.exists`
    Exists,
    /// `files.stat`
    Stat,
}

/// A host-implemented function surfaced to untrusted code.
#[derive(Debug, Clone)]
pub enum Native {
    /// `ns.op(params?)` — an MCP tool.
    Tool {
        /// Qualified `namespace:tool` name.
        qualified_name: String,
    },
    /// `binding.method(args?)`.
    Binding {
        /// Binding name.
        binding: String,
        /// Method name.
        method: String,
    },
    /// `fetch(url, options?)`.
    Fetch,
    /// One of the `files.*` operations.
    File(FileFn),
    /// `console.log` / `console.error` / `console.warn`.
    ConsoleLog,
    /// `JSON.stringify`.
    JsonStringify,
    /// `JSON.parse`.
    JsonParse,
    /// A `Math` method.
    Math(MathFn),
    /// `Object.keys`.
    ObjectKeys,
    /// `Object.values`.
    ObjectValues,
    /// `Object.entries`.
    ObjectEntries,
    /// `Object.freeze` (accepted, returns its argument).
    ObjectFreeze,
    /// `Array.isArray`.
    ArrayIsArray,
    /// `Promise.all`.
    PromiseAll,
    /// `Promise.resolve`.
    PromiseResolve,
    /// `Promise.reject`.
    PromiseReject,
    /// `Date.now`.
    DateNow,
    /// `Date.iso` — ISO-8601 timestamp for "now".
    DateIso,
    /// `Number(x)`.
    NumberCast,
    /// `String(x)`.
    StringCast,
    /// `Boolean(x)`.
    BooleanCast,
    /// `parseInt`.
    ParseInt,
    /// `parseFloat`.
    ParseFloat,
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean.
    Bool(bool),
    /// Number (f64, as in the source language).
    Number(f64),
    /// String.
    Str(String),
    /// Array (reference type).
    Array(Arc<Mutex<Vec<Value>>>),
    /// Object (reference type, string keys).
    Object(Arc<Mutex<BTreeMap<String, Value>>>),
    /// User-defined function.
    Closure(Arc<Closure>),
    /// Host-implemented function.
    Native(Native),
}

impl Value {
    /// Build an array value.
    #[must_use]
    pub fn array(items: Vec<Value>) -> Self {
        Self::Array(Arc::new(Mutex::new(items)))
    }

    /// Build an object value.
    #[must_use]
    pub fn object(map: BTreeMap<String, Value>) -> Self {
        Self::Object(Arc::new(Mutex::new(map)))
    }

    /// JavaScript truthiness.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// `typeof` result.
    #[must_use]
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null | Self::Array(_) | Self::Object(_) => "object",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Closure(_) | Self::Native(_) => "function",
        }
    }

    /// Strict equality.
    #[must_use]
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Closure(a), Self::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Render for string contexts (template literals, `console.log`).
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => render_number(*n),
            Self::Str(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => self
                .to_json()
                .map_or_else(|_| "[object]".to_string(), |j| j.to_string()),
            Self::Closure(_) | Self::Native(_) => "[function]".to_string(),
        }
    }

    /// Convert to plain JSON for the broker. Functions fail.
    ///
    /// # Errors
    ///
    /// Returns a message naming the non-serializable part.
    pub fn to_json(&self) -> Result<Json, String> {
        match self {
            Self::Undefined | Self::Null => Ok(Json::Null),
            Self::Bool(b) => Ok(Json::Bool(*b)),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .ok_or_else(|| "number is not finite".to_string()),
            Self::Str(s) => Ok(Json::String(s.clone())),
            Self::Array(items) => {
                let items = items.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                items.iter().map(Value::to_json).collect::<Result<Vec<_>, _>>().map(Json::Array)
            },
            Self::Object(map) => {
                let map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                let mut out = serde_json::Map::new();
                for (key, value) in map.iter() {
                    out.insert(key.clone(), value.to_json()?);
                }
                Ok(Json::Object(out))
            },
            Self::Closure(_) | Self::Native(_) => {
                Err("functions are not serializable".to_string())
            },
        }
    }

    /// Convert plain JSON into a value.
    #[must_use]
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::Str(s.clone()),
            Json::Array(items) => Self::array(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Self::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Render a number the way the source language does: integers without a
/// fraction.
fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Number(1.0).is_truthy());
        assert!(Value::array(vec![]).is_truthy());
    }

    #[test]
    fn test_strict_eq_reference_semantics() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = a.clone();
        let c = Value::array(vec![Value::Number(1.0)]);
        assert!(a.strict_eq(&b));
        assert!(!a.strict_eq(&c));
    }

    #[test]
    fn test_json_roundtrip() {
        let json = serde_json::json!({"a": [1, "two", null], "b": {"c": true}});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_functions_not_serializable() {
        let value = Value::Native(Native::Fetch);
        assert!(value.to_json().is_err());
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(Value::Number(3.0).render(), "3");
        assert_eq!(Value::Number(3.5).render(), "3.5");
    }

    #[test]
    fn test_scope_chain() {
        let root: Env = Arc::new(Mutex::new(Scope::default()));
        declare(&root, "x", Value::Number(1.0));
        let inner = child_env(&root);
        declare(&inner, "y", Value::Number(2.0));

        assert!(matches!(lookup(&inner, "x"), Some(Value::Number(n)) if n == 1.0));
        assert!(matches!(lookup(&inner, "y"), Some(Value::Number(n)) if n == 2.0));
        assert!(lookup(&root, "y").is_none());

        assert!(assign(&inner, "x", Value::Number(9.0)));
        assert!(matches!(lookup(&root, "x"), Some(Value::Number(n)) if n == 9.0));
        assert!(!assign(&inner, "zz", Value::Null));
    }
}
