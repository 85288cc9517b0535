//! The global surface and host-implemented functions.
//!
//! Untrusted code sees exactly: the pure intrinsics (`JSON`, `Math`,
//! `Object`, `Array`, `Promise`, `Date`, casts, `console`), a restricted
//! `fetch`, the `files` namespace, one object per tool namespace, and
//! one object per binding. No module loader, no environment, no process,
//! no raw I/O.

use std::collections::BTreeMap;
use std::sync::Arc;

use islet_core::{ErrorKind, ToolDescriptor};
use serde_json::Value as Json;

use crate::protocol::{BindingSurface, FsOperation};

use super::ast::Expr;
use super::interp::{error_value, Engine, Interrupt};
use super::value::{declare, Env, FileFn, MathFn, Native, Value};

type EvalResult<T> = Result<T, Interrupt>;

/// Sanitize a name into a valid identifier: invalid characters become
/// `_`, and a leading digit is prefixed.
#[must_use]
pub fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

fn native_obj(entries: &[(&str, Native)]) -> Value {
    let map: BTreeMap<String, Value> = entries
        .iter()
        .map(|(name, native)| ((*name).to_string(), Value::Native(native.clone())))
        .collect();
    Value::object(map)
}

impl Engine {
    /// Populate the global scope.
    pub(crate) fn install_globals(
        &self,
        globals: &Env,
        tools: &[ToolDescriptor],
        bindings: &[BindingSurface],
    ) {
        declare(
            globals,
            "console",
            native_obj(&[
                ("log", Native::ConsoleLog),
                ("error", Native::ConsoleLog),
                ("warn", Native::ConsoleLog),
                ("info", Native::ConsoleLog),
            ]),
        );
        declare(
            globals,
            "JSON",
            native_obj(&[
                ("stringify", Native::JsonStringify),
                ("parse", Native::JsonParse),
            ]),
        );
        let math = native_obj(&[
            ("abs", Native::Math(MathFn::Abs)),
            ("floor", Native::Math(MathFn::Floor)),
            ("ceil", Native::Math(MathFn::Ceil)),
            ("round", Native::Math(MathFn::Round)),
            ("max", Native::Math(MathFn::Max)),
            ("min", Native::Math(MathFn::Min)),
            ("sqrt", Native::Math(MathFn::Sqrt)),
            ("pow", Native::Math(MathFn::Pow)),
            ("random", Native::Math(MathFn::Random)),
        ]);
        if let Value::Object(map) = &math {
            let mut map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            map.insert("PI".to_string(), Value::Number(std::f64::consts::PI));
            map.insert("E".to_string(), Value::Number(std::f64::consts::E));
        }
        declare(globals, "Math", math);
        declare(
            globals,
            "Object",
            native_obj(&[
                ("keys", Native::ObjectKeys),
                ("values", Native::ObjectValues),
                ("entries", Native::ObjectEntries),
                ("freeze", Native::ObjectFreeze),
            ]),
        );
        declare(
            globals,
            "Array",
            native_obj(&[("isArray", Native::ArrayIsArray)]),
        );
        declare(
            globals,
            "Promise",
            native_obj(&[
                ("all", Native::PromiseAll),
                ("resolve", Native::PromiseResolve),
                ("reject", Native::PromiseReject),
            ]),
        );
        declare(
            globals,
            "Date",
            native_obj(&[("now", Native::DateNow), ("iso", Native::DateIso)]),
        );
        declare(globals, "Number", Value::Native(Native::NumberCast));
        declare(globals, "String", Value::Native(Native::StringCast));
        declare(globals, "Boolean", Value::Native(Native::BooleanCast));
        declare(globals, "parseInt", Value::Native(Native::ParseInt));
        declare(globals, "parseFloat", Value::Native(Native::ParseFloat));
        declare(globals, "fetch", Value::Native(Native::Fetch));
        declare(
            globals,
            "files",
            native_obj(&[
                ("readFile", Native::File(FileFn::Read)),
                ("writeFile", Native::File(FileFn::Write)),
                ("appendFile", Native::File(FileFn::Append)),
                ("listFiles", Native::File(FileFn::List)),
                ("removeFile", Native::File(FileFn::Remove)),
                ("rename", Native::File(FileFn::Rename)),
                ("copy", Native::File(FileFn::Copy)),
                ("exists", Native::File(FileFn::Exists)),
                ("stat", Native::File(FileFn::Stat)),
            ]),
        );

        // Tools: `ns:op` surfaces as `ns.op(params?)`.
        let mut namespaces: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for tool in tools {
            let ns = sanitize_identifier(&tool.qualified_name.namespace);
            let method = sanitize_identifier(&tool.qualified_name.tool);
            namespaces.entry(ns).or_default().insert(
                method,
                Value::Native(Native::Tool {
                    qualified_name: tool.qualified_name.canonical(),
                }),
            );
        }
        for (ns, methods) in namespaces {
            declare(globals, &ns, Value::object(methods));
        }

        // Bindings: top-level objects whose methods forward to the broker.
        for binding in bindings {
            let name = sanitize_identifier(&binding.name);
            let methods: BTreeMap<String, Value> = binding
                .methods
                .iter()
                .map(|method| {
                    (
                        sanitize_identifier(method),
                        Value::Native(Native::Binding {
                            binding: binding.name.clone(),
                            method: method.clone(),
                        }),
                    )
                })
                .collect();
            declare(globals, &name, Value::object(methods));
        }
    }

    /// Evaluate a call expression: method calls on values, closure
    /// calls, and native calls.
    pub(crate) async fn eval_call(
        &self,
        callee: &Expr,
        args: &[(Expr, bool)],
        env: &Env,
    ) -> EvalResult<Value> {
        let mut evaluated = Vec::new();
        for (arg, spread) in args {
            let value = self.eval(arg, env).await?;
            if *spread {
                match value {
                    Value::Array(items) => {
                        let items = items
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        evaluated.extend(items.iter().cloned());
                    },
                    other => {
                        return Err(Interrupt::thrown(
                            ErrorKind::Downstream,
                            format!("cannot spread {}", other.type_of()),
                        ))
                    },
                }
            } else {
                evaluated.push(value);
            }
        }

        // Method-call shape: `obj.method(...)`.
        if let Expr::Member {
            object,
            property,
            optional,
        } = callee
        {
            let object = self.eval(object, env).await?;
            if *optional && matches!(object, Value::Undefined | Value::Null) {
                return Ok(Value::Undefined);
            }
            let super::ast::PropAccess::Static(name) = property else {
                return Err(Interrupt::thrown(
                    ErrorKind::Downstream,
                    "computed method calls are not supported",
                ));
            };
            self.check_property(name)?;
            return self.call_member(&object, name, evaluated).await;
        }

        let callee = self.eval(callee, env).await?;
        self.call_value(&callee, evaluated).await
    }

    /// Call a value (closure or native).
    pub(crate) async fn call_value(&self, callee: &Value, args: Vec<Value>) -> EvalResult<Value> {
        match callee {
            Value::Closure(closure) => self.call_closure(closure, args).await,
            Value::Native(native) => self.call_native(native, args).await,
            other => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                format!("{} is not a function", other.type_of()),
            )),
        }
    }

    /// Call `object.method(args)`.
    async fn call_member(&self, object: &Value, method: &str, args: Vec<Value>) -> EvalResult<Value> {
        match object {
            Value::Object(map) => {
                let member = {
                    let map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                    map.get(method).cloned()
                };
                match member {
                    Some(callable @ (Value::Closure(_) | Value::Native(_))) => {
                        self.call_value(&callable, args).await
                    },
                    Some(other) => Err(Interrupt::thrown(
                        ErrorKind::Downstream,
                        format!("{method} is not a function (it is {})", other.type_of()),
                    )),
                    None => Err(Interrupt::thrown(
                        ErrorKind::Downstream,
                        format!("{method} is not defined"),
                    )),
                }
            },
            Value::Array(_) => self.array_method(object, method, args).await,
            Value::Str(s) => self.string_method(s, method, args),
            Value::Number(n) => self.number_method(*n, method, args),
            other => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                format!("cannot call `{method}` on {}", other.type_of()),
            )),
        }
    }

    /// Host-implemented functions.
    #[allow(clippy::too_many_lines)]
    async fn call_native(&self, native: &Native, args: Vec<Value>) -> EvalResult<Value> {
        match native {
            Native::Tool { qualified_name } => {
                let params = args.first().cloned().unwrap_or(Value::Null);
                let params = self.to_broker_json(&params)?;
                let result = self.services.tool_call(qualified_name, params).await;
                self.broker_result(result)
            },
            Native::Binding { binding, method } => {
                let call_args = args.first().cloned().unwrap_or(Value::Null);
                let call_args = self.to_broker_json(&call_args)?;
                let result = self.services.binding_call(binding, method, call_args).await;
                self.broker_result(result)
            },
            Native::Fetch => {
                let Some(Value::Str(url)) = args.first() else {
                    return Err(Interrupt::thrown(
                        ErrorKind::Downstream,
                        "fetch requires a URL string",
                    ));
                };
                let (method, headers, body) = fetch_options(args.get(1));
                let result = self
                    .services
                    .network_call(url, &method, headers, body)
                    .await;
                self.broker_result(result)
            },
            Native::File(file_fn) => {
                let operation = fs_operation(*file_fn, &args)?;
                let result = self.services.fs_call(operation).await;
                self.broker_result(result)
            },
            Native::ConsoleLog => {
                let line = args
                    .iter()
                    .map(Value::render)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.log(line);
                Ok(Value::Undefined)
            },
            Native::JsonStringify => {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                match value.to_json() {
                    Ok(json) => {
                        self.alloc(1)?;
                        Ok(Value::Str(json.to_string()))
                    },
                    // Matching source-language stringify of functions.
                    Err(_) => Ok(Value::Undefined),
                }
            },
            Native::JsonParse => {
                let Some(Value::Str(text)) = args.first() else {
                    return Err(Interrupt::thrown(
                        ErrorKind::Downstream,
                        "JSON.parse requires a string",
                    ));
                };
                match serde_json::from_str::<Json>(text) {
                    Ok(json) => {
                        self.alloc(1)?;
                        Ok(Value::from_json(&json))
                    },
                    Err(err) => Err(Interrupt::thrown(
                        ErrorKind::Downstream,
                        format!("JSON.parse: {err}"),
                    )),
                }
            },
            Native::Math(f) => math_fn(*f, &args),
            Native::ObjectKeys => with_object(&args, |map| {
                Value::array(map.keys().map(|k| Value::Str(k.clone())).collect())
            }),
            Native::ObjectValues => with_object(&args, |map| {
                Value::array(map.values().cloned().collect())
            }),
            Native::ObjectEntries => with_object(&args, |map| {
                Value::array(
                    map.iter()
                        .map(|(k, v)| Value::array(vec![Value::Str(k.clone()), v.clone()]))
                        .collect(),
                )
            }),
            Native::ObjectFreeze => Ok(args.into_iter().next().unwrap_or(Value::Undefined)),
            Native::ArrayIsArray => Ok(Value::Bool(matches!(
                args.first(),
                Some(Value::Array(_))
            ))),
            // Calls resolve eagerly, so `Promise.all` receives plain
            // values and passes them through.
            Native::PromiseAll => match args.into_iter().next() {
                Some(value @ Value::Array(_)) => Ok(value),
                _ => Err(Interrupt::thrown(
                    ErrorKind::Downstream,
                    "Promise.all requires an array",
                )),
            },
            Native::PromiseResolve => Ok(args.into_iter().next().unwrap_or(Value::Undefined)),
            Native::PromiseReject => Err(Interrupt::Thrown(
                args.into_iter().next().unwrap_or(Value::Undefined),
            )),
            Native::DateNow => Ok(Value::Number(chrono::Utc::now().timestamp_millis() as f64)),
            Native::DateIso => {
                self.alloc(1)?;
                Ok(Value::Str(chrono::Utc::now().to_rfc3339()))
            },
            Native::NumberCast => Ok(Value::Number(to_number(
                args.first().unwrap_or(&Value::Undefined),
            ))),
            Native::StringCast => {
                self.alloc(1)?;
                Ok(Value::Str(
                    args.first().unwrap_or(&Value::Undefined).render(),
                ))
            },
            Native::BooleanCast => Ok(Value::Bool(
                args.first().unwrap_or(&Value::Undefined).is_truthy(),
            )),
            Native::ParseInt => {
                let text = args.first().unwrap_or(&Value::Undefined).render();
                let trimmed = text.trim();
                let parsed: String = trimmed
                    .chars()
                    .enumerate()
                    .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
                    .map(|(_, c)| c)
                    .collect();
                Ok(parsed
                    .parse::<f64>()
                    .map_or(Value::Number(f64::NAN), Value::Number))
            },
            Native::ParseFloat => {
                let text = args.first().unwrap_or(&Value::Undefined).render();
                Ok(text
                    .trim()
                    .parse::<f64>()
                    .map_or(Value::Number(f64::NAN), Value::Number))
            },
        }
    }

    /// Convert a value for the broker, surfacing serialization failures
    /// as catchable programming errors.
    fn to_broker_json(&self, value: &Value) -> EvalResult<Json> {
        value.to_json().map_err(|reason| {
            Interrupt::thrown(
                ErrorKind::Downstream,
                format!("argument is not serializable: {reason}"),
            )
        })
    }

    /// Turn a broker response into a value or a catchable rejection.
    fn broker_result(&self, result: Result<Json, islet_core::ErrorRecord>) -> EvalResult<Value> {
        match result {
            Ok(json) => {
                self.alloc(1)?;
                Ok(Value::from_json(&json))
            },
            Err(record) => Err(Interrupt::Thrown(error_value(&record))),
        }
    }

    async fn array_method(
        &self,
        array: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> EvalResult<Value> {
        let Value::Array(items_arc) = array else {
            return Err(Interrupt::thrown(ErrorKind::Downstream, "not an array"));
        };
        // Snapshot for iteration; mutating methods re-lock.
        let snapshot: Vec<Value> = {
            let items = items_arc
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            items.clone()
        };
        match method {
            "push" => {
                let mut items = items_arc
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                for arg in args {
                    items.push(arg);
                }
                Ok(Value::Number(items.len() as f64))
            },
            "pop" => {
                let mut items = items_arc
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                Ok(items.pop().unwrap_or(Value::Undefined))
            },
            "map" => {
                let callback = expect_callable(&args)?;
                let mut out = Vec::with_capacity(snapshot.len());
                for (i, item) in snapshot.into_iter().enumerate() {
                    self.step()?;
                    out.push(
                        self.call_value(&callback, vec![item, Value::Number(i as f64)])
                            .await?,
                    );
                }
                self.alloc(out.len().max(1) as u64)?;
                Ok(Value::array(out))
            },
            "filter" => {
                let callback = expect_callable(&args)?;
                let mut out = Vec::new();
                for (i, item) in snapshot.into_iter().enumerate() {
                    self.step()?;
                    let keep = self
                        .call_value(&callback, vec![item.clone(), Value::Number(i as f64)])
                        .await?;
                    if keep.is_truthy() {
                        out.push(item);
                    }
                }
                self.alloc(out.len().max(1) as u64)?;
                Ok(Value::array(out))
            },
            "forEach" => {
                let callback = expect_callable(&args)?;
                for (i, item) in snapshot.into_iter().enumerate() {
                    self.step()?;
                    self.call_value(&callback, vec![item, Value::Number(i as f64)])
                        .await?;
                }
                Ok(Value::Undefined)
            },
            "find" => {
                let callback = expect_callable(&args)?;
                for (i, item) in snapshot.into_iter().enumerate() {
                    self.step()?;
                    let hit = self
                        .call_value(&callback, vec![item.clone(), Value::Number(i as f64)])
                        .await?;
                    if hit.is_truthy() {
                        return Ok(item);
                    }
                }
                Ok(Value::Undefined)
            },
            "some" | "every" => {
                let callback = expect_callable(&args)?;
                let want = method == "some";
                for (i, item) in snapshot.into_iter().enumerate() {
                    self.step()?;
                    let hit = self
                        .call_value(&callback, vec![item, Value::Number(i as f64)])
                        .await?
                        .is_truthy();
                    if hit == want {
                        return Ok(Value::Bool(want));
                    }
                }
                Ok(Value::Bool(!want))
            },
            "includes" => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::Bool(snapshot.iter().any(|v| v.strict_eq(&needle))))
            },
            "indexOf" => {
                let needle = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(Value::Number(
                    snapshot
                        .iter()
                        .position(|v| v.strict_eq(&needle))
                        .map_or(-1.0, |i| i as f64),
                ))
            },
            "join" => {
                let sep = match args.first() {
                    Some(Value::Str(s)) => s.clone(),
                    _ => ",".to_string(),
                };
                self.alloc(1)?;
                Ok(Value::Str(
                    snapshot
                        .iter()
                        .map(Value::render)
                        .collect::<Vec<_>>()
                        .join(&sep),
                ))
            },
            "slice" => {
                let len = snapshot.len();
                let start = slice_index(args.first(), 0, len);
                let end = slice_index(args.get(1), len, len);
                let out: Vec<Value> = snapshot
                    .into_iter()
                    .skip(start)
                    .take(end.saturating_sub(start))
                    .collect();
                self.alloc(out.len().max(1) as u64)?;
                Ok(Value::array(out))
            },
            "concat" => {
                let mut out = snapshot;
                for arg in args {
                    match arg {
                        Value::Array(other) => {
                            let other = other
                                .lock()
                                .unwrap_or_else(std::sync::PoisonError::into_inner);
                            out.extend(other.iter().cloned());
                        },
                        single => out.push(single),
                    }
                }
                self.alloc(out.len().max(1) as u64)?;
                Ok(Value::array(out))
            },
            other => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                format!("array method `{other}` is not supported"),
            )),
        }
    }

    fn string_method(&self, s: &str, method: &str, args: Vec<Value>) -> EvalResult<Value> {
        let arg_str = |i: usize| -> String {
            args.get(i).map(Value::render).unwrap_or_default()
        };
        match method {
            "split" => {
                let sep = arg_str(0);
                let parts: Vec<Value> = if sep.is_empty() {
                    s.chars().map(|c| Value::Str(c.to_string())).collect()
                } else {
                    s.split(&sep).map(|p| Value::Str(p.to_string())).collect()
                };
                self.alloc(parts.len().max(1) as u64)?;
                Ok(Value::array(parts))
            },
            "includes" => Ok(Value::Bool(s.contains(&arg_str(0)))),
            "startsWith" => Ok(Value::Bool(s.starts_with(&arg_str(0)))),
            "endsWith" => Ok(Value::Bool(s.ends_with(&arg_str(0)))),
            "toUpperCase" => Ok(Value::Str(s.to_uppercase())),
            "toLowerCase" => Ok(Value::Str(s.to_lowercase())),
            "trim" => Ok(Value::Str(s.trim().to_string())),
            "indexOf" => {
                let needle = arg_str(0);
                Ok(Value::Number(
                    s.find(&needle).map_or(-1.0, |byte| {
                        s[..byte].chars().count() as f64
                    }),
                ))
            },
            "slice" | "substring" => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len();
                let start = slice_index(args.first(), 0, len);
                let end = slice_index(args.get(1), len, len);
                let out: String = chars
                    .into_iter()
                    .skip(start)
                    .take(end.saturating_sub(start))
                    .collect();
                Ok(Value::Str(out))
            },
            "replace" => {
                let from = arg_str(0);
                let to = arg_str(1);
                Ok(Value::Str(s.replacen(&from, &to, 1)))
            },
            "replaceAll" => {
                let from = arg_str(0);
                let to = arg_str(1);
                Ok(Value::Str(s.replace(&from, &to)))
            },
            "repeat" => {
                let count = to_number(args.first().unwrap_or(&Value::Number(0.0)));
                if !(0.0..=10_000.0).contains(&count) {
                    return Err(Interrupt::thrown(
                        ErrorKind::ResourceExhaustion,
                        "repeat count out of range",
                    ));
                }
                self.alloc(count as u64)?;
                Ok(Value::Str(s.repeat(count as usize)))
            },
            other => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                format!("string method `{other}` is not supported"),
            )),
        }
    }

    #[allow(clippy::unused_self)]
    fn number_method(&self, n: f64, method: &str, args: Vec<Value>) -> EvalResult<Value> {
        match method {
            "toFixed" => {
                let digits = to_number(args.first().unwrap_or(&Value::Number(0.0)));
                let digits = digits.clamp(0.0, 20.0) as usize;
                Ok(Value::Str(format!("{n:.digits$}")))
            },
            "toString" => Ok(Value::Str(Value::Number(n).render())),
            other => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                format!("number method `{other}` is not supported"),
            )),
        }
    }
}

fn expect_callable(args: &[Value]) -> EvalResult<Value> {
    match args.first() {
        Some(value @ (Value::Closure(_) | Value::Native(_))) => Ok(value.clone()),
        _ => Err(Interrupt::thrown(
            ErrorKind::Downstream,
            "callback is not a function",
        )),
    }
}

fn with_object(args: &[Value], f: impl FnOnce(&BTreeMap<String, Value>) -> Value) -> EvalResult<Value> {
    match args.first() {
        Some(Value::Object(map)) => {
            let map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(f(&map))
        },
        _ => Err(Interrupt::thrown(
            ErrorKind::Downstream,
            "argument is not an object",
        )),
    }
}

fn math_fn(f: MathFn, args: &[Value]) -> EvalResult<Value> {
    let nums: Vec<f64> = args.iter().map(to_number).collect();
    let first = nums.first().copied().unwrap_or(f64::NAN);
    let value = match f {
        MathFn::Abs => first.abs(),
        MathFn::Floor => first.floor(),
        MathFn::Ceil => first.ceil(),
        MathFn::Round => first.round(),
        MathFn::Sqrt => first.sqrt(),
        MathFn::Pow => first.powf(nums.get(1).copied().unwrap_or(f64::NAN)),
        MathFn::Max => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        MathFn::Min => nums.iter().copied().fold(f64::INFINITY, f64::min),
        MathFn::Random => rand_float(),
    };
    Ok(Value::Number(value))
}

/// Time-seeded LCG behind `Math.random`; the engine has no OS entropy
/// dependency.
#[allow(clippy::arithmetic_side_effects)]
fn rand_float() -> f64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static STATE: AtomicU64 = AtomicU64::new(0);
    let mut seed = STATE.load(Ordering::Relaxed);
    if seed == 0 {
        seed = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(1) as u64 | 1;
    }
    let next = seed
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    STATE.store(next, Ordering::Relaxed);
    ((next >> 11) as f64) / 9_007_199_254_740_992.0
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Bool(true) => 1.0,
        Value::Bool(false) | Value::Null => 0.0,
        Value::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn slice_index(arg: Option<&Value>, default: usize, len: usize) -> usize {
    match arg {
        Some(Value::Number(n)) => {
            if *n < 0.0 {
                len.saturating_sub((-*n) as usize)
            } else {
                (*n as usize).min(len)
            }
        },
        _ => default,
    }
}

/// Parse `fetch` options: `{method, headers, body}`.
fn fetch_options(
    options: Option<&Value>,
) -> (
    String,
    Option<std::collections::BTreeMap<String, String>>,
    Option<String>,
) {
    let Some(Value::Object(map)) = options else {
        return ("GET".to_string(), None, None);
    };
    let map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let method = match map.get("method") {
        Some(Value::Str(m)) => m.to_uppercase(),
        _ => "GET".to_string(),
    };
    let headers = match map.get("headers") {
        Some(Value::Object(headers)) => {
            let headers = headers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Some(
                headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.render()))
                    .collect(),
            )
        },
        _ => None,
    };
    let body = match map.get("body") {
        Some(Value::Str(b)) => Some(b.clone()),
        Some(other @ (Value::Object(_) | Value::Array(_))) => {
            other.to_json().ok().map(|j| j.to_string())
        },
        _ => None,
    };
    (method, headers, body)
}

/// Build the wire operation for a `files.*` call.
fn fs_operation(file_fn: FileFn, args: &[Value]) -> EvalResult<FsOperation> {
    let path = |i: usize| -> EvalResult<String> {
        match args.get(i) {
            Some(Value::Str(s)) => Ok(s.clone()),
            _ => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                "path must be a string",
            )),
        }
    };
    let contents = |i: usize| -> EvalResult<String> {
        match args.get(i) {
            Some(Value::Str(s)) => Ok(s.clone()),
            Some(other) => Ok(other.render()),
            None => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                "contents are required",
            )),
        }
    };
    Ok(match file_fn {
        FileFn::Read => FsOperation::Read { path: path(0)? },
        FileFn::Write => FsOperation::Write {
            path: path(0)?,
            contents: contents(1)?,
        },
        FileFn::Append => FsOperation::Append {
            path: path(0)?,
            contents: contents(1)?,
        },
        FileFn::List => FsOperation::List {
            path: match args.first() {
                Some(Value::Str(s)) => s.clone(),
                _ => String::new(),
            },
        },
        FileFn::Remove => FsOperation::Remove { path: path(0)? },
        FileFn::Rename => FsOperation::Rename {
            from: path(0)?,
            to: path(1)?,
        },
        FileFn::Copy => FsOperation::Copy {
            from: path(0)?,
            to: path(1)?,
        },
        FileFn::Exists => FsOperation::Exists { path: path(0)? },
        FileFn::Stat => FsOperation::Stat { path: path(0)? },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("github"), "github");
        assert_eq!(sanitize_identifier("my-server"), "my_server");
        assert_eq!(sanitize_identifier("2fast"), "_2fast");
        assert_eq!(sanitize_identifier("a.b:c"), "a_b_c");
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(&Value::Str(" 42 ".into())), 42.0);
        assert!(to_number(&Value::Str("nope".into())).is_nan());
        assert_eq!(to_number(&Value::Bool(true)), 1.0);
    }

    #[test]
    fn test_slice_index() {
        assert_eq!(slice_index(Some(&Value::Number(-2.0)), 0, 5), 3);
        assert_eq!(slice_index(Some(&Value::Number(99.0)), 0, 5), 5);
        assert_eq!(slice_index(None, 5, 5), 5);
    }

    #[test]
    fn test_fetch_options_defaults() {
        let (method, headers, body) = fetch_options(None);
        assert_eq!(method, "GET");
        assert!(headers.is_none());
        assert!(body.is_none());
    }
}
