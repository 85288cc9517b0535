//! The tree-walking engine.
//!
//! Executes the lowered instruction tree. Every statement and expression
//! consumes budget; every broker-mediated effect suspends until the
//! trusted side answers; every member access is checked against the
//! reflective names the sandbox forbids. The engine has no ambient
//! authority: its only capabilities are the [`HostServices`] it was
//! constructed with.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use islet_core::{ErrorKind, ErrorRecord};
use serde_json::Value as Json;

use crate::broker::HostServices;
use crate::protocol::{BindingSurface, EngineLimits};

use super::ast::{AssignTarget, BinOp, Expr, LogicalOp, PropAccess, Stmt, TemplatePart, UnaryOp};
use super::value::{
    assign, child_env, declare, lookup, Closure, Env, Scope, Value,
};

/// Property names whose access is refused at runtime. The static
/// analyzer rejects them earlier; this is the engine-level backstop.
pub(crate) const FORBIDDEN_PROPERTIES: &[&str] = &["__proto__", "prototype", "constructor"];

/// Why evaluation stopped early.
#[derive(Debug)]
pub enum Interrupt {
    /// A value was thrown; `try`/`catch` can observe it.
    Thrown(Value),
    /// The engine itself must stop; not catchable by untrusted code.
    Fatal(ErrorRecord),
}

impl Interrupt {
    /// Build a catchable error value `{message, kind, source?}`.
    pub(crate) fn thrown(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Thrown(error_value(&ErrorRecord::new(kind, message)))
    }

    /// Render the interrupt as a terminal error record.
    #[must_use]
    pub fn into_record(self) -> ErrorRecord {
        match self {
            Self::Fatal(record) => record,
            Self::Thrown(value) => thrown_to_record(&value),
        }
    }
}

/// Build the value form of an error record, as seen by untrusted code.
pub(crate) fn error_value(record: &ErrorRecord) -> Value {
    let mut map = std::collections::BTreeMap::new();
    map.insert("message".to_string(), Value::Str(record.message.clone()));
    map.insert("kind".to_string(), Value::Str(record.kind.to_string()));
    if let Some(source) = &record.source {
        map.insert("source".to_string(), Value::Str(source.clone()));
    }
    Value::object(map)
}

/// Recover a record from a thrown value, preserving a structured kind
/// when the value carries one.
fn thrown_to_record(value: &Value) -> ErrorRecord {
    if let Value::Object(map) = value {
        let map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let message = match map.get("message") {
            Some(Value::Str(s)) => s.clone(),
            _ => Value::Object(Arc::new(Mutex::new(map.clone()))).render(),
        };
        let kind = match map.get("kind") {
            Some(Value::Str(s)) => parse_kind(s),
            _ => ErrorKind::Downstream,
        };
        let mut record = ErrorRecord::new(kind, message);
        if let Some(Value::Str(source)) = map.get("source") {
            record = record.with_source(source.clone());
        }
        return record;
    }
    ErrorRecord::new(ErrorKind::Downstream, format!("uncaught: {}", value.render()))
}

fn parse_kind(s: &str) -> ErrorKind {
    match s {
        "validation" => ErrorKind::Validation,
        "sandbox_escape" => ErrorKind::SandboxEscape,
        "policy_denied" => ErrorKind::PolicyDenied,
        "timeout" => ErrorKind::Timeout,
        "resource_exhaustion" => ErrorKind::ResourceExhaustion,
        "broker" => ErrorKind::Broker,
        _ => ErrorKind::Downstream,
    }
}

/// Statement outcome for control flow.
pub(crate) enum Flow {
    /// Keep going.
    Normal,
    /// `return` with a value.
    Return(Value),
    /// `break` out of the nearest loop.
    Break,
    /// `continue` the nearest loop.
    Continue,
}

type EvalResult<T> = Result<T, Interrupt>;

/// The engine for one submission.
pub struct Engine {
    pub(crate) services: Arc<dyn HostServices>,
    pub(crate) limits: EngineLimits,
    steps: AtomicU64,
    pub(crate) allocations: AtomicU64,
    depth: AtomicU32,
    logs: Mutex<Vec<String>>,
}

impl Engine {
    /// Create an engine bound to its host services.
    #[must_use]
    pub fn new(services: Arc<dyn HostServices>, limits: EngineLimits) -> Self {
        Self {
            services,
            limits,
            steps: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
            depth: AtomicU32::new(0),
            logs: Mutex::new(Vec::new()),
        }
    }

    /// Execute a lowered program and produce `(value, logs, error)`.
    ///
    /// The global scope surfaces the given tools and bindings plus the
    /// pure intrinsics; nothing else exists.
    pub async fn run(
        &self,
        program: &[Stmt],
        tools: &[islet_core::ToolDescriptor],
        bindings: &[BindingSurface],
    ) -> (Option<Json>, Vec<String>, Option<ErrorRecord>) {
        let globals: Env = Arc::new(Mutex::new(Scope::default()));
        self.install_globals(&globals, tools, bindings);

        let outcome = self.exec_block(program, &globals).await;
        let logs = self
            .logs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        match outcome {
            Ok(Flow::Return(value)) => match value {
                Value::Undefined => (None, logs, None),
                other => match other.to_json() {
                    Ok(json) => (Some(json), logs, None),
                    Err(reason) => (
                        None,
                        logs,
                        Some(ErrorRecord::new(
                            ErrorKind::Downstream,
                            format!("result is not serializable: {reason}"),
                        )),
                    ),
                },
            },
            Ok(_) => (None, logs, None),
            Err(interrupt) => (None, logs, Some(interrupt.into_record())),
        }
    }

    /// Record a log line in emission order, mirrored to the host.
    pub(crate) fn log(&self, line: String) {
        {
            let mut logs = self
                .logs
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            logs.push(line.clone());
        }
        self.services.log(line);
    }

    /// Consume one evaluation step.
    pub(crate) fn step(&self) -> EvalResult<()> {
        let used = self.steps.fetch_add(1, Ordering::Relaxed);
        if used >= self.limits.instruction_budget {
            return Err(Interrupt::Fatal(ErrorRecord::new(
                ErrorKind::ResourceExhaustion,
                format!(
                    "instruction budget of {} exhausted",
                    self.limits.instruction_budget
                ),
            )));
        }
        Ok(())
    }

    /// Yield to the host scheduler periodically so deadlines and
    /// cancellation can preempt compute-only code.
    pub(crate) async fn maybe_yield(&self) {
        if self.steps.load(Ordering::Relaxed) % 512 == 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Consume allocation budget.
    pub(crate) fn alloc(&self, count: u64) -> EvalResult<()> {
        let used = self.allocations.fetch_add(count, Ordering::Relaxed);
        if used.saturating_add(count) >= self.limits.value_budget {
            return Err(Interrupt::Fatal(ErrorRecord::new(
                ErrorKind::ResourceExhaustion,
                format!("value budget of {} exhausted", self.limits.value_budget),
            )));
        }
        Ok(())
    }

    /// Refuse the reflective properties, audited.
    pub(crate) fn check_property(&self, name: &str) -> EvalResult<()> {
        if FORBIDDEN_PROPERTIES.contains(&name) {
            let description = format!("runtime access to `{name}` blocked");
            self.services.security_violation(description.clone());
            return Err(Interrupt::thrown(ErrorKind::PolicyDenied, description));
        }
        Ok(())
    }

    pub(crate) fn exec_block<'a>(
        &'a self,
        statements: &'a [Stmt],
        env: &'a Env,
    ) -> BoxFuture<'a, EvalResult<Flow>> {
        async move {
            // Function declarations are visible before their statement
            // position, matching source-language hoisting.
            for stmt in statements {
                if let Stmt::FuncDecl { name, params, body } = stmt {
                    declare(
                        env,
                        name,
                        Value::Closure(Arc::new(Closure {
                            params: params.clone(),
                            body: Arc::new(body.clone()),
                            env: Arc::clone(env),
                        })),
                    );
                }
            }
            for stmt in statements {
                match self.exec_stmt(stmt, env).await? {
                    Flow::Normal => {},
                    other => return Ok(other),
                }
            }
            Ok(Flow::Normal)
        }
        .boxed()
    }

    fn exec_stmt<'a>(&'a self, stmt: &'a Stmt, env: &'a Env) -> BoxFuture<'a, EvalResult<Flow>> {
        async move {
            self.step()?;
            self.maybe_yield().await;
            match stmt {
                Stmt::Declare { name, init } => {
                    let value = match init {
                        Some(expr) => self.eval(expr, env).await?,
                        None => Value::Undefined,
                    };
                    declare(env, name, value);
                    Ok(Flow::Normal)
                },
                Stmt::Expr(expr) => {
                    self.eval(expr, env).await?;
                    Ok(Flow::Normal)
                },
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.eval(cond, env).await?.is_truthy() {
                        self.exec_block(then, &child_env(env)).await
                    } else if let Some(otherwise) = otherwise {
                        self.exec_block(otherwise, &child_env(env)).await
                    } else {
                        Ok(Flow::Normal)
                    }
                },
                Stmt::While { cond, body } => {
                    while self.eval(cond, env).await?.is_truthy() {
                        self.step()?;
                        match self.exec_block(body, &child_env(env)).await? {
                            Flow::Break => break,
                            Flow::Continue | Flow::Normal => {},
                            flow @ Flow::Return(_) => return Ok(flow),
                        }
                    }
                    Ok(Flow::Normal)
                },
                Stmt::ForOf {
                    name,
                    iterable,
                    body,
                } => {
                    let items = match self.eval(iterable, env).await? {
                        Value::Array(items) => {
                            let items = items
                                .lock()
                                .unwrap_or_else(std::sync::PoisonError::into_inner);
                            items.clone()
                        },
                        Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                        other => {
                            return Err(Interrupt::thrown(
                                ErrorKind::Downstream,
                                format!("{} is not iterable", other.type_of()),
                            ))
                        },
                    };
                    for item in items {
                        self.step()?;
                        let scope = child_env(env);
                        declare(&scope, name, item);
                        match self.exec_block(body, &scope).await? {
                            Flow::Break => break,
                            Flow::Continue | Flow::Normal => {},
                            flow @ Flow::Return(_) => return Ok(flow),
                        }
                    }
                    Ok(Flow::Normal)
                },
                Stmt::Return(expr) => {
                    let value = match expr {
                        Some(expr) => self.eval(expr, env).await?,
                        None => Value::Undefined,
                    };
                    Ok(Flow::Return(value))
                },
                Stmt::Throw(expr) => {
                    let value = self.eval(expr, env).await?;
                    Err(Interrupt::Thrown(value))
                },
                Stmt::Try {
                    body,
                    catch,
                    finally,
                } => {
                    let mut outcome = self.exec_block(body, &child_env(env)).await;
                    if let Err(Interrupt::Thrown(thrown)) = outcome {
                        if let Some((binding, handler)) = catch {
                            let scope = child_env(env);
                            if let Some(binding) = binding {
                                declare(&scope, binding, thrown);
                            }
                            outcome = self.exec_block(handler, &scope).await;
                        } else {
                            outcome = Err(Interrupt::Thrown(thrown));
                        }
                    }
                    if let Some(finally) = finally {
                        match self.exec_block(finally, &child_env(env)).await? {
                            Flow::Normal => {},
                            flow => return Ok(flow),
                        }
                    }
                    outcome
                },
                Stmt::Break => Ok(Flow::Break),
                Stmt::Continue => Ok(Flow::Continue),
                // Hoisted by exec_block.
                Stmt::FuncDecl { .. } => Ok(Flow::Normal),
                Stmt::Block(statements) => self.exec_block(statements, &child_env(env)).await,
            }
        }
        .boxed()
    }

    pub(crate) fn eval<'a>(
        &'a self,
        expr: &'a Expr,
        env: &'a Env,
    ) -> BoxFuture<'a, EvalResult<Value>> {
        async move {
            self.step()?;
            match expr {
                Expr::Undefined => Ok(Value::Undefined),
                Expr::Null => Ok(Value::Null),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Num(n) => Ok(Value::Number(*n)),
                Expr::Str(s) => Ok(Value::Str(s.clone())),
                Expr::Template(parts) => {
                    let mut out = String::new();
                    for part in parts {
                        match part {
                            TemplatePart::Text(text) => out.push_str(text),
                            TemplatePart::Interp(expr) => {
                                out.push_str(&self.eval(expr, env).await?.render());
                            },
                        }
                    }
                    self.alloc(1)?;
                    Ok(Value::Str(out))
                },
                Expr::Array(items) => {
                    let mut out = Vec::new();
                    for (item, spread) in items {
                        let value = self.eval(item, env).await?;
                        if *spread {
                            match value {
                                Value::Array(inner) => {
                                    let inner = inner
                                        .lock()
                                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                                    out.extend(inner.iter().cloned());
                                },
                                other => {
                                    return Err(Interrupt::thrown(
                                        ErrorKind::Downstream,
                                        format!("cannot spread {}", other.type_of()),
                                    ))
                                },
                            }
                        } else {
                            out.push(value);
                        }
                    }
                    self.alloc(out.len().max(1) as u64)?;
                    Ok(Value::array(out))
                },
                Expr::Object(entries) => {
                    let mut map = std::collections::BTreeMap::new();
                    for (key, value) in entries {
                        self.check_property(key)?;
                        map.insert(key.clone(), self.eval(value, env).await?);
                    }
                    self.alloc(map.len().max(1) as u64)?;
                    Ok(Value::object(map))
                },
                Expr::Ident(name) => lookup(env, name).ok_or_else(|| {
                    Interrupt::thrown(ErrorKind::Downstream, format!("{name} is not defined"))
                }),
                Expr::Member {
                    object,
                    property,
                    optional,
                } => {
                    let object = self.eval(object, env).await?;
                    if *optional && matches!(object, Value::Undefined | Value::Null) {
                        return Ok(Value::Undefined);
                    }
                    let key = self.property_key(property, env).await?;
                    self.get_member(&object, &key)
                },
                Expr::Call { callee, args } => self.eval_call(callee, args, env).await,
                Expr::Unary { op, operand } => {
                    let value = self.eval(operand, env).await?;
                    match op {
                        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                        UnaryOp::Neg => match value {
                            Value::Number(n) => Ok(Value::Number(-n)),
                            other => Err(Interrupt::thrown(
                                ErrorKind::Downstream,
                                format!("cannot negate {}", other.type_of()),
                            )),
                        },
                        UnaryOp::Typeof => Ok(Value::Str(value.type_of().to_string())),
                    }
                },
                Expr::Binary { op, left, right } => {
                    let left = self.eval(left, env).await?;
                    let right = self.eval(right, env).await?;
                    self.binary(*op, &left, &right)
                },
                Expr::Logical { op, left, right } => {
                    let left = self.eval(left, env).await?;
                    let take_right = match op {
                        LogicalOp::And => left.is_truthy(),
                        LogicalOp::Or => !left.is_truthy(),
                        LogicalOp::Nullish => matches!(left, Value::Undefined | Value::Null),
                    };
                    if take_right {
                        self.eval(right, env).await
                    } else {
                        Ok(left)
                    }
                },
                Expr::Cond {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.eval(cond, env).await?.is_truthy() {
                        self.eval(then, env).await
                    } else {
                        self.eval(otherwise, env).await
                    }
                },
                Expr::Assign { target, op, value } => {
                    let mut value = self.eval(value, env).await?;
                    if let Some(op) = op {
                        let current = self.read_target(target, env).await?;
                        value = self.binary(*op, &current, &value)?;
                    }
                    self.write_target(target, value.clone(), env).await?;
                    Ok(value)
                },
                Expr::Arrow { params, body } => {
                    self.alloc(1)?;
                    Ok(Value::Closure(Arc::new(Closure {
                        params: params.clone(),
                        body: Arc::new(body.clone()),
                        env: Arc::clone(env),
                    })))
                },
                // Broker calls resolve eagerly, so awaiting is pass-through.
                Expr::Await(inner) => self.eval(inner, env).await,
            }
        }
        .boxed()
    }

    async fn property_key(&self, property: &PropAccess, env: &Env) -> EvalResult<String> {
        let key = match property {
            PropAccess::Static(name) => name.clone(),
            PropAccess::Computed(expr) => match self.eval(expr, env).await? {
                Value::Str(s) => s,
                Value::Number(n) => Value::Number(n).render(),
                other => {
                    return Err(Interrupt::thrown(
                        ErrorKind::Downstream,
                        format!("invalid property key of type {}", other.type_of()),
                    ))
                },
            },
        };
        self.check_property(&key)?;
        Ok(key)
    }

    fn get_member(&self, object: &Value, key: &str) -> EvalResult<Value> {
        match object {
            Value::Object(map) => {
                let map = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                Ok(map.get(key).cloned().unwrap_or(Value::Undefined))
            },
            Value::Array(items) => {
                let items = items
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if key == "length" {
                    return Ok(Value::Number(items.len() as f64));
                }
                match key.parse::<usize>() {
                    Ok(index) => Ok(items.get(index).cloned().unwrap_or(Value::Undefined)),
                    Err(_) => Ok(Value::Undefined),
                }
            },
            Value::Str(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                match key.parse::<usize>() {
                    Ok(index) => Ok(s
                        .chars()
                        .nth(index)
                        .map_or(Value::Undefined, |c| Value::Str(c.to_string()))),
                    Err(_) => Ok(Value::Undefined),
                }
            },
            Value::Undefined | Value::Null => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                format!("cannot read property `{key}` of {}", object.render()),
            )),
            _ => Ok(Value::Undefined),
        }
    }

    async fn read_target(&self, target: &AssignTarget, env: &Env) -> EvalResult<Value> {
        match target {
            AssignTarget::Ident(name) => lookup(env, name).ok_or_else(|| {
                Interrupt::thrown(ErrorKind::Downstream, format!("{name} is not defined"))
            }),
            AssignTarget::Member { object, property } => {
                let object = self.eval(object, env).await?;
                let key = self.property_key(property, env).await?;
                self.get_member(&object, &key)
            },
        }
    }

    async fn write_target(&self, target: &AssignTarget, value: Value, env: &Env) -> EvalResult<()> {
        match target {
            AssignTarget::Ident(name) => {
                if assign(env, name, value) {
                    Ok(())
                } else {
                    Err(Interrupt::thrown(
                        ErrorKind::Downstream,
                        format!("{name} is not defined"),
                    ))
                }
            },
            AssignTarget::Member { object, property } => {
                let object = self.eval(object, env).await?;
                let key = self.property_key(property, env).await?;
                match object {
                    Value::Object(map) => {
                        let mut map =
                            map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                        map.insert(key, value);
                        Ok(())
                    },
                    Value::Array(items) => {
                        let mut items = items
                            .lock()
                            .unwrap_or_else(std::sync::PoisonError::into_inner);
                        match key.parse::<usize>() {
                            Ok(index) if index <= items.len() => {
                                if index == items.len() {
                                    items.push(value);
                                } else {
                                    items[index] = value;
                                }
                                Ok(())
                            },
                            _ => Err(Interrupt::thrown(
                                ErrorKind::Downstream,
                                format!("invalid array index {key}"),
                            )),
                        }
                    },
                    other => Err(Interrupt::thrown(
                        ErrorKind::Downstream,
                        format!("cannot assign property on {}", other.type_of()),
                    )),
                }
            },
        }
    }

    fn binary(&self, op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
        use Value::{Number, Str};
        let type_error = |op: &str| {
            Interrupt::thrown(
                ErrorKind::Downstream,
                format!(
                    "cannot apply `{op}` to {} and {}",
                    left.type_of(),
                    right.type_of()
                ),
            )
        };
        match op {
            BinOp::Add => match (left, right) {
                (Number(a), Number(b)) => Ok(Number(a + b)),
                (Str(_), _) | (_, Str(_)) => {
                    self.alloc(1)?;
                    Ok(Str(format!("{}{}", left.render(), right.render())))
                },
                _ => Err(type_error("+")),
            },
            BinOp::Sub => self.numeric(left, right, "-", |a, b| a - b),
            BinOp::Mul => self.numeric(left, right, "*", |a, b| a * b),
            BinOp::Div => self.numeric(left, right, "/", |a, b| a / b),
            BinOp::Rem => self.numeric(left, right, "%", |a, b| a % b),
            BinOp::Eq => Ok(Value::Bool(left.strict_eq(right))),
            BinOp::NotEq => Ok(Value::Bool(!left.strict_eq(right))),
            BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
                let ordering = match (left, right) {
                    (Number(a), Number(b)) => a.partial_cmp(b),
                    (Str(a), Str(b)) => Some(a.cmp(b)),
                    _ => return Err(type_error("comparison")),
                };
                let Some(ordering) = ordering else {
                    return Ok(Value::Bool(false));
                };
                let result = match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::LtEq => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(result))
            },
        }
    }

    #[allow(clippy::unused_self)]
    fn numeric(
        &self,
        left: &Value,
        right: &Value,
        op: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> EvalResult<Value> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(*a, *b))),
            _ => Err(Interrupt::thrown(
                ErrorKind::Downstream,
                format!(
                    "cannot apply `{op}` to {} and {}",
                    left.type_of(),
                    right.type_of()
                ),
            )),
        }
    }

    /// Call a user closure.
    pub(crate) fn call_closure<'a>(
        &'a self,
        closure: &'a Closure,
        args: Vec<Value>,
    ) -> BoxFuture<'a, EvalResult<Value>> {
        async move {
            let depth = self.depth.fetch_add(1, Ordering::Relaxed);
            if depth >= self.limits.max_call_depth {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                return Err(Interrupt::Fatal(ErrorRecord::new(
                    ErrorKind::ResourceExhaustion,
                    format!("call depth limit of {} exceeded", self.limits.max_call_depth),
                )));
            }
            let scope = child_env(&closure.env);
            for (i, param) in closure.params.iter().enumerate() {
                declare(&scope, param, args.get(i).cloned().unwrap_or(Value::Undefined));
            }
            let outcome = self.exec_block(&closure.body, &scope).await;
            self.depth.fetch_sub(1, Ordering::Relaxed);
            match outcome? {
                Flow::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            }
        }
        .boxed()
    }
}
