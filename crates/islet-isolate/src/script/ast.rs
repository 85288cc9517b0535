//! The engine's owned instruction tree.
//!
//! Submissions are lowered from the OXC AST into this tree on the host
//! (or in the worker, for subprocess tiers) and interpreted from it.
//! The tree is deliberately small: it covers the Code-Mode surface, not
//! the whole language. Anything outside the subset fails lowering with
//! a clear message instead of silently misbehaving.

/// A statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    /// `const` / `let` / `var` declaration.
    Declare {
        /// Variable name.
        name: String,
        /// Initializer, when present.
        init: Option<Expr>,
    },
    /// Expression statement.
    Expr(Expr),
    /// `if` / `else`.
    If {
        /// Condition.
        cond: Expr,
        /// Then branch.
        then: Vec<Stmt>,
        /// Else branch.
        otherwise: Option<Vec<Stmt>>,
    },
    /// `while` loop.
    While {
        /// Condition.
        cond: Expr,
        /// Body.
        body: Vec<Stmt>,
    },
    /// `for (const x of iterable)`.
    ForOf {
        /// Loop variable.
        name: String,
        /// Iterable expression.
        iterable: Expr,
        /// Body.
        body: Vec<Stmt>,
    },
    /// `return`.
    Return(Option<Expr>),
    /// `throw`.
    Throw(Expr),
    /// `try` / `catch` / `finally`.
    Try {
        /// Protected body.
        body: Vec<Stmt>,
        /// Catch binding and body.
        catch: Option<(Option<String>, Vec<Stmt>)>,
        /// Finally body.
        finally: Option<Vec<Stmt>>,
    },
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// `function name(params) { ... }` (always async-capable).
    FuncDecl {
        /// Function name.
        name: String,
        /// Parameter names.
        params: Vec<String>,
        /// Body.
        body: Vec<Stmt>,
    },
    /// A bare block.
    Block(Vec<Stmt>),
}

/// Property access form.
#[derive(Debug, Clone)]
pub enum PropAccess {
    /// `obj.name`
    Static(String),
    /// `obj[expr]`
    Computed(Box<Expr>),
}

/// Assignment target.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    /// `x = ...`
    Ident(String),
    /// `obj.prop = ...` / `obj[expr] = ...`
    Member {
        /// The object expression.
        object: Box<Expr>,
        /// The property being assigned.
        property: PropAccess,
    },
}

/// One part of a template literal.
#[derive(Debug, Clone)]
pub enum TemplatePart {
    /// Literal text.
    Text(String),
    /// Interpolated expression.
    Interp(Expr),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==` / `===` (the engine treats both as strict)
    Eq,
    /// `!=` / `!==`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
    /// `typeof`
    Typeof,
}

/// An expression.
#[derive(Debug, Clone)]
pub enum Expr {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Number literal.
    Num(f64),
    /// String literal.
    Str(String),
    /// Template literal.
    Template(Vec<TemplatePart>),
    /// Array literal. `spread` marks elements written as `...expr`.
    Array(Vec<(Expr, bool)>),
    /// Object literal with string keys.
    Object(Vec<(String, Expr)>),
    /// Identifier reference.
    Ident(String),
    /// Member access.
    Member {
        /// The object.
        object: Box<Expr>,
        /// The property.
        property: PropAccess,
        /// Whether access was written as optional (`?.`).
        optional: bool,
    },
    /// Call. `spread` marks arguments written as `...expr`.
    Call {
        /// Callee expression.
        callee: Box<Expr>,
        /// Arguments.
        args: Vec<(Expr, bool)>,
    },
    /// Unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Binary operation.
    Binary {
        /// Operator.
        op: BinOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Short-circuit logical operation.
    Logical {
        /// Operator.
        op: LogicalOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Conditional `a ? b : c`.
    Cond {
        /// Condition.
        cond: Box<Expr>,
        /// Value when truthy.
        then: Box<Expr>,
        /// Value when falsy.
        otherwise: Box<Expr>,
    },
    /// Assignment as an expression.
    Assign {
        /// Target.
        target: AssignTarget,
        /// Compound operator, e.g. `+=`.
        op: Option<BinOp>,
        /// Value.
        value: Box<Expr>,
    },
    /// Arrow function (async-capable).
    Arrow {
        /// Parameter names.
        params: Vec<String>,
        /// Body statements; expression bodies lower to a single
        /// `Return`.
        body: Vec<Stmt>,
    },
    /// `await expr`.
    Await(Box<Expr>),
}
