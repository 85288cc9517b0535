//! Lowering from the OXC AST to the engine's instruction tree.
//!
//! The submission is parsed as the body of an async arrow function so
//! top-level `await` and `return` are legal, then lowered statement by
//! statement. Constructs outside the engine subset fail here with a
//! message naming them; nothing is silently skipped.

use oxc::ast::ast as js;
use oxc::parser::Parser;
use oxc::span::SourceType;
use oxc_allocator::Allocator;
use thiserror::Error;

use super::ast::{
    AssignTarget, BinOp, Expr, LogicalOp, PropAccess, Stmt, TemplatePart, UnaryOp,
};

const WRAPPER_PREFIX: &str = "async () => {\n";
const WRAPPER_SUFFIX: &str = "\n}";

/// Lowering failure: a parse error or an unsupported construct.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LowerError {
    /// What failed to lower.
    pub message: String,
}

impl LowerError {
    fn unsupported(what: &str) -> Self {
        Self {
            message: format!("unsupported syntax: {what}"),
        }
    }
}

type LowerResult<T> = Result<T, LowerError>;

/// Parse and lower a submission into the engine's instruction tree.
///
/// # Errors
///
/// Fails on parse errors and on constructs outside the engine subset.
pub fn lower(code: &str) -> LowerResult<Vec<Stmt>> {
    let wrapped = format!("{WRAPPER_PREFIX}{code}{WRAPPER_SUFFIX}");
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &wrapped, SourceType::mjs()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let first = ret
            .errors
            .first()
            .map_or_else(|| "unknown parse error".to_string(), |e| format!("{e}"));
        return Err(LowerError {
            message: format!("parse error: {first}"),
        });
    }

    // The wrapper guarantees the shape: one expression statement holding
    // an async arrow whose block body is the submission.
    let Some(js::Statement::ExpressionStatement(stmt)) = ret.program.body.first() else {
        return Err(LowerError::unsupported("wrapper shape"));
    };
    let js::Expression::ArrowFunctionExpression(arrow) = &stmt.expression else {
        return Err(LowerError::unsupported("wrapper shape"));
    };
    lower_statements(&arrow.body.statements)
}

fn lower_statements(statements: &[js::Statement<'_>]) -> LowerResult<Vec<Stmt>> {
    statements.iter().map(lower_statement).collect()
}

fn lower_block(statement: &js::Statement<'_>) -> LowerResult<Vec<Stmt>> {
    match statement {
        js::Statement::BlockStatement(block) => lower_statements(&block.body),
        other => Ok(vec![lower_statement(other)?]),
    }
}

fn lower_statement(statement: &js::Statement<'_>) -> LowerResult<Stmt> {
    match statement {
        js::Statement::VariableDeclaration(decl) => {
            let mut stmts = Vec::new();
            for declarator in &decl.declarations {
                stmts.push(Stmt::Declare {
                    name: binding_name(&declarator.id)?,
                    init: declarator.init.as_ref().map(lower_expr).transpose()?,
                });
            }
            if stmts.len() == 1 {
                Ok(stmts.remove(0))
            } else {
                Ok(Stmt::Block(stmts))
            }
        },
        js::Statement::ExpressionStatement(stmt) => Ok(Stmt::Expr(lower_expr(&stmt.expression)?)),
        js::Statement::IfStatement(stmt) => Ok(Stmt::If {
            cond: lower_expr(&stmt.test)?,
            then: lower_block(&stmt.consequent)?,
            otherwise: stmt.alternate.as_ref().map(lower_block).transpose()?,
        }),
        js::Statement::WhileStatement(stmt) => Ok(Stmt::While {
            cond: lower_expr(&stmt.test)?,
            body: lower_block(&stmt.body)?,
        }),
        js::Statement::ForOfStatement(stmt) => {
            let name = match &stmt.left {
                js::ForStatementLeft::VariableDeclaration(decl) => {
                    let declarator = decl
                        .declarations
                        .first()
                        .ok_or_else(|| LowerError::unsupported("empty for-of binding"))?;
                    binding_name(&declarator.id)?
                },
                _ => return Err(LowerError::unsupported("for-of over a non-declaration")),
            };
            Ok(Stmt::ForOf {
                name,
                iterable: lower_expr(&stmt.right)?,
                body: lower_block(&stmt.body)?,
            })
        },
        js::Statement::ForStatement(stmt) => lower_classic_for(stmt),
        js::Statement::ReturnStatement(stmt) => Ok(Stmt::Return(
            stmt.argument.as_ref().map(lower_expr).transpose()?,
        )),
        js::Statement::ThrowStatement(stmt) => Ok(Stmt::Throw(lower_expr(&stmt.argument)?)),
        js::Statement::TryStatement(stmt) => {
            let catch = stmt
                .handler
                .as_ref()
                .map(|handler| -> LowerResult<(Option<String>, Vec<Stmt>)> {
                    let binding = handler
                        .param
                        .as_ref()
                        .map(|p| binding_name(&p.pattern))
                        .transpose()?;
                    Ok((binding, lower_statements(&handler.body.body)?))
                })
                .transpose()?;
            let finally = stmt
                .finalizer
                .as_ref()
                .map(|f| lower_statements(&f.body))
                .transpose()?;
            Ok(Stmt::Try {
                body: lower_statements(&stmt.block.body)?,
                catch,
                finally,
            })
        },
        js::Statement::BreakStatement(_) => Ok(Stmt::Break),
        js::Statement::ContinueStatement(_) => Ok(Stmt::Continue),
        js::Statement::FunctionDeclaration(func) => {
            let name = func
                .id
                .as_ref()
                .map(|id| id.name.to_string())
                .ok_or_else(|| LowerError::unsupported("anonymous function declaration"))?;
            let (params, body) = lower_function(func)?;
            Ok(Stmt::FuncDecl { name, params, body })
        },
        js::Statement::BlockStatement(block) => Ok(Stmt::Block(lower_statements(&block.body)?)),
        js::Statement::EmptyStatement(_) => Ok(Stmt::Block(Vec::new())),
        other => Err(LowerError::unsupported(statement_name(other))),
    }
}

/// `for (init; test; update) body` lowers to a declaration plus a
/// budgeted while loop with the update appended.
fn lower_classic_for(stmt: &js::ForStatement<'_>) -> LowerResult<Stmt> {
    let mut outer = Vec::new();
    if let Some(init) = &stmt.init {
        match init {
            js::ForStatementInit::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    outer.push(Stmt::Declare {
                        name: binding_name(&declarator.id)?,
                        init: declarator.init.as_ref().map(lower_expr).transpose()?,
                    });
                }
            },
            other => {
                let expr = other
                    .as_expression()
                    .ok_or_else(|| LowerError::unsupported("for-loop initializer"))?;
                outer.push(Stmt::Expr(lower_expr(expr)?));
            },
        }
    }
    let cond = stmt
        .test
        .as_ref()
        .map_or(Ok(Expr::Bool(true)), lower_expr)?;
    let mut body = lower_block(&stmt.body)?;
    if let Some(update) = &stmt.update {
        body.push(Stmt::Expr(lower_expr(update)?));
    }
    outer.push(Stmt::While { cond, body });
    Ok(Stmt::Block(outer))
}

fn lower_function(func: &js::Function<'_>) -> LowerResult<(Vec<String>, Vec<Stmt>)> {
    let params = lower_params(&func.params)?;
    let body = func
        .body
        .as_ref()
        .ok_or_else(|| LowerError::unsupported("bodyless function"))?;
    Ok((params, lower_statements(&body.statements)?))
}

fn lower_params(params: &js::FormalParameters<'_>) -> LowerResult<Vec<String>> {
    params
        .items
        .iter()
        .map(|p| binding_name(&p.pattern))
        .collect()
}

fn binding_name(pattern: &js::BindingPattern<'_>) -> LowerResult<String> {
    match pattern {
        js::BindingPattern::BindingIdentifier(ident) => Ok(ident.name.to_string()),
        _ => Err(LowerError::unsupported("destructuring binding")),
    }
}

#[allow(clippy::too_many_lines)]
fn lower_expr(expression: &js::Expression<'_>) -> LowerResult<Expr> {
    match expression {
        js::Expression::BooleanLiteral(lit) => Ok(Expr::Bool(lit.value)),
        js::Expression::NullLiteral(_) => Ok(Expr::Null),
        js::Expression::NumericLiteral(lit) => Ok(Expr::Num(lit.value)),
        js::Expression::StringLiteral(lit) => Ok(Expr::Str(lit.value.to_string())),
        js::Expression::TemplateLiteral(lit) => {
            let mut parts = Vec::new();
            let mut expressions = lit.expressions.iter();
            for quasi in &lit.quasis {
                let text = quasi
                    .value
                    .cooked
                    .as_ref()
                    .map_or_else(|| quasi.value.raw.to_string(), ToString::to_string);
                if !text.is_empty() {
                    parts.push(TemplatePart::Text(text));
                }
                if let Some(expr) = expressions.next() {
                    parts.push(TemplatePart::Interp(lower_expr(expr)?));
                }
            }
            Ok(Expr::Template(parts))
        },
        js::Expression::Identifier(ident) => {
            if ident.name == "undefined" {
                Ok(Expr::Undefined)
            } else {
                Ok(Expr::Ident(ident.name.to_string()))
            }
        },
        js::Expression::ArrayExpression(array) => {
            let mut items = Vec::new();
            for element in &array.elements {
                match element {
                    js::ArrayExpressionElement::SpreadElement(spread) => {
                        items.push((lower_expr(&spread.argument)?, true));
                    },
                    js::ArrayExpressionElement::Elision(_) => {
                        items.push((Expr::Undefined, false));
                    },
                    other => {
                        let expr = other
                            .as_expression()
                            .ok_or_else(|| LowerError::unsupported("array element"))?;
                        items.push((lower_expr(expr)?, false));
                    },
                }
            }
            Ok(Expr::Array(items))
        },
        js::Expression::ObjectExpression(object) => {
            let mut entries = Vec::new();
            for property in &object.properties {
                match property {
                    js::ObjectPropertyKind::ObjectProperty(prop) => {
                        let key = property_key(&prop.key)?;
                        entries.push((key, lower_expr(&prop.value)?));
                    },
                    js::ObjectPropertyKind::SpreadProperty(_) => {
                        return Err(LowerError::unsupported("object spread"));
                    },
                }
            }
            Ok(Expr::Object(entries))
        },
        js::Expression::StaticMemberExpression(member) => Ok(Expr::Member {
            object: Box::new(lower_expr(&member.object)?),
            property: PropAccess::Static(member.property.name.to_string()),
            optional: member.optional,
        }),
        js::Expression::ComputedMemberExpression(member) => Ok(Expr::Member {
            object: Box::new(lower_expr(&member.object)?),
            property: PropAccess::Computed(Box::new(lower_expr(&member.expression)?)),
            optional: member.optional,
        }),
        js::Expression::CallExpression(call) => lower_call(call),
        js::Expression::ChainExpression(chain) => match &chain.expression {
            js::ChainElement::CallExpression(call) => lower_call(call),
            js::ChainElement::StaticMemberExpression(member) => Ok(Expr::Member {
                object: Box::new(lower_expr(&member.object)?),
                property: PropAccess::Static(member.property.name.to_string()),
                optional: true,
            }),
            js::ChainElement::ComputedMemberExpression(member) => Ok(Expr::Member {
                object: Box::new(lower_expr(&member.object)?),
                property: PropAccess::Computed(Box::new(lower_expr(&member.expression)?)),
                optional: true,
            }),
            _ => Err(LowerError::unsupported("optional chain form")),
        },
        js::Expression::ParenthesizedExpression(inner) => lower_expr(&inner.expression),
        js::Expression::UnaryExpression(unary) => {
            let op = match unary.operator {
                js::UnaryOperator::LogicalNot => UnaryOp::Not,
                js::UnaryOperator::UnaryNegation => UnaryOp::Neg,
                js::UnaryOperator::Typeof => UnaryOp::Typeof,
                other => {
                    return Err(LowerError::unsupported(&format!(
                        "unary operator {}",
                        other.as_str()
                    )))
                },
            };
            Ok(Expr::Unary {
                op,
                operand: Box::new(lower_expr(&unary.argument)?),
            })
        },
        js::Expression::BinaryExpression(binary) => {
            let op = bin_op(binary.operator)?;
            Ok(Expr::Binary {
                op,
                left: Box::new(lower_expr(&binary.left)?),
                right: Box::new(lower_expr(&binary.right)?),
            })
        },
        js::Expression::LogicalExpression(logical) => {
            let op = match logical.operator {
                js::LogicalOperator::And => LogicalOp::And,
                js::LogicalOperator::Or => LogicalOp::Or,
                js::LogicalOperator::Coalesce => LogicalOp::Nullish,
            };
            Ok(Expr::Logical {
                op,
                left: Box::new(lower_expr(&logical.left)?),
                right: Box::new(lower_expr(&logical.right)?),
            })
        },
        js::Expression::ConditionalExpression(cond) => Ok(Expr::Cond {
            cond: Box::new(lower_expr(&cond.test)?),
            then: Box::new(lower_expr(&cond.consequent)?),
            otherwise: Box::new(lower_expr(&cond.alternate)?),
        }),
        js::Expression::AssignmentExpression(assign) => {
            let target = assignment_target(&assign.left)?;
            let op = match assign.operator {
                js::AssignmentOperator::Assign => None,
                js::AssignmentOperator::Addition => Some(BinOp::Add),
                js::AssignmentOperator::Subtraction => Some(BinOp::Sub),
                js::AssignmentOperator::Multiplication => Some(BinOp::Mul),
                js::AssignmentOperator::Division => Some(BinOp::Div),
                other => {
                    return Err(LowerError::unsupported(&format!(
                        "assignment operator {}",
                        other.as_str()
                    )))
                },
            };
            Ok(Expr::Assign {
                target,
                op,
                value: Box::new(lower_expr(&assign.right)?),
            })
        },
        js::Expression::UpdateExpression(update) => {
            let target = simple_assignment_target(&update.argument)?;
            let op = match update.operator {
                js::UpdateOperator::Increment => BinOp::Add,
                js::UpdateOperator::Decrement => BinOp::Sub,
            };
            Ok(Expr::Assign {
                target,
                op: Some(op),
                value: Box::new(Expr::Num(1.0)),
            })
        },
        js::Expression::ArrowFunctionExpression(arrow) => {
            let params = lower_params(&arrow.params)?;
            let body = if arrow.expression {
                let stmt = arrow
                    .body
                    .statements
                    .first()
                    .ok_or_else(|| LowerError::unsupported("empty arrow body"))?;
                match stmt {
                    js::Statement::ExpressionStatement(expr_stmt) => {
                        vec![Stmt::Return(Some(lower_expr(&expr_stmt.expression)?))]
                    },
                    _ => return Err(LowerError::unsupported("arrow expression body")),
                }
            } else {
                lower_statements(&arrow.body.statements)?
            };
            Ok(Expr::Arrow { params, body })
        },
        js::Expression::FunctionExpression(func) => {
            let (params, body) = lower_function(func)?;
            Ok(Expr::Arrow { params, body })
        },
        js::Expression::AwaitExpression(await_expr) => {
            Ok(Expr::Await(Box::new(lower_expr(&await_expr.argument)?)))
        },
        js::Expression::SequenceExpression(seq) => {
            if seq.expressions.len() == 1 {
                lower_expr(&seq.expressions[0])
            } else {
                Err(LowerError::unsupported("sequence expression"))
            }
        },
        other => Err(LowerError::unsupported(expression_name(other))),
    }
}

fn lower_call(call: &js::CallExpression<'_>) -> LowerResult<Expr> {
    let mut args = Vec::new();
    for argument in &call.arguments {
        match argument {
            js::Argument::SpreadElement(spread) => {
                args.push((lower_expr(&spread.argument)?, true));
            },
            other => {
                let expr = other
                    .as_expression()
                    .ok_or_else(|| LowerError::unsupported("call argument"))?;
                args.push((lower_expr(expr)?, false));
            },
        }
    }
    Ok(Expr::Call {
        callee: Box::new(lower_expr(&call.callee)?),
        args,
    })
}

fn property_key(key: &js::PropertyKey<'_>) -> LowerResult<String> {
    match key {
        js::PropertyKey::StaticIdentifier(ident) => Ok(ident.name.to_string()),
        js::PropertyKey::StringLiteral(lit) => Ok(lit.value.to_string()),
        js::PropertyKey::NumericLiteral(lit) => Ok(lit.value.to_string()),
        _ => Err(LowerError::unsupported("computed object key")),
    }
}

fn assignment_target(target: &js::AssignmentTarget<'_>) -> LowerResult<AssignTarget> {
    match target {
        js::AssignmentTarget::AssignmentTargetIdentifier(ident) => {
            Ok(AssignTarget::Ident(ident.name.to_string()))
        },
        js::AssignmentTarget::StaticMemberExpression(member) => Ok(AssignTarget::Member {
            object: Box::new(lower_expr(&member.object)?),
            property: PropAccess::Static(member.property.name.to_string()),
        }),
        js::AssignmentTarget::ComputedMemberExpression(member) => Ok(AssignTarget::Member {
            object: Box::new(lower_expr(&member.object)?),
            property: PropAccess::Computed(Box::new(lower_expr(&member.expression)?)),
        }),
        _ => Err(LowerError::unsupported("assignment target")),
    }
}

fn simple_assignment_target(
    target: &js::SimpleAssignmentTarget<'_>,
) -> LowerResult<AssignTarget> {
    match target {
        js::SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) => {
            Ok(AssignTarget::Ident(ident.name.to_string()))
        },
        js::SimpleAssignmentTarget::StaticMemberExpression(member) => Ok(AssignTarget::Member {
            object: Box::new(lower_expr(&member.object)?),
            property: PropAccess::Static(member.property.name.to_string()),
        }),
        js::SimpleAssignmentTarget::ComputedMemberExpression(member) => {
            Ok(AssignTarget::Member {
                object: Box::new(lower_expr(&member.object)?),
                property: PropAccess::Computed(Box::new(lower_expr(&member.expression)?)),
            })
        },
        _ => Err(LowerError::unsupported("update target")),
    }
}

fn bin_op(operator: js::BinaryOperator) -> LowerResult<BinOp> {
    Ok(match operator {
        js::BinaryOperator::Addition => BinOp::Add,
        js::BinaryOperator::Subtraction => BinOp::Sub,
        js::BinaryOperator::Multiplication => BinOp::Mul,
        js::BinaryOperator::Division => BinOp::Div,
        js::BinaryOperator::Remainder => BinOp::Rem,
        js::BinaryOperator::Equality | js::BinaryOperator::StrictEquality => BinOp::Eq,
        js::BinaryOperator::Inequality | js::BinaryOperator::StrictInequality => BinOp::NotEq,
        js::BinaryOperator::LessThan => BinOp::Lt,
        js::BinaryOperator::LessEqualThan => BinOp::LtEq,
        js::BinaryOperator::GreaterThan => BinOp::Gt,
        js::BinaryOperator::GreaterEqualThan => BinOp::GtEq,
        other => {
            return Err(LowerError::unsupported(&format!(
                "binary operator {}",
                other.as_str()
            )))
        },
    })
}

fn statement_name(statement: &js::Statement<'_>) -> &'static str {
    match statement {
        js::Statement::ClassDeclaration(_) => "class declaration",
        js::Statement::ForInStatement(_) => "for-in loop",
        js::Statement::DoWhileStatement(_) => "do-while loop",
        js::Statement::SwitchStatement(_) => "switch statement",
        js::Statement::LabeledStatement(_) => "labeled statement",
        js::Statement::WithStatement(_) => "with statement",
        _ => "statement form",
    }
}

fn expression_name(expression: &js::Expression<'_>) -> &'static str {
    match expression {
        js::Expression::NewExpression(_) => "new expression",
        js::Expression::ClassExpression(_) => "class expression",
        js::Expression::TaggedTemplateExpression(_) => "tagged template",
        js::Expression::RegExpLiteral(_) => "regex literal",
        js::Expression::ThisExpression(_) => "this",
        js::Expression::ImportExpression(_) => "dynamic import",
        _ => "expression form",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_simple_program() {
        let stmts = lower("const x = 1 + 2;\nreturn x;").unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Stmt::Declare { .. }));
        assert!(matches!(stmts[1], Stmt::Return(Some(_))));
    }

    #[test]
    fn test_lower_await_call() {
        let stmts = lower(r#"const r = await github.createIssue({ title: "x" });"#).unwrap();
        assert!(matches!(
            &stmts[0],
            Stmt::Declare { init: Some(Expr::Await(_)), .. }
        ));
    }

    #[test]
    fn test_lower_classic_for() {
        let stmts = lower("for (let i = 0; i < 3; i++) { console.log(i); }").unwrap();
        let Stmt::Block(block) = &stmts[0] else {
            panic!("expected block");
        };
        assert!(matches!(block[0], Stmt::Declare { .. }));
        assert!(matches!(block[1], Stmt::While { .. }));
    }

    #[test]
    fn test_unsupported_class_fails() {
        let err = lower("class A {}").unwrap_err();
        assert!(err.message.contains("class"));
    }

    #[test]
    fn test_unsupported_new_fails() {
        let err = lower("const a = new Foo();").unwrap_err();
        assert!(err.message.contains("new"));
    }

    #[test]
    fn test_parse_error_reported() {
        let err = lower("const = ;").unwrap_err();
        assert!(err.message.contains("parse error"));
    }

    #[test]
    fn test_template_literal() {
        let stmts = lower("const s = `a${1}b`;").unwrap();
        let Stmt::Declare {
            init: Some(Expr::Template(parts)),
            ..
        } = &stmts[0]
        else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 3);
    }
}
