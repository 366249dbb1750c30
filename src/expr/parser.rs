//! Formula compilation.
//!
//! A formula is one scalar SQL expression. We wrap it in `SELECT {formula}`,
//! hand it to sqlparser's generic dialect and convert the resulting AST into
//! our own [`Exp`] tree, rejecting anything outside the formula subset
//! (subqueries, wildcards outside COUNT, window clauses).

use once_cell::sync::Lazy;
use regex::Regex;
use sqlparser::ast::{
    self, FunctionArg, FunctionArgExpr, FunctionArguments, SelectItem, SetExpr, Statement,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use super::ast::{BinaryOp, CaseBranch, Exp, UnaryOp};
use crate::error::{QueryError, Result};

/// The `SELECT ` prefix shifts reported columns on the first line.
const PREFIX_LEN: u64 = 7;

static POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Line: (\d+), Column:? (\d+)").expect("position regex"));

/// Compile a formula string into an expression tree.
pub fn compile(text: &str) -> Result<Exp> {
    let sql = format!("SELECT {text}");
    let statements = Parser::parse_sql(&GenericDialect {}, &sql)
        .map_err(|e| parse_error(&e.to_string()))?;

    let statement = statements
        .into_iter()
        .next()
        .ok_or_else(|| compile_error("empty formula"))?;
    let query = match statement {
        Statement::Query(query) => query,
        _ => return Err(compile_error("formula must be a single expression")),
    };
    let select = match *query.body {
        SetExpr::Select(select) => select,
        _ => return Err(compile_error("formula must be a single expression")),
    };
    let mut items = select.projection.into_iter();
    let item = items
        .next()
        .ok_or_else(|| compile_error("empty formula"))?;
    if items.next().is_some() {
        return Err(compile_error("formula must be a single expression"));
    }
    match item {
        SelectItem::UnnamedExpr(expr) => convert(expr),
        SelectItem::ExprWithAlias { .. } => Err(compile_error("alias not allowed in formula")),
        _ => Err(compile_error("wildcard not allowed in formula")),
    }
}

/// Map a sqlparser error message onto [`QueryError::Compile`], shifting the
/// column past the synthetic `SELECT ` prefix.
fn parse_error(message: &str) -> QueryError {
    let (line, column) = match POSITION.captures(message) {
        Some(caps) => {
            let line: u64 = caps[1].parse().unwrap_or(1);
            let mut column: u64 = caps[2].parse().unwrap_or(1);
            if line == 1 {
                column = column.saturating_sub(PREFIX_LEN).max(1);
            }
            (line, column)
        }
        None => (1, 1),
    };
    QueryError::Compile {
        message: message
            .trim_start_matches("sql parser error: ")
            .to_string(),
        line,
        column,
    }
}

fn compile_error(message: impl Into<String>) -> QueryError {
    QueryError::Compile {
        message: message.into(),
        line: 1,
        column: 1,
    }
}

fn convert(expr: ast::Expr) -> Result<Exp> {
    match expr {
        ast::Expr::Identifier(ident) => Ok(Exp::Column(ident.value)),
        ast::Expr::CompoundIdentifier(parts) => Ok(Exp::Column(
            parts
                .into_iter()
                .map(|p| p.value)
                .collect::<Vec<_>>()
                .join("."),
        )),
        ast::Expr::Value(value) => convert_value(value),
        ast::Expr::BinaryOp { left, op, right } => Ok(Exp::Binary {
            op: convert_binary_op(op)?,
            left: Box::new(convert(*left)?),
            right: Box::new(convert(*right)?),
        }),
        ast::Expr::UnaryOp { op, expr } => {
            let op = match op {
                ast::UnaryOperator::Minus => UnaryOp::Negate,
                ast::UnaryOperator::Not => UnaryOp::Not,
                ast::UnaryOperator::Plus => return convert(*expr),
                other => {
                    return Err(compile_error(format!("unsupported operator '{other}'")))
                }
            };
            Ok(Exp::Unary {
                op,
                operand: Box::new(convert(*expr)?),
            })
        }
        ast::Expr::Function(function) => convert_function(function),
        ast::Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            let operand = match operand {
                Some(op) => Some(Box::new(convert(*op)?)),
                None => None,
            };
            let branches = conditions
                .into_iter()
                .zip(results)
                .map(|(condition, result)| {
                    Ok(CaseBranch {
                        condition: convert(condition)?,
                        result: convert(result)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let else_result = match else_result {
                Some(e) => Some(Box::new(convert(*e)?)),
                None => None,
            };
            Ok(Exp::Case {
                operand,
                branches,
                else_result,
            })
        }
        ast::Expr::Nested(inner) => Ok(Exp::Nested(Box::new(convert(*inner)?))),
        ast::Expr::IsNull(inner) => Ok(Exp::Function {
            name: "ISNULL".to_string(),
            args: vec![convert(*inner)?],
        }),
        ast::Expr::Substring {
            expr,
            substring_from,
            substring_for,
            ..
        } => {
            let mut args = vec![convert(*expr)?];
            if let Some(from) = substring_from {
                args.push(convert(*from)?);
            }
            if let Some(len) = substring_for {
                args.push(convert(*len)?);
            }
            Ok(Exp::Function {
                name: "SUBSTRING".to_string(),
                args,
            })
        }
        other => Err(compile_error(format!(
            "unsupported expression '{other}'"
        ))),
    }
}

fn convert_value(value: ast::Value) -> Result<Exp> {
    match value {
        ast::Value::Number(text, _) => Ok(Exp::Number(text)),
        ast::Value::SingleQuotedString(text) | ast::Value::DoubleQuotedString(text) => {
            Ok(Exp::Text(text))
        }
        ast::Value::Boolean(b) => Ok(Exp::Bool(b)),
        ast::Value::Null => Ok(Exp::Null),
        other => Err(compile_error(format!("unsupported literal '{other}'"))),
    }
}

fn convert_binary_op(op: ast::BinaryOperator) -> Result<BinaryOp> {
    use ast::BinaryOperator as B;
    Ok(match op {
        B::Plus => BinaryOp::Add,
        B::Minus => BinaryOp::Subtract,
        B::Multiply => BinaryOp::Multiply,
        B::Divide => BinaryOp::Divide,
        B::Modulo => BinaryOp::Modulo,
        B::Eq => BinaryOp::Eq,
        B::NotEq => BinaryOp::NotEq,
        B::Lt => BinaryOp::Lt,
        B::LtEq => BinaryOp::LtEq,
        B::Gt => BinaryOp::Gt,
        B::GtEq => BinaryOp::GtEq,
        B::And => BinaryOp::And,
        B::Or => BinaryOp::Or,
        other => return Err(compile_error(format!("unsupported operator '{other}'"))),
    })
}

fn convert_function(function: ast::Function) -> Result<Exp> {
    let name = function
        .name
        .0
        .last()
        .map(|ident| ident.value.to_uppercase())
        .ok_or_else(|| compile_error("unnamed function"))?;
    let args = match function.args {
        FunctionArguments::None => Vec::new(),
        FunctionArguments::List(list) => list
            .args
            .into_iter()
            .map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => convert(e),
                FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {
                    Ok(Exp::Column("*".to_string()))
                }
                other => Err(compile_error(format!(
                    "unsupported function argument '{other}'"
                ))),
            })
            .collect::<Result<Vec<_>>>()?,
        FunctionArguments::Subquery(_) => {
            return Err(compile_error("subquery not allowed in formula"))
        }
    };
    Ok(Exp::Function { name, args })
}
