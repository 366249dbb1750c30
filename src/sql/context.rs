//! Rendering compiled expressions as SQL text.

use crate::error::{QueryError, Result};
use crate::expr::{functions, Exp, UnaryOp};

/// Maps a name referenced inside a formula onto rendered SQL.
///
/// The engine implements this over the query model: plain columns become
/// `alias.physical`, calculated fields expand to their own rendered formula.
pub trait SqlResolver {
    fn resolve(&self, name: &str) -> Result<String>;
}

/// Renders an [`Exp`] tree into SQL text against one resolver.
pub struct SqlExpContext<'a> {
    resolver: &'a dyn SqlResolver,
}

impl<'a> SqlExpContext<'a> {
    pub fn new(resolver: &'a dyn SqlResolver) -> SqlExpContext<'a> {
        SqlExpContext { resolver }
    }

    pub fn render(&self, exp: &Exp) -> Result<String> {
        match exp {
            Exp::Column(name) => {
                if name == "*" {
                    Ok("*".to_string())
                } else {
                    self.resolver.resolve(name)
                }
            }
            Exp::Number(text) => Ok(text.clone()),
            Exp::Text(text) => Ok(quote_text(text)),
            Exp::Bool(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Exp::Null => Ok("NULL".to_string()),
            Exp::Unary { op, operand } => {
                let inner = self.render(operand)?;
                Ok(match op {
                    UnaryOp::Negate => format!("-{inner}"),
                    UnaryOp::Not => format!("NOT {inner}"),
                })
            }
            Exp::Binary { op, left, right } => Ok(format!(
                "{} {} {}",
                self.render(left)?,
                op.sql(),
                self.render(right)?
            )),
            Exp::Function { name, args } => self.render_function(name, args),
            Exp::Case {
                operand,
                branches,
                else_result,
            } => {
                let mut out = String::from("CASE");
                if let Some(op) = operand {
                    out.push(' ');
                    out.push_str(&self.render(op)?);
                }
                for branch in branches {
                    out.push_str(" WHEN ");
                    out.push_str(&self.render(&branch.condition)?);
                    out.push_str(" THEN ");
                    out.push_str(&self.render(&branch.result)?);
                }
                if let Some(e) = else_result {
                    out.push_str(" ELSE ");
                    out.push_str(&self.render(e)?);
                }
                out.push_str(" END");
                Ok(out)
            }
            Exp::Nested(inner) => Ok(format!("({})", self.render(inner)?)),
        }
    }

    fn render_function(&self, name: &str, args: &[Exp]) -> Result<String> {
        if !functions::is_allowed_sql(name) {
            return Err(QueryError::UnsupportedFunction {
                function: name.to_string(),
                backend: "sql",
            });
        }
        let mut rendered = args
            .iter()
            .map(|arg| self.render(arg))
            .collect::<Result<Vec<_>>>()?;
        // ROUND with a single argument rounds to integer precision.
        if name == "ROUND" && rendered.len() == 1 {
            rendered.push("0".to_string());
        }
        Ok(format!("{name}({})", rendered.join(", ")))
    }
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
