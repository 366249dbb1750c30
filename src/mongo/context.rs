//! Rendering compiled expressions as aggregation-pipeline operators.
//!
//! The accepted function set is narrower than the SQL one; only functions
//! with a faithful pipeline counterpart are mapped, everything else fails
//! with an unsupported-function error naming the backend.

use serde_json::{json, Value};

use super::fragment::MongoFragment;
use crate::error::{QueryError, Result};
use crate::expr::{BinaryOp, Exp, UnaryOp};
use crate::model::ColumnType;

/// Maps a name referenced inside a formula onto a pipeline fragment.
pub trait MongoResolver {
    fn resolve(&self, name: &str) -> Result<MongoFragment>;
}

/// Renders an [`Exp`] tree into pipeline expressions against one resolver.
pub struct MongoExpContext<'a> {
    resolver: &'a dyn MongoResolver,
}

impl<'a> MongoExpContext<'a> {
    pub fn new(resolver: &'a dyn MongoResolver) -> MongoExpContext<'a> {
        MongoExpContext { resolver }
    }

    pub fn render(&self, exp: &Exp) -> Result<MongoFragment> {
        match exp {
            Exp::Column(name) => self.resolver.resolve(name),
            Exp::Number(text) => Ok(number_literal(text)),
            Exp::Text(text) => {
                Ok(MongoFragment::new(json!(text)).typed(ColumnType::Text))
            }
            Exp::Bool(b) => Ok(MongoFragment::new(json!(b)).typed(ColumnType::Bool)),
            Exp::Null => Ok(MongoFragment::new(Value::Null)),
            Exp::Unary { op, operand } => {
                let inner = self.render(operand)?;
                let value = match op {
                    UnaryOp::Negate => json!({"$multiply": [-1, inner.value]}),
                    UnaryOp::Not => json!({"$not": [inner.value]}),
                };
                Ok(MongoFragment {
                    value,
                    has_aggregate: inner.has_aggregate,
                    column_type: inner.column_type,
                })
            }
            Exp::Binary { op, left, right } => {
                let l = self.render(left)?;
                let r = self.render(right)?;
                let operator = binary_operator(*op);
                let column_type = binary_type(*op, &l, &r);
                Ok(MongoFragment {
                    value: json!({operator: [l.value, r.value]}),
                    has_aggregate: l.has_aggregate || r.has_aggregate,
                    column_type,
                })
            }
            Exp::Function { name, args } => self.render_function(name, args),
            Exp::Case {
                operand,
                branches,
                else_result,
            } => self.render_case(operand.as_deref(), branches, else_result.as_deref()),
            Exp::Nested(inner) => self.render(inner),
        }
    }

    fn render_case(
        &self,
        operand: Option<&Exp>,
        branches: &[crate::expr::CaseBranch],
        else_result: Option<&Exp>,
    ) -> Result<MongoFragment> {
        let operand = match operand {
            Some(op) => Some(self.render(op)?),
            None => None,
        };
        let mut has_aggregate = operand.as_ref().map_or(false, |f| f.has_aggregate);
        let mut arms = Vec::with_capacity(branches.len());
        let mut column_type = None;
        for branch in branches {
            let condition = self.render(&branch.condition)?;
            let result = self.render(&branch.result)?;
            has_aggregate |= condition.has_aggregate || result.has_aggregate;
            if column_type.is_none() {
                column_type = result.column_type;
            }
            let case = match &operand {
                // CASE x WHEN v compares the operand against each value.
                Some(op) => json!({"$eq": [op.value.clone(), condition.value]}),
                None => condition.value,
            };
            arms.push(json!({"case": case, "then": result.value}));
        }
        let default = match else_result {
            Some(e) => {
                let rendered = self.render(e)?;
                has_aggregate |= rendered.has_aggregate;
                rendered.value
            }
            None => Value::Null,
        };
        Ok(MongoFragment {
            value: json!({"$switch": {"branches": arms, "default": default}}),
            has_aggregate,
            column_type,
        })
    }

    fn render_function(&self, name: &str, args: &[Exp]) -> Result<MongoFragment> {
        let rendered = args
            .iter()
            .map(|arg| self.render(arg))
            .collect::<Result<Vec<_>>>()?;
        let has_aggregate = rendered.iter().any(|f| f.has_aggregate);
        let values: Vec<Value> = rendered.iter().map(|f| f.value.clone()).collect();

        // Accumulators first; they mark the fragment aggregate.
        if let Some(fragment) = accumulator(name, &values) {
            return Ok(fragment.aggregate());
        }

        let fragment = match name {
            "SUBSTRING" | "SUBSTR" => {
                if values.len() < 2 {
                    return Err(invalid_args(name));
                }
                // SQL substring positions are 1-based, $substrCP is 0-based.
                let start = json!({"$subtract": [values[1].clone(), 1]});
                let length = values
                    .get(2)
                    .cloned()
                    .unwrap_or_else(|| json!(i32::MAX));
                MongoFragment::new(json!({"$substrCP": [values[0].clone(), start, length]}))
                    .typed(ColumnType::Text)
            }
            "IF" => {
                if values.len() != 3 {
                    return Err(invalid_args(name));
                }
                MongoFragment::new(json!({"$cond": {
                    "if": values[0].clone(),
                    "then": values[1].clone(),
                    "else": values[2].clone(),
                }}))
            }
            "COALESCE" | "IFNULL" => {
                MongoFragment::new(json!({"$ifNull": values}))
            }
            "TRIM" => {
                if values.len() != 1 {
                    return Err(invalid_args(name));
                }
                MongoFragment::new(json!({"$trim": {"input": values[0].clone()}}))
                    .typed(ColumnType::Text)
            }
            "LTRIM" => {
                if values.len() != 1 {
                    return Err(invalid_args(name));
                }
                MongoFragment::new(json!({"$ltrim": {"input": values[0].clone()}}))
                    .typed(ColumnType::Text)
            }
            "RTRIM" => {
                if values.len() != 1 {
                    return Err(invalid_args(name));
                }
                MongoFragment::new(json!({"$rtrim": {"input": values[0].clone()}}))
                    .typed(ColumnType::Text)
            }
            "REPLACE" => {
                if values.len() != 3 {
                    return Err(invalid_args(name));
                }
                MongoFragment::new(json!({"$replaceAll": {
                    "input": values[0].clone(),
                    "find": values[1].clone(),
                    "replacement": values[2].clone(),
                }}))
                .typed(ColumnType::Text)
            }
            "ROUND" => {
                if values.is_empty() || values.len() > 2 {
                    return Err(invalid_args(name));
                }
                let precision = values.get(1).cloned().unwrap_or_else(|| json!(0));
                MongoFragment::new(json!({"$round": [values[0].clone(), precision]}))
                    .typed(ColumnType::Number)
            }
            _ => match plain_operator(name) {
                Some((operator, column_type)) => {
                    let mut f = MongoFragment::new(json!({operator: values}));
                    f.column_type = column_type;
                    f
                }
                None => {
                    return Err(QueryError::UnsupportedFunction {
                        function: name.to_string(),
                        backend: "mongo",
                    })
                }
            },
        };
        Ok(MongoFragment {
            has_aggregate,
            ..fragment
        })
    }
}

fn invalid_args(name: &str) -> QueryError {
    QueryError::Compile {
        message: format!("wrong argument count for {name}"),
        line: 1,
        column: 1,
    }
}

fn number_literal(text: &str) -> MongoFragment {
    let value = text
        .parse::<i64>()
        .map(Value::from)
        .or_else(|_| text.parse::<f64>().map(Value::from))
        .unwrap_or_else(|_| Value::String(text.to_string()));
    let column_type = if text.contains('.') {
        ColumnType::Number
    } else {
        ColumnType::Integer
    };
    MongoFragment::new(value).typed(column_type)
}

fn binary_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "$add",
        BinaryOp::Subtract => "$subtract",
        BinaryOp::Multiply => "$multiply",
        BinaryOp::Divide => "$divide",
        BinaryOp::Modulo => "$mod",
        BinaryOp::Eq => "$eq",
        BinaryOp::NotEq => "$ne",
        BinaryOp::Lt => "$lt",
        BinaryOp::LtEq => "$lte",
        BinaryOp::Gt => "$gt",
        BinaryOp::GtEq => "$gte",
        BinaryOp::And => "$and",
        BinaryOp::Or => "$or",
    }
}

fn binary_type(op: BinaryOp, left: &MongoFragment, right: &MongoFragment) -> Option<ColumnType> {
    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide
        | BinaryOp::Modulo => left.column_type.or(right.column_type),
        _ => Some(ColumnType::Bool),
    }
}

/// Aggregate accumulators. COUNT becomes `$sum: 1`.
fn accumulator(name: &str, values: &[Value]) -> Option<MongoFragment> {
    let fragment = match name {
        "SUM" => MongoFragment::new(json!({"$sum": values.first()?.clone()})),
        "AVG" => MongoFragment::new(json!({"$avg": values.first()?.clone()})),
        "MIN" => MongoFragment::new(json!({"$min": values.first()?.clone()})),
        "MAX" => MongoFragment::new(json!({"$max": values.first()?.clone()})),
        "COUNT" => MongoFragment::new(json!({"$sum": 1})).typed(ColumnType::Integer),
        _ => return None,
    };
    Some(fragment)
}

/// Functions mapping one-to-one onto a pipeline operator.
fn plain_operator(name: &str) -> Option<(&'static str, Option<ColumnType>)> {
    let (operator, column_type) = match name {
        "ABS" => ("$abs", Some(ColumnType::Number)),
        "CEIL" | "CEILING" => ("$ceil", Some(ColumnType::Integer)),
        "FLOOR" => ("$floor", Some(ColumnType::Integer)),
        "SQRT" => ("$sqrt", Some(ColumnType::Number)),
        "EXP" => ("$exp", Some(ColumnType::Number)),
        "LN" => ("$ln", Some(ColumnType::Number)),
        "LOG10" => ("$log10", Some(ColumnType::Number)),
        "POWER" => ("$pow", Some(ColumnType::Number)),
        "MOD" => ("$mod", Some(ColumnType::Number)),
        "TRUNCATE" => ("$trunc", Some(ColumnType::Number)),
        "YEAR" => ("$year", Some(ColumnType::Integer)),
        "MONTH" => ("$month", Some(ColumnType::Integer)),
        "DAY" => ("$dayOfMonth", Some(ColumnType::Integer)),
        "HOUR" => ("$hour", Some(ColumnType::Integer)),
        "MINUTE" => ("$minute", Some(ColumnType::Integer)),
        "SECOND" => ("$second", Some(ColumnType::Integer)),
        "WEEK" => ("$week", Some(ColumnType::Integer)),
        "DAYOFWEEK" => ("$dayOfWeek", Some(ColumnType::Integer)),
        "DAYOFYEAR" => ("$dayOfYear", Some(ColumnType::Integer)),
        "CONCAT" => ("$concat", Some(ColumnType::Text)),
        "LOWER" => ("$toLower", Some(ColumnType::Text)),
        "UPPER" => ("$toUpper", Some(ColumnType::Text)),
        "LENGTH" | "CHAR_LENGTH" => ("$strLenCP", Some(ColumnType::Integer)),
        _ => return None,
    };
    Some((operator, column_type))
}
