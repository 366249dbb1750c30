//! Condition operators.
//!
//! Every request operator (`=`, `in`, `like`, range brackets, ...) is a
//! [`Formula`] registered by name in a [`FormulaService`]. The engine hands
//! a formula the rendered left-hand side and the request value; the formula
//! decides how the value's shape (empty, scalar, list) maps onto SQL.

pub mod hierarchy;
pub mod sql_formulas;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::model::Column;
use crate::sql::{ParamValue, SqlFragment};

pub use hierarchy::{HierarchyOperator, HierarchyOperatorService};

/// How a condition chains to the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Link {
    #[default]
    And,
    Or,
}

impl Link {
    /// Wire encoding: 1 is AND, 2 is OR.
    pub fn from_code(code: i64) -> Option<Link> {
        match code {
            1 => Some(Link::And),
            2 => Some(Link::Or),
            _ => None,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Link::And => "AND",
            Link::Or => "OR",
        }
    }
}

/// One condition operator.
///
/// [`Formula::build`] dispatches on the value's shape; implementations
/// override the shape handlers they support. Returning `Ok(None)` drops the
/// condition (the usual treatment of empty values).
pub trait Formula: Send + Sync {
    /// Names this formula registers under.
    fn names(&self) -> &'static [&'static str];

    fn build(
        &self,
        op: &str,
        column_sql: &str,
        values: ValueShape,
    ) -> Result<Option<SqlFragment>> {
        match values {
            ValueShape::Empty => self.build_empty(op, column_sql),
            ValueShape::Scalar(value) => self.build_scalar(op, column_sql, value),
            ValueShape::List(values) => self.build_list(op, column_sql, values),
        }
    }

    fn build_empty(&self, _op: &str, _column_sql: &str) -> Result<Option<SqlFragment>> {
        Ok(None)
    }

    fn build_scalar(
        &self,
        op: &str,
        _column_sql: &str,
        _value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        Err(QueryError::InvalidOperand {
            op: op.to_string(),
            message: "operator does not accept a single value".to_string(),
        })
    }

    fn build_list(
        &self,
        op: &str,
        _column_sql: &str,
        _values: Vec<ParamValue>,
    ) -> Result<Option<SqlFragment>> {
        Err(QueryError::InvalidOperand {
            op: op.to_string(),
            message: "operator does not accept a value list".to_string(),
        })
    }
}

impl std::fmt::Debug for dyn Formula + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Formula").field("names", &self.names()).finish()
    }
}

/// The shape of a request value after formatting.
#[derive(Debug, Clone)]
pub enum ValueShape {
    /// Null, or a blank string.
    Empty,
    Scalar(ParamValue),
    List(Vec<ParamValue>),
}

/// Classify and format a raw request value against its column.
///
/// Each element passes through [`Column::format_value`]; calculated columns
/// pass values through untouched.
pub fn shape_value(column: &Column, value: &Value) -> Result<ValueShape> {
    match value {
        Value::Null => Ok(ValueShape::Empty),
        Value::String(s) if s.trim().is_empty() => Ok(ValueShape::Empty),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                // Null elements stand for open range bounds; never formatted.
                if item.is_null() {
                    out.push(ParamValue::Null);
                } else {
                    out.push(ParamValue::from_json(&column.format_value(item)?));
                }
            }
            Ok(ValueShape::List(out))
        }
        other => Ok(ValueShape::Scalar(ParamValue::from_json(
            &column.format_value(other)?,
        ))),
    }
}

/// Named registry of condition operators.
pub struct FormulaService {
    formulas: HashMap<&'static str, Arc<dyn Formula>>,
}

impl FormulaService {
    pub fn empty() -> FormulaService {
        FormulaService {
            formulas: HashMap::new(),
        }
    }

    /// A service carrying the full built-in operator set.
    pub fn new() -> FormulaService {
        let mut service = FormulaService::empty();
        for formula in sql_formulas::defaults() {
            // Built-in names are distinct.
            let _ = service.register(formula);
        }
        service
    }

    /// Register a formula under each of its names. Re-registering a name is
    /// a configuration mistake and fails rather than silently replacing.
    pub fn register(&mut self, formula: Arc<dyn Formula>) -> Result<()> {
        for name in formula.names() {
            if self.formulas.contains_key(name) {
                return Err(QueryError::DuplicateFormula(name.to_string()));
            }
            self.formulas.insert(name, formula.clone());
        }
        Ok(())
    }

    pub fn get(&self, op: &str) -> Result<&dyn Formula> {
        self.formulas
            .get(op)
            .map(|f| f.as_ref())
            .ok_or_else(|| QueryError::OperatorNotFound(op.to_string()))
    }

    pub fn contains(&self, op: &str) -> bool {
        self.formulas.contains_key(op)
    }

    /// Build the SQL condition for one operator application.
    pub fn build(
        &self,
        op: &str,
        column: &Column,
        column_sql: &str,
        value: &Value,
    ) -> Result<Option<SqlFragment>> {
        let formula = self.get(op)?;
        let shaped = shape_value(column, value)?;
        formula.build(op, column_sql, shaped)
    }
}

impl Default for FormulaService {
    fn default() -> Self {
        FormulaService::new()
    }
}
