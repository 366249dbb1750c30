//! Column definitions and value formatting.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Aggregation, ColumnType};
use crate::error::{QueryError, Result};

/// What role a column plays in the model.
///
/// A closed set: callers pattern-match on the kind instead of probing
/// capabilities at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Foreign key into a dimension; `dimension` names it.
    Dimension { dimension: String },
    /// Numeric, aggregatable fact column.
    Measure,
    /// Plain attribute column.
    Property,
    /// Request-scoped named expression; never formatted, never joined.
    Calculated,
}

/// One `{value, label}` pair of a dict-typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictEntry {
    pub value: Value,
    pub label: String,
}

/// A column of a [`TableModel`](super::TableModel).
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Logical name, unique within its table model.
    pub name: String,
    pub caption: String,
    pub column_type: ColumnType,
    /// Physical column (SQL) or document field (Mongo) name.
    pub physical: String,
    pub kind: ColumnKind,
    pub filterable: bool,
    pub aggregatable: bool,
    /// Default aggregation when the query groups.
    pub aggregation: Aggregation,
    /// Static value/label list for dict-typed columns.
    pub dict: Vec<DictEntry>,
}

impl Column {
    /// Plain property column with sensible flags.
    pub fn property(name: impl Into<String>, column_type: ColumnType) -> Column {
        let name = name.into();
        Column {
            caption: name.clone(),
            physical: name.clone(),
            name,
            column_type,
            kind: ColumnKind::Property,
            filterable: true,
            aggregatable: false,
            aggregation: Aggregation::None,
            dict: Vec::new(),
        }
    }

    /// Measure column with a default aggregation.
    pub fn measure(name: impl Into<String>, column_type: ColumnType, agg: Aggregation) -> Column {
        let mut c = Column::property(name, column_type);
        c.kind = ColumnKind::Measure;
        c.aggregatable = true;
        c.aggregation = agg;
        c
    }

    pub fn is_calculated(&self) -> bool {
        self.kind == ColumnKind::Calculated
    }

    pub fn is_dimension(&self) -> bool {
        matches!(self.kind, ColumnKind::Dimension { .. })
    }

    /// Whether filters on this column rewrite to the `bitIn` operator.
    pub fn is_bit(&self) -> bool {
        self.column_type == ColumnType::Bit
    }

    /// Format a request value to this column's declared type.
    ///
    /// Calculated-field columns are never formatted; expression results are
    /// already typed. Returns [`QueryError::TypeCoercion`] when the value
    /// cannot be represented in the declared type.
    pub fn format_value(&self, value: &Value) -> Result<Value> {
        if self.is_calculated() {
            return Ok(value.clone());
        }
        let coerced = match self.column_type {
            ColumnType::Number | ColumnType::Money => match value {
                Value::Number(_) => Some(value.clone()),
                Value::String(s) => s.trim().parse::<f64>().ok().and_then(|f| {
                    serde_json::Number::from_f64(f).map(Value::Number)
                }),
                _ => None,
            },
            ColumnType::Integer | ColumnType::Bit => match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
                Value::Number(n) => n.as_f64().map(|f| Value::from(f as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
                _ => None,
            },
            ColumnType::Bool => match value {
                Value::Bool(_) => Some(value.clone()),
                Value::String(s) => match s.as_str() {
                    "true" | "1" => Some(Value::Bool(true)),
                    "false" | "0" => Some(Value::Bool(false)),
                    _ => None,
                },
                Value::Number(n) => Some(Value::Bool(n.as_i64() != Some(0))),
                _ => None,
            },
            ColumnType::Day | ColumnType::DateTime => match value {
                // Dates travel as ISO strings; the executor binds the native type.
                Value::String(_) => Some(value.clone()),
                Value::Number(_) => Some(value.clone()),
                _ => None,
            },
            ColumnType::Text
            | ColumnType::Dict
            | ColumnType::Dimension
            | ColumnType::Unknown => match value {
                Value::String(_) => Some(value.clone()),
                Value::Number(n) => Some(Value::String(n.to_string())),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                _ => None,
            },
        };
        coerced.ok_or_else(|| QueryError::TypeCoercion {
            value: value.to_string(),
            column: self.name.clone(),
            expected: self.column_type,
        })
    }
}

/// Caller-facing column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMeta {
    pub name: String,
    pub caption: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    pub filterable: bool,
    pub aggregatable: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub dict: Vec<DictEntry>,
}

impl ColumnMeta {
    pub fn of(column: &Column) -> ColumnMeta {
        ColumnMeta {
            name: column.name.clone(),
            caption: column.caption.clone(),
            column_type: column.column_type,
            filterable: column.filterable,
            aggregatable: column.aggregatable,
            dict: column.dict.clone(),
        }
    }
}
