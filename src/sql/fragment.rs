//! SQL fragments: text plus positional bind parameters.

use serde_json::Value;

/// A bind parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl ParamValue {
    /// Convert a JSON value into a bind parameter.
    pub fn from_json(value: &Value) -> ParamValue {
        match value {
            Value::String(s) => ParamValue::String(s.clone()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ParamValue::Int(i)
                } else {
                    ParamValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::Bool(b) => ParamValue::Bool(*b),
            Value::Null => ParamValue::Null,
            other => ParamValue::String(other.to_string()),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::String(s) => write!(f, "{s}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Null => write!(f, "NULL"),
        }
    }
}

/// A piece of SQL with its bind parameters, in `?` placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<ParamValue>,
}

impl SqlFragment {
    pub fn new() -> SqlFragment {
        SqlFragment::default()
    }

    /// A fragment of plain text with no parameters.
    pub fn raw(sql: impl Into<String>) -> SqlFragment {
        SqlFragment {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// A `?` placeholder bound to one value.
    pub fn bind(value: ParamValue) -> SqlFragment {
        SqlFragment {
            sql: "?".to_string(),
            params: vec![value],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn push_str(&mut self, text: &str) -> &mut SqlFragment {
        self.sql.push_str(text);
        self
    }

    pub fn push_param(&mut self, value: ParamValue) -> &mut SqlFragment {
        self.sql.push('?');
        self.params.push(value);
        self
    }

    /// Append another fragment, text and parameters both.
    pub fn push_fragment(&mut self, other: SqlFragment) -> &mut SqlFragment {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
        self
    }
}
