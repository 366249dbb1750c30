//! The built-in SQL condition operators.

use std::sync::Arc;

use super::Formula;
use crate::error::{QueryError, Result};
use crate::sql::{ParamValue, SqlFragment};

/// All formulas registered by default.
pub fn defaults() -> Vec<Arc<dyn Formula>> {
    vec![
        Arc::new(EqualsFormula),
        Arc::new(NotEqualsFormula),
        Arc::new(ForceEqualsFormula),
        Arc::new(CompareFormula),
        Arc::new(InFormula),
        Arc::new(NotInFormula),
        Arc::new(BitInFormula),
        Arc::new(LikeFormula),
        Arc::new(NullCheckFormula),
        Arc::new(RangeFormula),
    ]
}

fn scalar(column_sql: &str, op: &str, value: ParamValue) -> SqlFragment {
    let mut f = SqlFragment::raw(format!("{column_sql} {op} "));
    f.push_param(value);
    f
}

fn in_list(column_sql: &str, keyword: &str, values: Vec<ParamValue>) -> SqlFragment {
    let mut f = SqlFragment::raw(format!("{column_sql} {keyword} ("));
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            f.push_str(", ");
        }
        f.push_param(value);
    }
    f.push_str(")");
    f
}

// =============================================================================
// Equality
// =============================================================================

/// `=`: scalar equality; a list behaves as IN; empty drops the condition.
struct EqualsFormula;

impl Formula for EqualsFormula {
    fn names(&self) -> &'static [&'static str] {
        &["="]
    }

    fn build_scalar(
        &self,
        _op: &str,
        column_sql: &str,
        value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        Ok(Some(scalar(column_sql, "=", value)))
    }

    fn build_list(
        &self,
        _op: &str,
        column_sql: &str,
        values: Vec<ParamValue>,
    ) -> Result<Option<SqlFragment>> {
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(in_list(column_sql, "IN", values)))
    }
}

/// `!=` and `<>`: scalar inequality; a list behaves as NOT IN.
struct NotEqualsFormula;

impl Formula for NotEqualsFormula {
    fn names(&self) -> &'static [&'static str] {
        &["!=", "<>"]
    }

    fn build_scalar(
        &self,
        _op: &str,
        column_sql: &str,
        value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        Ok(Some(scalar(column_sql, "<>", value)))
    }

    fn build_list(
        &self,
        _op: &str,
        column_sql: &str,
        values: Vec<ParamValue>,
    ) -> Result<Option<SqlFragment>> {
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(in_list(column_sql, "NOT IN", values)))
    }
}

/// `==`: like `=` but an empty value still compiles, matching the empty
/// string rather than dropping the condition.
struct ForceEqualsFormula;

impl Formula for ForceEqualsFormula {
    fn names(&self) -> &'static [&'static str] {
        &["=="]
    }

    fn build_empty(&self, _op: &str, column_sql: &str) -> Result<Option<SqlFragment>> {
        Ok(Some(scalar(
            column_sql,
            "=",
            ParamValue::String(String::new()),
        )))
    }

    fn build_scalar(
        &self,
        _op: &str,
        column_sql: &str,
        value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        Ok(Some(scalar(column_sql, "=", value)))
    }
}

// =============================================================================
// Comparisons
// =============================================================================

/// `>`, `>=`, `<`, `<=`: scalar comparisons, the operator passes through.
struct CompareFormula;

impl Formula for CompareFormula {
    fn names(&self) -> &'static [&'static str] {
        &[">", ">=", "<", "<="]
    }

    fn build_scalar(
        &self,
        op: &str,
        column_sql: &str,
        value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        Ok(Some(scalar(column_sql, op, value)))
    }
}

// =============================================================================
// Membership
// =============================================================================

/// `in`: list membership; a scalar becomes a one-element list.
struct InFormula;

impl Formula for InFormula {
    fn names(&self) -> &'static [&'static str] {
        &["in"]
    }

    fn build_scalar(
        &self,
        op: &str,
        column_sql: &str,
        value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        self.build_list(op, column_sql, vec![value])
    }

    fn build_list(
        &self,
        _op: &str,
        column_sql: &str,
        values: Vec<ParamValue>,
    ) -> Result<Option<SqlFragment>> {
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(in_list(column_sql, "IN", values)))
    }
}

/// `not in`.
struct NotInFormula;

impl Formula for NotInFormula {
    fn names(&self) -> &'static [&'static str] {
        &["not in"]
    }

    fn build_scalar(
        &self,
        op: &str,
        column_sql: &str,
        value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        self.build_list(op, column_sql, vec![value])
    }

    fn build_list(
        &self,
        _op: &str,
        column_sql: &str,
        values: Vec<ParamValue>,
    ) -> Result<Option<SqlFragment>> {
        if values.is_empty() {
            return Ok(None);
        }
        Ok(Some(in_list(column_sql, "NOT IN", values)))
    }
}

/// `bitIn`: membership over a bit-flag column. Each value is a mask and the
/// row matches when any mask overlaps: `(col & ?) > 0 OR ...`.
struct BitInFormula;

impl BitInFormula {
    fn mask_test(column_sql: &str, mask: ParamValue) -> SqlFragment {
        let mut f = SqlFragment::raw(format!("({column_sql} & "));
        f.push_param(mask);
        f.push_str(") > 0");
        f
    }
}

impl Formula for BitInFormula {
    fn names(&self) -> &'static [&'static str] {
        &["bitIn"]
    }

    fn build_scalar(
        &self,
        _op: &str,
        column_sql: &str,
        value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        Ok(Some(Self::mask_test(column_sql, value)))
    }

    fn build_list(
        &self,
        _op: &str,
        column_sql: &str,
        values: Vec<ParamValue>,
    ) -> Result<Option<SqlFragment>> {
        if values.is_empty() {
            return Ok(None);
        }
        let mut f = SqlFragment::raw("(");
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                f.push_str(" OR ");
            }
            f.push_fragment(Self::mask_test(column_sql, value));
        }
        f.push_str(")");
        Ok(Some(f))
    }
}

// =============================================================================
// Pattern matching
// =============================================================================

/// `like` wraps the value in `%`; `right_like` anchors the start (`v%`),
/// `left_like` anchors the end (`%v`); `not like` negates the contains form.
struct LikeFormula;

impl Formula for LikeFormula {
    fn names(&self) -> &'static [&'static str] {
        &["like", "left_like", "right_like", "not like"]
    }

    fn build_scalar(
        &self,
        op: &str,
        column_sql: &str,
        value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        let text = match value {
            ParamValue::String(s) => s,
            other => other.to_string(),
        };
        let (keyword, pattern) = match op {
            "left_like" => ("LIKE", format!("%{text}")),
            "right_like" => ("LIKE", format!("{text}%")),
            "not like" => ("NOT LIKE", format!("%{text}%")),
            _ => ("LIKE", format!("%{text}%")),
        };
        Ok(Some(scalar(
            column_sql,
            keyword,
            ParamValue::String(pattern),
        )))
    }
}

// =============================================================================
// Null checks
// =============================================================================

/// Value-less null tests. The `OrEmpty` variants also treat the empty string
/// as missing.
struct NullCheckFormula;

impl NullCheckFormula {
    fn condition(op: &str, column_sql: &str) -> Result<String> {
        Ok(match op {
            "isNull" => format!("{column_sql} IS NULL"),
            "isNotNull" => format!("{column_sql} IS NOT NULL"),
            "isNullOrEmpty" => {
                format!("({column_sql} IS NULL OR {column_sql} = '')")
            }
            "isNotNullOrEmpty" => {
                format!("({column_sql} IS NOT NULL AND {column_sql} <> '')")
            }
            other => return Err(QueryError::OperatorNotFound(other.to_string())),
        })
    }
}

impl Formula for NullCheckFormula {
    fn names(&self) -> &'static [&'static str] {
        &["isNull", "isNotNull", "isNullOrEmpty", "isNotNullOrEmpty"]
    }

    fn build_empty(&self, op: &str, column_sql: &str) -> Result<Option<SqlFragment>> {
        Ok(Some(SqlFragment::raw(Self::condition(op, column_sql)?)))
    }

    // The value is ignored; these operators carry none.
    fn build_scalar(
        &self,
        op: &str,
        column_sql: &str,
        _value: ParamValue,
    ) -> Result<Option<SqlFragment>> {
        self.build_empty(op, column_sql)
    }

    fn build_list(
        &self,
        op: &str,
        column_sql: &str,
        _values: Vec<ParamValue>,
    ) -> Result<Option<SqlFragment>> {
        self.build_empty(op, column_sql)
    }
}

// =============================================================================
// Ranges
// =============================================================================

/// Interval operators `[]`, `[)`, `(]`, `()`.
///
/// The value is a two-element list of lower and upper bound; a null bound is
/// open. The bracket side picks inclusive or exclusive comparison.
struct RangeFormula;

impl Formula for RangeFormula {
    fn names(&self) -> &'static [&'static str] {
        &["[]", "[)", "(]", "()"]
    }

    fn build_list(
        &self,
        op: &str,
        column_sql: &str,
        values: Vec<ParamValue>,
    ) -> Result<Option<SqlFragment>> {
        if values.len() != 2 {
            return Err(QueryError::InvalidOperand {
                op: op.to_string(),
                message: format!("range takes [low, high], got {} values", values.len()),
            });
        }
        let mut bounds = values.into_iter();
        let low = bounds.next().filter(|v| *v != ParamValue::Null);
        let high = bounds.next().filter(|v| *v != ParamValue::Null);

        let low_op = if op.starts_with('[') { ">=" } else { ">" };
        let high_op = if op.ends_with(']') { "<=" } else { "<" };

        let mut f = SqlFragment::new();
        if let Some(low) = low {
            f.push_fragment(scalar(column_sql, low_op, low));
        }
        if let Some(high) = high {
            if !f.is_empty() {
                f.push_str(" AND ");
            }
            f.push_fragment(scalar(column_sql, high_op, high));
        }
        if f.is_empty() {
            return Ok(None);
        }
        Ok(Some(f))
    }
}
