//! Request and response wire types.
//!
//! Requests arrive as camelCase JSON; every field except the model name is
//! optional and defaults to an empty value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::formula::Link;

/// A backend-agnostic query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    /// Query model name.
    pub model: String,

    /// Columns to select; the model's defaults when empty.
    pub columns: Vec<String>,

    /// Columns removed from the effective selection, applied after defaults.
    pub ex_columns: Vec<String>,

    /// Request-scoped named expressions, resolved left to right.
    pub calculated_fields: Vec<CalculatedFieldDef>,

    /// Filter condition tree.
    pub slice: Vec<ConditionNode>,

    pub group_by: Vec<GroupByItem>,

    pub order_by: Vec<OrderByItem>,

    /// Row offset for pagination, 0-based.
    pub start: Option<u64>,

    /// Row count cap; the engine default applies when absent.
    pub limit: Option<u64>,

    /// Also compute the unpaginated row count and measure totals.
    pub return_total: bool,
}

/// A named expression defined by the request itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculatedFieldDef {
    pub name: String,
    /// Display name, passed through to callers untouched.
    pub caption: Option<String>,
    pub expression: String,
    /// Aggregation applied to a non-aggregate expression in group mode.
    pub agg: Option<String>,
}

/// One node of the filter tree.
///
/// A node with children is a junction: its own field, operator and value are
/// ignored and the children render as one parenthesized group. `link` chains
/// a node to the one before it within the same list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConditionNode {
    pub field: String,
    pub op: String,
    pub value: Value,

    /// 1 chains with AND, 2 with OR. Ignored on the first node of a list.
    pub link: i64,

    pub children: Vec<ConditionNode>,

    /// Depth cap for hierarchy operators.
    pub max_depth: Option<u64>,
}

impl Default for ConditionNode {
    fn default() -> Self {
        ConditionNode {
            field: String::new(),
            op: String::new(),
            value: Value::Null,
            link: 1,
            children: Vec::new(),
            max_depth: None,
        }
    }
}

impl ConditionNode {
    pub fn is_junction(&self) -> bool {
        !self.children.is_empty()
    }

    /// The chaining link; unrecognized codes fall back to AND.
    pub fn chain(&self) -> Link {
        Link::from_code(self.link).unwrap_or(Link::And)
    }
}

/// One grouping key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupByItem {
    pub field: String,
    /// Aggregate this field with the given function instead of keying on it.
    /// On a measure it overrides the declared default aggregation.
    pub agg: Option<String>,
    /// Date bucket (`year`, `month`, `day`, `hour`) for temporal fields.
    pub date_granularity: Option<String>,
}

/// One ordering key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderByItem {
    pub field: String,
    pub desc: bool,
    /// Force null values to the front of the ordering.
    pub null_first: bool,
    /// Force null values to the back of the ordering.
    pub null_last: bool,
}

/// Query result: one page of rows plus optional totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOutput {
    /// Result rows, keyed by requested column name.
    pub items: Vec<Value>,

    /// Unpaginated row count; -1 when not requested.
    pub total: i64,

    /// Aggregated measure totals across all pages, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Value>,
}

impl QueryOutput {
    pub fn of(items: Vec<Value>) -> QueryOutput {
        QueryOutput {
            items,
            total: -1,
            totals: None,
        }
    }
}
