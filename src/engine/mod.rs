//! Query engines: request types, compilation and execution seams.

pub mod executor;
pub mod mongo_engine;
pub mod request;
pub mod sql_engine;

use once_cell::sync::Lazy;
use regex::Regex;

pub use executor::{DocumentExecutor, Row, SqlExecutor};
pub use mongo_engine::{CompiledPipeline, MongoQueryEngine};
pub use request::{
    CalculatedFieldDef, ConditionNode, GroupByItem, OrderByItem, QueryOutput, QueryRequest,
};
pub use sql_engine::{CompiledSql, SqlQueryEngine};

/// `expr AS alias` in a requested column.
static INLINE_EXPR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+AS\s+([A-Za-z_][A-Za-z0-9_]*)$").expect("inline regex"));

/// Split an inline `expr AS alias` column into its expression and alias.
pub(crate) fn inline_alias(name: &str) -> Option<(String, String)> {
    let caps = INLINE_EXPR.captures(name.trim())?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Parse a request-supplied aggregation override.
pub(crate) fn parse_agg(text: &str) -> crate::error::Result<crate::model::Aggregation> {
    crate::model::Aggregation::parse(text).ok_or_else(|| crate::error::QueryError::InvalidOperand {
        op: "agg".to_string(),
        message: format!("unknown aggregation '{text}'"),
    })
}
