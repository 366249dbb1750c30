//! Backend execution seams.
//!
//! The engines compile requests; executors run the compiled form against a
//! real database. Keeping the seam at plain SQL text and JSON pipelines
//! leaves the driver choice to the caller and keeps this crate driver-free.

use serde_json::Value;

use crate::error::Result;
use crate::sql::ParamValue;

/// One result row, keyed by selected column name.
pub type Row = serde_json::Map<String, Value>;

/// Runs parameterized SQL.
pub trait SqlExecutor {
    fn query(&self, sql: &str, params: &[ParamValue]) -> Result<Vec<Row>>;
}

/// Runs aggregation pipelines against a document collection.
pub trait DocumentExecutor {
    fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Row>>;
}
