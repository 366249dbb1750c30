//! Aggregation-pipeline expression fragments.

use serde_json::Value;

use crate::model::ColumnType;

/// A compiled pipeline expression plus what we know about it.
///
/// `has_aggregate` decides whether a condition built from the fragment can
/// run in a plain `$match` or needs a grouped stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MongoFragment {
    /// The pipeline expression, e.g. `{"$add": ["$a", "$b"]}`.
    pub value: Value,
    pub has_aggregate: bool,
    /// Result type, when it can be inferred.
    pub column_type: Option<ColumnType>,
}

impl MongoFragment {
    pub fn new(value: Value) -> MongoFragment {
        MongoFragment {
            value,
            has_aggregate: false,
            column_type: None,
        }
    }

    /// A `$`-prefixed field path reference.
    pub fn field(name: &str, column_type: Option<ColumnType>) -> MongoFragment {
        MongoFragment {
            value: Value::String(format!("${name}")),
            has_aggregate: false,
            column_type,
        }
    }

    pub fn typed(mut self, column_type: ColumnType) -> MongoFragment {
        self.column_type = Some(column_type);
        self
    }

    pub fn aggregate(mut self) -> MongoFragment {
        self.has_aggregate = true;
        self
    }
}
