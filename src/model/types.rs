//! Backend-neutral column type tags and aggregation kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend-neutral column type tag, surfaced to callers in column metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Number,
    Integer,
    Money,
    /// Calendar day, no time component.
    Day,
    DateTime,
    Bool,
    /// Enumerated column backed by a static value/label list.
    Dict,
    /// Foreign key into a dimension table.
    Dimension,
    /// Bit-flag column; filters on it rewrite to `bitIn`.
    Bit,
    Unknown,
}

impl ColumnType {
    /// Whether values of this type are numeric.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Number | ColumnType::Integer | ColumnType::Money | ColumnType::Bit
        )
    }

    /// Whether values of this type carry a date component.
    pub fn is_temporal(self) -> bool {
        matches!(self, ColumnType::Day | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Text => "TEXT",
            ColumnType::Number => "NUMBER",
            ColumnType::Integer => "INTEGER",
            ColumnType::Money => "MONEY",
            ColumnType::Day => "DAY",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Bool => "BOOL",
            ColumnType::Dict => "DICT",
            ColumnType::Dimension => "DIMENSION",
            ColumnType::Bit => "BIT",
            ColumnType::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Aggregation applied to a column when the query groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    GroupConcat,
    None,
}

impl Aggregation {
    /// Parse a request-supplied aggregation name (case-insensitive).
    pub fn parse(name: &str) -> Option<Aggregation> {
        match name.to_ascii_uppercase().as_str() {
            "SUM" => Some(Aggregation::Sum),
            "AVG" => Some(Aggregation::Avg),
            "COUNT" => Some(Aggregation::Count),
            "MIN" => Some(Aggregation::Min),
            "MAX" => Some(Aggregation::Max),
            "GROUP_CONCAT" => Some(Aggregation::GroupConcat),
            "NONE" => Some(Aggregation::None),
            _ => None,
        }
    }

    /// SQL function name, or `None` for the non-aggregating kind.
    pub fn sql_name(self) -> Option<&'static str> {
        match self {
            Aggregation::Sum => Some("SUM"),
            Aggregation::Avg => Some("AVG"),
            Aggregation::Count => Some("COUNT"),
            Aggregation::Min => Some("MIN"),
            Aggregation::Max => Some("MAX"),
            Aggregation::GroupConcat => Some("GROUP_CONCAT"),
            Aggregation::None => None,
        }
    }

    /// Mongo `$group` accumulator operator, or `None`.
    pub fn mongo_accumulator(self) -> Option<&'static str> {
        match self {
            Aggregation::Sum => Some("$sum"),
            Aggregation::Avg => Some("$avg"),
            Aggregation::Count => Some("$sum"),
            Aggregation::Min => Some("$min"),
            Aggregation::Max => Some("$max"),
            // No pipeline equivalent; grouped string concat is a SQL-only concern.
            Aggregation::GroupConcat => None,
            Aggregation::None => None,
        }
    }
}
