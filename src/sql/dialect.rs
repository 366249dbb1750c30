//! SQL dialect differences.
//!
//! Generated SQL is identical across dialects except for identifier quoting,
//! pagination syntax and date formatting; those live behind [`SqlDialect`].

/// Date bucket for grouping on temporal columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateGranularity {
    Year,
    Month,
    Day,
    Hour,
}

impl DateGranularity {
    /// Parse a request-supplied granularity keyword.
    pub fn parse(text: &str) -> Option<DateGranularity> {
        match text.to_ascii_lowercase().as_str() {
            "year" => Some(DateGranularity::Year),
            "month" => Some(DateGranularity::Month),
            "day" => Some(DateGranularity::Day),
            "hour" => Some(DateGranularity::Hour),
            _ => None,
        }
    }
}

/// Behavior that differs per SQL backend.
pub trait SqlDialect {
    fn name(&self) -> &'static str;

    /// Quote an identifier.
    fn quote(&self, ident: &str) -> String;

    /// The pagination clause, appended after ORDER BY.
    fn limit_offset(&self, limit: u64, offset: u64) -> String;

    /// Render `expr` truncated to the given date bucket, as text.
    fn date_group(&self, expr: &str, granularity: DateGranularity) -> String;

    /// The native null-placement clause for ORDER BY, when the backend has
    /// one. Backends without it get an emulated boolean sort key instead.
    fn nulls_clause(&self, first: bool) -> Option<&'static str>;

    /// Grouped string concatenation.
    fn group_concat(&self, expr: &str) -> String;
}

struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote(&self, ident: &str) -> String {
        format!("`{ident}`")
    }

    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        if offset == 0 {
            format!("LIMIT {limit}")
        } else {
            format!("LIMIT {limit} OFFSET {offset}")
        }
    }

    fn date_group(&self, expr: &str, granularity: DateGranularity) -> String {
        let format = match granularity {
            DateGranularity::Year => "%Y",
            DateGranularity::Month => "%Y-%m",
            DateGranularity::Day => "%Y-%m-%d",
            DateGranularity::Hour => "%Y-%m-%d %H:00",
        };
        format!("DATE_FORMAT({expr}, '{format}')")
    }

    fn nulls_clause(&self, _first: bool) -> Option<&'static str> {
        None
    }

    fn group_concat(&self, expr: &str) -> String {
        format!("GROUP_CONCAT({expr})")
    }
}

struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote(&self, ident: &str) -> String {
        format!("\"{ident}\"")
    }

    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        if offset == 0 {
            format!("LIMIT {limit}")
        } else {
            format!("LIMIT {limit} OFFSET {offset}")
        }
    }

    fn date_group(&self, expr: &str, granularity: DateGranularity) -> String {
        let format = match granularity {
            DateGranularity::Year => "YYYY",
            DateGranularity::Month => "YYYY-MM",
            DateGranularity::Day => "YYYY-MM-DD",
            DateGranularity::Hour => "YYYY-MM-DD HH24:00",
        };
        format!("TO_CHAR({expr}, '{format}')")
    }

    fn nulls_clause(&self, first: bool) -> Option<&'static str> {
        Some(if first { "NULLS FIRST" } else { "NULLS LAST" })
    }

    fn group_concat(&self, expr: &str) -> String {
        format!("STRING_AGG({expr}, ',')")
    }
}

/// The supported SQL backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    MySql,
    Postgres,
}

impl Dialect {
    pub fn rules(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::MySql => &MySqlDialect,
            Dialect::Postgres => &PostgresDialect,
        }
    }
}
