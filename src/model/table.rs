//! Table models: a physical source wrapped with named columns.

use super::column::Column;

/// Physical source behind a table model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A relational table.
    Table(String),
    /// An inline view; rendered as `FROM (sql) alias`.
    View(String),
    /// A MongoDB collection.
    Collection(String),
}

impl Source {
    pub fn is_collection(&self) -> bool {
        matches!(self, Source::Collection(_))
    }
}

/// A physical table, view or collection plus its ordered column set.
///
/// Column names are unique within a model; the loader rejects duplicates.
#[derive(Debug, Clone)]
pub struct TableModel {
    pub name: String,
    pub source: Source,
    /// Alias used when this table appears in generated SQL.
    pub alias: String,
    pub columns: Vec<Column>,
    /// Primary id column, when declared.
    pub id_column: Option<String>,
}

impl TableModel {
    pub fn new(name: impl Into<String>, source: Source, alias: impl Into<String>) -> TableModel {
        TableModel {
            name: name.into(),
            source,
            alias: alias.into(),
            columns: Vec::new(),
            id_column: None,
        }
    }

    /// Look up a column by logical name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The FROM clause form of this source.
    pub fn sql_from(&self) -> String {
        match &self.source {
            Source::Table(t) => format!("{} {}", t, self.alias),
            Source::View(v) => format!("({}) {}", v, self.alias),
            Source::Collection(c) => c.clone(),
        }
    }
}
