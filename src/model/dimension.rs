//! Dimension definitions, including snowflaked and parent-child forms.

/// Closure table backing a parent-child hierarchy.
///
/// Rows are `(ancestor, descendant, distance)`; `distance = 0` is the row
/// itself, `distance = 1` a direct child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureTable {
    pub table: String,
    /// SQL alias for the closure table in generated joins.
    pub alias: String,
    pub ancestor_column: String,
    pub descendant_column: String,
    pub distance_column: String,
}

/// The shape of a dimension. Exactly one applies per dimension instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimensionKind {
    /// Direct foreign-key reference.
    Plain,
    /// Snowflaked: reached through another dimension, named here.
    Nested { via: String },
    /// Self-referencing hierarchy backed by a closure table.
    ParentChild { closure: ClosureTable },
}

/// A categorical axis of a query model.
///
/// Exposes `<name>$id` (the foreign key on the fact table) and
/// `<name>$caption` (the caption column on the dimension table).
#[derive(Debug, Clone)]
pub struct Dimension {
    pub name: String,
    pub caption: String,
    /// Name of the dimension's backing [`TableModel`](super::TableModel).
    pub table: String,
    /// Foreign-key column on the fact table (logical name).
    pub foreign_key: String,
    /// Primary-key column on the dimension table (logical name).
    pub primary_key: String,
    /// Caption column on the dimension table (logical name).
    pub caption_column: String,
    pub kind: DimensionKind,
}

impl Dimension {
    /// The closure table, when this is a parent-child dimension.
    pub fn closure(&self) -> Option<&ClosureTable> {
        match &self.kind {
            DimensionKind::ParentChild { closure } => Some(closure),
            _ => None,
        }
    }

    pub fn id_field(&self) -> String {
        format!("{}$id", self.name)
    }

    pub fn caption_field(&self) -> String {
        format!("{}$caption", self.name)
    }
}
