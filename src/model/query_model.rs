//! Query models: a joined view over table models exposed for querying.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};

use super::column::{Column, ColumnMeta};
use super::dimension::{Dimension, DimensionKind};
use super::measure::Measure;
use super::table::TableModel;
use crate::config::{BareDimension, EngineConfig};
use crate::error::{QueryError, Result};

/// One join edge between two table models, as FK → PK column pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub left_table: String,
    /// Logical column name on the left table.
    pub left_column: String,
    pub right_table: String,
    /// Logical column name on the right table.
    pub right_column: String,
}

/// A model-declared default ordering.
#[derive(Debug, Clone)]
pub struct ModelOrder {
    pub field: String,
    pub desc: bool,
}

/// A column resolved against a query model.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedColumn<'a> {
    pub column: &'a Column,
    pub table: &'a TableModel,
    /// Set when the name resolved through a dimension (`team$id` etc).
    pub dimension: Option<&'a Dimension>,
}

impl<'a> ResolvedColumn<'a> {
    /// `alias.physical` form for SQL rendering.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.table.alias, self.column.physical)
    }
}

/// A named, queryable view over one or more joined table models.
///
/// Built once by the loader and immutable afterwards; hot reload swaps the
/// whole catalog, never a model in place.
#[derive(Debug, Clone)]
pub struct QueryModel {
    pub name: String,
    /// The fact (or only) table.
    pub primary: TableModel,
    /// Dimension and snowflake tables.
    pub joined: Vec<TableModel>,
    pub joins: Vec<JoinEdge>,
    pub dimensions: Vec<Dimension>,
    pub measures: Vec<Measure>,
    /// Column names selected when a request names none.
    pub default_columns: Vec<String>,
    pub orders: Vec<ModelOrder>,
}

impl QueryModel {
    /// Whether this model is backed by a document collection.
    pub fn is_document(&self) -> bool {
        self.primary.source.is_collection()
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    /// The table model carrying `name`, searching primary then joined.
    pub fn table(&self, name: &str) -> Option<&TableModel> {
        if self.primary.name == name {
            return Some(&self.primary);
        }
        self.joined.iter().find(|t| t.name == name)
    }

    /// Resolve a request field name to a column.
    ///
    /// Handles `<dimension>$id` / `<dimension>$caption` suffixes, bare
    /// dimension names (via [`EngineConfig::bare_dimension`]) and plain
    /// column names on the primary or any joined table. Unknown names fail
    /// with [`QueryError::UnknownField`].
    pub fn find_column<'a>(
        &'a self,
        name: &str,
        config: &EngineConfig,
    ) -> Result<ResolvedColumn<'a>> {
        if let Some((dim_name, suffix)) = name.split_once('$') {
            let dimension = self
                .dimension(dim_name)
                .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
            return match suffix {
                "id" => self.resolve_dimension_id(dimension, name),
                "caption" => self.resolve_dimension_caption(dimension, name),
                _ => Err(QueryError::UnknownField(name.to_string())),
            };
        }

        // Plain column on the primary table.
        if let Some(column) = self.primary.column(name) {
            return Ok(ResolvedColumn {
                column,
                table: &self.primary,
                dimension: None,
            });
        }
        // Plain column on a joined table.
        for table in &self.joined {
            if let Some(column) = table.column(name) {
                return Ok(ResolvedColumn {
                    column,
                    table,
                    dimension: None,
                });
            }
        }
        // Bare dimension name, resolved by policy.
        if let Some(dimension) = self.dimension(name) {
            return match config.bare_dimension {
                BareDimension::Caption => self.resolve_dimension_caption(dimension, name),
                BareDimension::Id => self.resolve_dimension_id(dimension, name),
            };
        }
        Err(QueryError::UnknownField(name.to_string()))
    }

    fn resolve_dimension_id<'a>(
        &'a self,
        dimension: &'a Dimension,
        field: &str,
    ) -> Result<ResolvedColumn<'a>> {
        // The id lives on the table holding the foreign key: the fact table,
        // or the intermediate table for a snowflaked dimension.
        let host = match &dimension.kind {
            DimensionKind::Nested { via } => {
                let via_dim = self
                    .dimension(via)
                    .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
                self.table(&via_dim.table)
                    .ok_or_else(|| QueryError::UnknownField(field.to_string()))?
            }
            _ => &self.primary,
        };
        let column = host
            .column(&dimension.foreign_key)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        Ok(ResolvedColumn {
            column,
            table: host,
            dimension: Some(dimension),
        })
    }

    fn resolve_dimension_caption<'a>(
        &'a self,
        dimension: &'a Dimension,
        field: &str,
    ) -> Result<ResolvedColumn<'a>> {
        let table = self
            .table(&dimension.table)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        let column = table
            .column(&dimension.caption_column)
            .ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        Ok(ResolvedColumn {
            column,
            table,
            dimension: Some(dimension),
        })
    }

    /// Join edges needed to reach `target` from the primary table, in join
    /// order. Empty when `target` is the primary table or unreachable.
    pub fn join_path(&self, target: &str) -> Vec<&JoinEdge> {
        if target == self.primary.name {
            return Vec::new();
        }
        let mut graph: UnGraph<(), usize> = UnGraph::new_undirected();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for table in std::iter::once(&self.primary).chain(self.joined.iter()) {
            nodes.insert(table.name.as_str(), graph.add_node(()));
        }
        for (i, edge) in self.joins.iter().enumerate() {
            if let (Some(&a), Some(&b)) = (
                nodes.get(edge.left_table.as_str()),
                nodes.get(edge.right_table.as_str()),
            ) {
                graph.add_edge(a, b, i);
            }
        }
        let start = nodes[self.primary.name.as_str()];
        let goal = match nodes.get(target) {
            Some(&ix) => ix,
            None => return Vec::new(),
        };
        let path = petgraph::algo::astar(&graph, start, |n| n == goal, |_| 1, |_| 0);
        let nodes_on_path = match path {
            Some((_, nodes_on_path)) => nodes_on_path,
            None => return Vec::new(),
        };
        let mut edges = Vec::new();
        for pair in nodes_on_path.windows(2) {
            if let Some(edge_ix) = graph.find_edge(pair[0], pair[1]) {
                if let Some(&i) = graph.edge_weight(edge_ix) {
                    edges.push(&self.joins[i]);
                }
            }
        }
        edges
    }

    /// Caller-facing metadata for every visible column.
    pub fn column_metas(&self) -> Vec<ColumnMeta> {
        let mut metas: Vec<ColumnMeta> =
            self.primary.columns.iter().map(ColumnMeta::of).collect();
        for dimension in &self.dimensions {
            if let Some(table) = self.table(&dimension.table) {
                if let Some(caption) = table.column(&dimension.caption_column) {
                    let mut meta = ColumnMeta::of(caption);
                    meta.name = dimension.caption_field();
                    meta.caption = dimension.caption.clone();
                    metas.push(meta);
                }
            }
        }
        metas
    }
}
