//! The semantic model: tables, columns, dimensions, measures and the query
//! models that tie them together.

pub mod column;
pub mod dimension;
pub mod loader;
pub mod measure;
pub mod query_model;
pub mod table;
pub mod types;

pub use column::{Column, ColumnKind, ColumnMeta, DictEntry};
pub use dimension::{ClosureTable, Dimension, DimensionKind};
pub use loader::{parse_catalog, LoadError, LoadResult, ModelCatalog};
pub use measure::Measure;
pub use query_model::{JoinEdge, ModelOrder, QueryModel, ResolvedColumn};
pub use table::{Source, TableModel};
pub use types::{Aggregation, ColumnType};
