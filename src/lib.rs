//! # Facet
//!
//! A semantic query compiler: one declarative model of dimensions, measures,
//! properties and hierarchies, compiled into either parameterized SQL or a
//! MongoDB aggregation pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Model definitions (tables, dimensions,            │
//! │              measures, query models)                     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [loader]
//! ┌─────────────────────────────────────────────────────────┐
//! │        ModelCatalog (immutable QueryModel graph)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!      QueryRequest ──────►│ [engine]
//!                          ▼
//! ┌──────────────────────────┬──────────────────────────────┐
//! │   SqlQueryEngine         │   MongoQueryEngine            │
//! │   (SQL + bound params)   │   (aggregation pipeline)      │
//! └──────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Both engines share the expression compiler ([`expr`]), the operator
//! services ([`formula`]) and the semantic model ([`model`]); only the
//! fragment renderers ([`sql`], [`mongo`]) differ.

pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod formula;
pub mod model;
pub mod mongo;
pub mod sql;

pub use config::{BareDimension, EngineConfig};
pub use error::{QueryError, Result};
pub use model::{ModelCatalog, QueryModel, TableModel};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{BareDimension, EngineConfig};
    pub use crate::engine::executor::{DocumentExecutor, Row, SqlExecutor};
    pub use crate::engine::request::{
        CalculatedFieldDef, ConditionNode, GroupByItem, OrderByItem, QueryOutput, QueryRequest,
    };
    pub use crate::engine::{MongoQueryEngine, SqlQueryEngine};
    pub use crate::error::{QueryError, Result};
    pub use crate::formula::{FormulaService, HierarchyOperatorService, Link};
    pub use crate::model::{ModelCatalog, QueryModel};
    pub use crate::sql::{Dialect, ParamValue, SqlFragment};
}
