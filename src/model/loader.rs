//! Declarative model definitions.
//!
//! Table and query models are described in TOML, loaded once at startup and
//! frozen. A hot-reload collaborator rebuilds the whole definition set and
//! swaps it into the [`ModelCatalog`] atomically; concurrent readers see
//! either the old or the new graph in full, never a mix.
//!
//! ```toml
//! [[tables]]
//! name = "orders"
//! alias = "t0"
//! [tables.source]
//! table = "t_orders"
//!
//! [[tables.columns]]
//! name = "status"
//! type = "TEXT"
//!
//! [[models]]
//! name = "orders"
//! table = "orders"
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use thiserror::Error;

use super::column::{Column, ColumnKind, DictEntry};
use super::dimension::{ClosureTable, Dimension, DimensionKind};
use super::measure::Measure;
use super::query_model::{JoinEdge, ModelOrder, QueryModel};
use super::table::{Source, TableModel};
use super::types::{Aggregation, ColumnType};

/// Errors raised while loading model definitions.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model definitions: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate column '{column}' in table model '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("duplicate table model '{0}'")]
    DuplicateTable(String),

    #[error("duplicate query model '{0}'")]
    DuplicateModel(String),

    #[error("query model '{model}' references unknown table model '{table}'")]
    UnknownTable { model: String, table: String },

    #[error("dimension '{dimension}' in model '{model}': {message}")]
    InvalidDimension {
        model: String,
        dimension: String,
        message: String,
    },
}

/// Result type for model loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

// =============================================================================
// Definition shapes (serde)
// =============================================================================

#[derive(Debug, Deserialize)]
struct CatalogDef {
    #[serde(default)]
    tables: Vec<TableDef>,
    #[serde(default)]
    models: Vec<ModelDef>,
}

#[derive(Debug, Deserialize)]
struct TableDef {
    name: String,
    source: SourceDef,
    alias: Option<String>,
    id_column: Option<String>,
    #[serde(default)]
    columns: Vec<ColumnDef>,
}

#[derive(Debug, Deserialize)]
struct SourceDef {
    table: Option<String>,
    view: Option<String>,
    collection: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnDef {
    name: String,
    caption: Option<String>,
    #[serde(rename = "type", default = "default_type")]
    column_type: ColumnType,
    physical: Option<String>,
    #[serde(default = "default_kind")]
    kind: String,
    dimension: Option<String>,
    #[serde(default = "default_true")]
    filterable: bool,
    #[serde(default)]
    aggregatable: bool,
    aggregation: Option<String>,
    #[serde(default)]
    dict: Vec<DictEntryDef>,
}

fn default_type() -> ColumnType {
    ColumnType::Text
}

fn default_kind() -> String {
    "property".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct DictEntryDef {
    value: toml::Value,
    label: String,
}

#[derive(Debug, Deserialize)]
struct ModelDef {
    name: String,
    table: String,
    #[serde(default)]
    dimensions: Vec<DimensionDef>,
    #[serde(default)]
    measures: Vec<MeasureDef>,
    #[serde(default)]
    joins: Vec<JoinDef>,
    #[serde(default)]
    default_columns: Vec<String>,
    #[serde(default)]
    orders: Vec<OrderDef>,
}

#[derive(Debug, Deserialize)]
struct DimensionDef {
    name: String,
    caption: Option<String>,
    table: String,
    foreign_key: String,
    #[serde(default = "default_pk")]
    primary_key: String,
    caption_column: String,
    nested_via: Option<String>,
    closure: Option<ClosureDef>,
}

fn default_pk() -> String {
    "id".to_string()
}

#[derive(Debug, Deserialize)]
struct ClosureDef {
    table: String,
    alias: Option<String>,
    #[serde(default = "default_ancestor")]
    ancestor_column: String,
    #[serde(default = "default_descendant")]
    descendant_column: String,
    #[serde(default = "default_distance")]
    distance_column: String,
}

fn default_ancestor() -> String {
    "ancestor_id".to_string()
}

fn default_descendant() -> String {
    "descendant_id".to_string()
}

fn default_distance() -> String {
    "distance".to_string()
}

#[derive(Debug, Deserialize)]
struct MeasureDef {
    name: String,
    caption: Option<String>,
    column: String,
    #[serde(default = "default_agg")]
    aggregation: String,
    formula: Option<String>,
}

fn default_agg() -> String {
    "SUM".to_string()
}

#[derive(Debug, Deserialize)]
struct JoinDef {
    left_table: String,
    left_column: String,
    right_table: String,
    right_column: String,
}

#[derive(Debug, Deserialize)]
struct OrderDef {
    field: String,
    #[serde(default)]
    desc: bool,
}

// =============================================================================
// Building
// =============================================================================

fn build_table(def: TableDef) -> LoadResult<TableModel> {
    let source = if let Some(t) = def.source.table {
        Source::Table(t)
    } else if let Some(v) = def.source.view {
        Source::View(v)
    } else if let Some(c) = def.source.collection {
        Source::Collection(c)
    } else {
        Source::Table(def.name.clone())
    };
    let alias = def.alias.unwrap_or_else(|| format!("t_{}", def.name));
    let mut table = TableModel::new(def.name.clone(), source, alias);
    table.id_column = def.id_column;

    let mut seen = HashSet::new();
    for col in def.columns {
        if !seen.insert(col.name.clone()) {
            return Err(LoadError::DuplicateColumn {
                table: def.name,
                column: col.name,
            });
        }
        table.columns.push(build_column(col));
    }
    Ok(table)
}

fn build_column(def: ColumnDef) -> Column {
    let kind = match def.kind.as_str() {
        "measure" => ColumnKind::Measure,
        "dimension" => ColumnKind::Dimension {
            dimension: def.dimension.unwrap_or_else(|| def.name.clone()),
        },
        _ => ColumnKind::Property,
    };
    let aggregatable = def.aggregatable || matches!(kind, ColumnKind::Measure);
    Column {
        caption: def.caption.unwrap_or_else(|| def.name.clone()),
        physical: def.physical.unwrap_or_else(|| def.name.clone()),
        name: def.name,
        column_type: def.column_type,
        kind,
        filterable: def.filterable,
        aggregatable,
        aggregation: def
            .aggregation
            .as_deref()
            .and_then(Aggregation::parse)
            .unwrap_or(Aggregation::None),
        dict: def
            .dict
            .into_iter()
            .map(|d| DictEntry {
                value: toml_to_json(d.value),
                label: d.label,
            })
            .collect(),
    }
}

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::Value::from(i),
        toml::Value::Float(f) => {
            serde_json::Number::from_f64(f).map_or(serde_json::Value::Null, serde_json::Value::Number)
        }
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        other => serde_json::Value::String(other.to_string()),
    }
}

fn build_model(def: ModelDef, tables: &HashMap<String, TableModel>) -> LoadResult<QueryModel> {
    let primary = tables
        .get(&def.table)
        .ok_or_else(|| LoadError::UnknownTable {
            model: def.name.clone(),
            table: def.table.clone(),
        })?
        .clone();

    let mut joined = Vec::new();
    let mut joins: Vec<JoinEdge> = def
        .joins
        .into_iter()
        .map(|j| JoinEdge {
            left_table: j.left_table,
            left_column: j.left_column,
            right_table: j.right_table,
            right_column: j.right_column,
        })
        .collect();

    let mut dimensions = Vec::new();
    for d in def.dimensions {
        let dim_table = tables
            .get(&d.table)
            .ok_or_else(|| LoadError::UnknownTable {
                model: def.name.clone(),
                table: d.table.clone(),
            })?;
        if dim_table.column(&d.caption_column).is_none() {
            return Err(LoadError::InvalidDimension {
                model: def.name.clone(),
                dimension: d.name.clone(),
                message: format!("caption column '{}' not found", d.caption_column),
            });
        }
        if !joined.iter().any(|t: &TableModel| t.name == dim_table.name) {
            joined.push(dim_table.clone());
        }

        let kind = if let Some(closure) = d.closure {
            DimensionKind::ParentChild {
                closure: ClosureTable {
                    alias: closure.alias.unwrap_or_else(|| format!("cl_{}", d.name)),
                    table: closure.table,
                    ancestor_column: closure.ancestor_column,
                    descendant_column: closure.descendant_column,
                    distance_column: closure.distance_column,
                },
            }
        } else if let Some(via) = d.nested_via {
            DimensionKind::Nested { via }
        } else {
            DimensionKind::Plain
        };

        // Fact-to-dimension join derived from the FK unless declared.
        let host = match &kind {
            DimensionKind::Nested { via } => via.clone(),
            _ => primary.name.clone(),
        };
        let derived = JoinEdge {
            left_table: host,
            left_column: d.foreign_key.clone(),
            right_table: d.table.clone(),
            right_column: d.primary_key.clone(),
        };
        if !joins.contains(&derived) {
            joins.push(derived);
        }

        dimensions.push(Dimension {
            caption: d.caption.unwrap_or_else(|| d.name.clone()),
            name: d.name,
            table: d.table,
            foreign_key: d.foreign_key,
            primary_key: d.primary_key,
            caption_column: d.caption_column,
            kind,
        });
    }

    // Snowflake targets join through their via-dimension's table; fix up the
    // derived edge now that every dimension is known.
    for dimension in &dimensions {
        if let DimensionKind::Nested { via } = &dimension.kind {
            if let Some(via_dim) = dimensions.iter().find(|d| &d.name == via) {
                for join in &mut joins {
                    if join.right_table == dimension.table && join.left_table == *via {
                        join.left_table = via_dim.table.clone();
                    }
                }
            }
        }
    }

    let measures = def
        .measures
        .into_iter()
        .map(|m| {
            let mut measure = Measure::new(
                m.name,
                m.column,
                Aggregation::parse(&m.aggregation).unwrap_or(Aggregation::Sum),
            );
            if let Some(caption) = m.caption {
                measure.caption = caption;
            }
            if let Some(formula) = m.formula {
                measure = measure.with_formula(formula);
            }
            measure
        })
        .collect();

    let default_columns = if def.default_columns.is_empty() {
        primary.columns.iter().map(|c| c.name.clone()).collect()
    } else {
        def.default_columns
    };

    Ok(QueryModel {
        name: def.name,
        primary,
        joined,
        joins,
        dimensions,
        measures,
        default_columns,
        orders: def
            .orders
            .into_iter()
            .map(|o| ModelOrder {
                field: o.field,
                desc: o.desc,
            })
            .collect(),
    })
}

/// Parse a full catalog definition from TOML text.
pub fn parse_catalog(text: &str) -> LoadResult<HashMap<String, Arc<QueryModel>>> {
    let def: CatalogDef = toml::from_str(text)?;

    let mut tables: HashMap<String, TableModel> = HashMap::new();
    for table_def in def.tables {
        let table = build_table(table_def)?;
        if tables.contains_key(&table.name) {
            return Err(LoadError::DuplicateTable(table.name));
        }
        tables.insert(table.name.clone(), table);
    }

    let mut models: HashMap<String, Arc<QueryModel>> = HashMap::new();
    for model_def in def.models {
        let model = build_model(model_def, &tables)?;
        if models.contains_key(&model.name) {
            return Err(LoadError::DuplicateModel(model.name));
        }
        models.insert(model.name.clone(), Arc::new(model));
    }
    Ok(models)
}

// =============================================================================
// Catalog
// =============================================================================

/// The process-wide set of query models.
///
/// Readers take an [`Arc`] snapshot; [`ModelCatalog::swap`] replaces the
/// whole map in one reference store. Models are never mutated in place.
#[derive(Debug, Default)]
pub struct ModelCatalog {
    models: RwLock<Arc<HashMap<String, Arc<QueryModel>>>>,
}

impl ModelCatalog {
    pub fn new() -> ModelCatalog {
        ModelCatalog::default()
    }

    /// Build a catalog from TOML definitions.
    pub fn from_toml_str(text: &str) -> LoadResult<ModelCatalog> {
        let catalog = ModelCatalog::new();
        catalog.swap(parse_catalog(text)?);
        Ok(catalog)
    }

    /// Fetch one model from the current snapshot.
    pub fn get(&self, name: &str) -> Option<Arc<QueryModel>> {
        self.models.read().expect("catalog lock").get(name).cloned()
    }

    /// The current full snapshot.
    pub fn snapshot(&self) -> Arc<HashMap<String, Arc<QueryModel>>> {
        self.models.read().expect("catalog lock").clone()
    }

    /// Atomically replace the whole model graph.
    pub fn swap(&self, models: HashMap<String, Arc<QueryModel>>) {
        *self.models.write().expect("catalog lock") = Arc::new(models);
    }
}
