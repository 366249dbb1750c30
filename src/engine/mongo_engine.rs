//! Request compilation for the document backend.
//!
//! One model maps onto one collection; the compiled form is an aggregation
//! pipeline of plain JSON stages. Joined models are rejected up front, the
//! document backend never fans out across collections.

use serde_json::{json, Map, Value};
use tracing::debug;

use super::executor::DocumentExecutor;
use super::request::{ConditionNode, QueryOutput, QueryRequest};
use super::{inline_alias, parse_agg};
use crate::config::EngineConfig;
use crate::error::{QueryError, Result};
use crate::expr;
use crate::formula::{HierarchyOperatorService, Link};
use crate::model::{Aggregation, Column, Measure, QueryModel, Source};
use crate::mongo::{MongoExpContext, MongoFragment, MongoResolver};

/// A compiled aggregation pipeline.
#[derive(Debug, Clone)]
pub struct CompiledPipeline {
    pub collection: String,
    pub pipeline: Vec<Value>,
    /// Second pipeline computing the document count and measure totals.
    pub total_pipeline: Option<Vec<Value>>,
}

/// Compiles [`QueryRequest`]s into aggregation pipelines.
pub struct MongoQueryEngine {
    config: EngineConfig,
    hierarchy: HierarchyOperatorService,
}

impl MongoQueryEngine {
    pub fn new() -> MongoQueryEngine {
        MongoQueryEngine::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> MongoQueryEngine {
        MongoQueryEngine {
            config,
            hierarchy: HierarchyOperatorService::new(),
        }
    }

    pub fn compile(&self, model: &QueryModel, request: &QueryRequest) -> Result<CompiledPipeline> {
        let compiled = PipelineBuilder::new(self, model, request)?.run()?;
        debug!(
            model = %model.name,
            stages = compiled.pipeline.len(),
            "compiled aggregation pipeline"
        );
        Ok(compiled)
    }

    pub fn execute(
        &self,
        model: &QueryModel,
        request: &QueryRequest,
        executor: &dyn DocumentExecutor,
    ) -> Result<QueryOutput> {
        let compiled = self.compile(model, request)?;
        let rows = executor.aggregate(&compiled.collection, &compiled.pipeline)?;
        let items = rows
            .into_iter()
            .map(|mut row| {
                normalize_id(&mut row);
                Value::Object(row)
            })
            .collect();
        let mut output = QueryOutput::of(items);

        if let Some(total_pipeline) = compiled.total_pipeline {
            let rows = executor.aggregate(&compiled.collection, &total_pipeline)?;
            if let Some(mut row) = rows.into_iter().next() {
                output.total = row.remove("total").and_then(|v| v.as_i64()).unwrap_or(0);
                row.remove("_id");
                if !row.is_empty() {
                    output.totals = Some(Value::Object(row));
                }
            } else {
                output.total = 0;
            }
        }
        Ok(output)
    }
}

impl Default for MongoQueryEngine {
    fn default() -> Self {
        MongoQueryEngine::new()
    }
}

/// Extended JSON object ids flatten to their hex string.
fn normalize_id(row: &mut Map<String, Value>) {
    if let Some(Value::Object(id)) = row.get("_id") {
        if let Some(Value::String(hex)) = id.get("$oid") {
            let hex = hex.clone();
            row.insert("_id".to_string(), Value::String(hex));
        }
    }
}

// =============================================================================
// Pipeline assembly
// =============================================================================

struct CalcField {
    name: String,
    fragment: MongoFragment,
    /// Requested aggregation for a non-aggregate expression in group mode.
    agg: Option<Aggregation>,
}

struct PipelineBuilder<'a> {
    engine: &'a MongoQueryEngine,
    model: &'a QueryModel,
    request: &'a QueryRequest,
    collection: String,
    group_mode: bool,
    calc_fields: Vec<CalcField>,
    columns: Vec<String>,
}

impl<'a> PipelineBuilder<'a> {
    fn new(
        engine: &'a MongoQueryEngine,
        model: &'a QueryModel,
        request: &'a QueryRequest,
    ) -> Result<PipelineBuilder<'a>> {
        if !model.joined.is_empty() || !model.dimensions.is_empty() {
            return Err(QueryError::UnsupportedJoin(model.name.clone()));
        }
        let collection = match &model.primary.source {
            Source::Collection(c) => c.clone(),
            Source::Table(t) => t.clone(),
            Source::View(_) => return Err(QueryError::UnsupportedJoin(model.name.clone())),
        };
        Ok(PipelineBuilder {
            engine,
            model,
            request,
            collection,
            group_mode: !request.group_by.is_empty(),
            calc_fields: Vec::new(),
            columns: Vec::new(),
        })
    }

    fn run(mut self) -> Result<CompiledPipeline> {
        self.prepare()?;

        let match_stage = self.build_match(&self.request.slice)?;
        let mut pipeline = Vec::new();
        if let Some(condition) = match_stage.clone() {
            pipeline.push(json!({"$match": condition}));
        }
        // Calculated fields materialize before projection so later stages
        // can address them by name.
        if let Some(add_fields) = self.add_fields_stage() {
            pipeline.push(add_fields);
        }
        if self.group_mode {
            pipeline.push(self.group_stage()?);
            pipeline.push(self.group_project_stage());
        } else {
            pipeline.push(self.project_stage()?);
        }
        if let Some(sort) = self.sort_stage() {
            pipeline.push(sort);
        }
        if let Some(size) = self.request.limit.or(self.engine.config.default_limit) {
            let skip = self.request.start.unwrap_or(0);
            if skip > 0 {
                pipeline.push(json!({"$skip": skip}));
            }
            pipeline.push(json!({"$limit": size}));
        }

        let total_pipeline = if self.request.return_total {
            Some(self.build_totals(match_stage)?)
        } else {
            None
        };

        Ok(CompiledPipeline {
            collection: self.collection,
            pipeline,
            total_pipeline,
        })
    }

    fn prepare(&mut self) -> Result<()> {
        for def in &self.request.calculated_fields {
            let agg = def.agg.as_deref().map(parse_agg).transpose()?;
            self.add_calc_field(&def.name, &def.expression, agg)?;
        }
        let requested = if self.request.columns.is_empty() {
            self.model.default_columns.clone()
        } else {
            self.request.columns.clone()
        };
        for name in requested {
            if self.request.ex_columns.contains(&name) {
                continue;
            }
            if let Some((expression, alias)) = inline_alias(&name) {
                self.add_calc_field(&alias, &expression, None)?;
                self.columns.push(alias);
            } else {
                self.columns.push(name);
            }
        }
        Ok(())
    }

    fn add_calc_field(
        &mut self,
        name: &str,
        expression: &str,
        agg: Option<Aggregation>,
    ) -> Result<()> {
        let exp = expr::compile(expression)?;
        let fragment = MongoExpContext::new(&self.scope()).render(&exp)?;
        self.calc_fields.push(CalcField {
            name: name.to_string(),
            fragment,
            agg,
        });
        Ok(())
    }

    fn calc_field(&self, name: &str) -> Option<&CalcField> {
        self.calc_fields.iter().find(|f| f.name == name)
    }

    fn scope(&self) -> FieldScope<'_> {
        FieldScope {
            model: self.model,
            calc: &self.calc_fields,
        }
    }

    fn column(&self, name: &str) -> Result<&Column> {
        self.model
            .primary
            .column(name)
            .ok_or_else(|| QueryError::UnknownField(name.to_string()))
    }

    /// A measure's pipeline expression: its compiled formula when it has
    /// one, the backing field path otherwise.
    fn measure_fragment(&self, measure: &Measure) -> Result<MongoFragment> {
        if let Some(exp) = measure.formula_exp()? {
            return MongoExpContext::new(&self.scope()).render(exp);
        }
        let column = self.column(&measure.column)?;
        Ok(MongoFragment::field(
            &column.physical,
            Some(column.column_type),
        ))
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    fn add_fields_stage(&self) -> Option<Value> {
        let mut fields = Map::new();
        for field in &self.calc_fields {
            if !field.fragment.has_aggregate {
                fields.insert(field.name.clone(), field.fragment.value.clone());
            }
        }
        if fields.is_empty() {
            None
        } else {
            Some(json!({"$addFields": fields}))
        }
    }

    fn project_stage(&self) -> Result<Value> {
        let mut projection = Map::new();
        for name in &self.columns {
            if self.calc_field(name).is_some() {
                projection.insert(name.clone(), json!(1));
            } else if let Some(measure) = self.model.measure(name) {
                projection.insert(name.clone(), self.measure_fragment(measure)?.value);
            } else {
                let column = self.column(name)?;
                projection.insert(name.clone(), json!(format!("${}", column.physical)));
            }
        }
        Ok(json!({"$project": projection}))
    }

    fn group_stage(&self) -> Result<Value> {
        let mut id = Map::new();
        for group in &self.request.group_by {
            // Agg-overridden entries aggregate; they are not keys.
            if group.agg.is_some() {
                continue;
            }
            let value = if let Some(field) = self.calc_field(&group.field) {
                field.fragment.value.clone()
            } else {
                let column = self.column(&group.field)?;
                let path = format!("${}", column.physical);
                match (
                    column.column_type.is_temporal(),
                    group.date_granularity.as_deref(),
                ) {
                    (true, Some(granularity)) => date_to_string(&path, granularity),
                    _ => json!(path),
                }
            };
            id.insert(group.field.clone(), value);
        }

        let mut stage = Map::new();
        stage.insert("_id".to_string(), Value::Object(id));
        for group in &self.request.group_by {
            let Some(text) = group.agg.as_deref() else {
                continue;
            };
            let agg = parse_agg(text)?;
            if let Some(entry) = self.accumulator_entry(&group.field, agg)? {
                stage.insert(group.field.clone(), entry);
            }
        }
        for name in &self.columns {
            if self.request.group_by.iter().any(|g| &g.field == name) {
                continue;
            }
            if let Some(field) = self.calc_field(name) {
                if field.fragment.has_aggregate {
                    stage.insert(name.clone(), field.fragment.value.clone());
                } else if let Some(agg) = field.agg {
                    if let Some(accumulator) = agg.mongo_accumulator() {
                        let value = if agg == Aggregation::Count {
                            json!(1)
                        } else {
                            field.fragment.value.clone()
                        };
                        stage.insert(name.clone(), json!({accumulator: value}));
                    }
                }
                continue;
            }
            if let Some(measure) = self.model.measure(name) {
                if let Some(entry) = self.accumulator_entry(name, measure.aggregation)? {
                    stage.insert(name.clone(), entry);
                }
            }
        }
        Ok(json!({"$group": stage}))
    }

    /// The `$group` accumulator for one field under one aggregation, or
    /// `None` when the aggregation has no pipeline form.
    fn accumulator_entry(&self, field: &str, agg: Aggregation) -> Result<Option<Value>> {
        let Some(accumulator) = agg.mongo_accumulator() else {
            return Ok(None);
        };
        if agg == Aggregation::Count {
            return Ok(Some(json!({accumulator: 1})));
        }
        let fragment = if let Some(measure) = self.model.measure(field) {
            self.measure_fragment(measure)?
        } else {
            self.scope().resolve(field)?
        };
        // A formula that aggregates itself already is an accumulator.
        if fragment.has_aggregate {
            return Ok(Some(fragment.value));
        }
        Ok(Some(json!({accumulator: fragment.value})))
    }

    /// Flatten the grouped `_id` keys back to top-level field names.
    fn group_project_stage(&self) -> Value {
        let mut projection = Map::new();
        projection.insert("_id".to_string(), json!(0));
        for group in &self.request.group_by {
            if group.agg.is_some() {
                projection.insert(group.field.clone(), json!(1));
            } else {
                projection.insert(
                    group.field.clone(),
                    json!(format!("$_id.{}", group.field)),
                );
            }
        }
        for name in &self.columns {
            if self.request.group_by.iter().any(|g| &g.field == name) {
                continue;
            }
            let grouped = self.model.measure(name).is_some()
                || self
                    .calc_field(name)
                    .map_or(false, |f| f.fragment.has_aggregate || f.agg.is_some());
            if grouped {
                projection.insert(name.clone(), json!(1));
            }
        }
        json!({"$project": projection})
    }

    fn sort_stage(&self) -> Option<Value> {
        let orders: Vec<(String, bool)> = if self.request.order_by.is_empty() {
            self.model
                .orders
                .iter()
                .map(|o| (o.field.clone(), o.desc))
                .collect()
        } else {
            self.request
                .order_by
                .iter()
                .map(|o| (o.field.clone(), o.desc))
                .collect()
        };
        if orders.is_empty() {
            return None;
        }
        let mut sort = Map::new();
        for (field, desc) in &orders {
            sort.insert(field.clone(), json!(if *desc { -1 } else { 1 }));
        }
        // A tie-breaking key keeps pagination stable across identical sort
        // values. Grouped output has no _id.
        if !self.group_mode && !sort.contains_key("_id") {
            sort.insert("_id".to_string(), json!(1));
        }
        Some(json!({"$sort": sort}))
    }

    fn build_totals(&self, match_stage: Option<Value>) -> Result<Vec<Value>> {
        let mut pipeline = Vec::new();
        if let Some(condition) = match_stage {
            pipeline.push(json!({"$match": condition}));
        }
        if let Some(add_fields) = self.add_fields_stage() {
            pipeline.push(add_fields);
        }
        if self.group_mode {
            pipeline.push(self.group_stage()?);
            pipeline.push(self.group_project_stage());
        }

        let mut stage = Map::new();
        stage.insert("_id".to_string(), Value::Null);
        stage.insert("total".to_string(), json!({"$sum": 1}));
        for name in &self.columns {
            let Some(measure) = self.model.measure(name) else {
                continue;
            };
            if self.group_mode {
                // Per-group values fold with SUM, except averages.
                let accumulator = match measure.aggregation {
                    Aggregation::Avg => "$avg",
                    Aggregation::Min => "$min",
                    Aggregation::Max => "$max",
                    Aggregation::GroupConcat | Aggregation::None => continue,
                    _ => "$sum",
                };
                stage.insert(name.clone(), json!({accumulator: format!("${name}")}));
            } else if let Some(entry) = self.accumulator_entry(name, measure.aggregation)? {
                stage.insert(name.clone(), entry);
            }
        }
        pipeline.push(json!({"$group": stage}));
        Ok(pipeline)
    }

    // -------------------------------------------------------------------------
    // Match conditions
    // -------------------------------------------------------------------------

    fn build_match(&self, nodes: &[ConditionNode]) -> Result<Option<Value>> {
        let mut or_groups: Vec<Vec<Value>> = Vec::new();
        let mut current: Vec<Value> = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let condition = if node.is_junction() {
                self.build_match(&node.children)?
            } else {
                self.leaf_condition(node)?
            };
            let Some(condition) = condition else {
                continue;
            };
            if i > 0 && node.chain() == Link::Or && !current.is_empty() {
                or_groups.push(std::mem::take(&mut current));
            }
            current.push(condition);
        }
        if !current.is_empty() {
            or_groups.push(current);
        }

        let mut alternatives: Vec<Value> = or_groups
            .into_iter()
            .map(|group| {
                if group.len() == 1 {
                    group.into_iter().next().unwrap_or(Value::Null)
                } else {
                    json!({"$and": group})
                }
            })
            .collect();
        Ok(match alternatives.len() {
            0 => None,
            1 => Some(alternatives.remove(0)),
            _ => Some(json!({"$or": alternatives})),
        })
    }

    fn leaf_condition(&self, node: &ConditionNode) -> Result<Option<Value>> {
        if self.engine.hierarchy.contains(&node.op) {
            return Err(QueryError::InvalidOperand {
                op: node.op.clone(),
                message: "hierarchy operators require a relational model".to_string(),
            });
        }
        if let (Some(max), Value::Array(items)) =
            (self.engine.config.max_in_list, &node.value)
        {
            if items.len() > max {
                return Err(QueryError::InvalidOperand {
                    op: node.op.clone(),
                    message: format!("value list has {} elements, limit is {max}", items.len()),
                });
            }
        }
        if let Some(field) = self.calc_field(&node.field) {
            return self.expr_condition(node, field);
        }
        let column = if let Some(measure) = self.model.measure(&node.field) {
            self.column(&measure.column)?
        } else {
            self.column(&node.field)?
        };
        let key = column.physical.clone();

        let format = |value: &Value| -> Result<Value> { column.format_value(value) };
        let format_list = |values: &[Value]| -> Result<Vec<Value>> {
            values.iter().map(|v| {
                if v.is_null() {
                    Ok(Value::Null)
                } else {
                    column.format_value(v)
                }
            }).collect()
        };
        let empty = node.value.is_null()
            || matches!(&node.value, Value::String(s) if s.trim().is_empty());

        let effective_op = if column.is_bit() && matches!(node.op.as_str(), "in" | "=") {
            "bitIn"
        } else {
            node.op.as_str()
        };

        let condition = match effective_op {
            "=" => match &node.value {
                _ if empty => return Ok(None),
                Value::Array(items) => json!({key: {"$in": format_list(items)?}}),
                value => json!({key: format(value)?}),
            },
            "==" => {
                let value = if empty { json!("") } else { format(&node.value)? };
                json!({key: value})
            }
            "!=" | "<>" => match &node.value {
                _ if empty => return Ok(None),
                Value::Array(items) => json!({key: {"$nin": format_list(items)?}}),
                value => json!({key: {"$ne": format(value)?}}),
            },
            ">" | ">=" | "<" | "<=" => {
                if empty {
                    return Ok(None);
                }
                let operator = match effective_op {
                    ">" => "$gt",
                    ">=" => "$gte",
                    "<" => "$lt",
                    _ => "$lte",
                };
                json!({key: {operator: format(&node.value)?}})
            }
            "in" | "not in" => {
                let operator = if effective_op == "in" { "$in" } else { "$nin" };
                let values = match &node.value {
                    _ if empty => return Ok(None),
                    Value::Array(items) if items.is_empty() => return Ok(None),
                    Value::Array(items) => format_list(items)?,
                    value => vec![format(value)?],
                };
                json!({key: {operator: values}})
            }
            "bitIn" => {
                let masks = match &node.value {
                    _ if empty => return Ok(None),
                    Value::Array(items) if items.is_empty() => return Ok(None),
                    Value::Array(items) => format_list(items)?,
                    value => vec![format(value)?],
                };
                json!({key: {"$bitsAnySet": masks}})
            }
            "like" | "left_like" | "right_like" | "not like" => {
                if empty {
                    return Ok(None);
                }
                let text = match &node.value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let escaped = regex::escape(&text);
                let pattern = match effective_op {
                    "right_like" => format!("^{escaped}"),
                    "left_like" => format!("{escaped}$"),
                    _ => escaped,
                };
                if effective_op == "not like" {
                    json!({key: {"$not": {"$regex": pattern}}})
                } else {
                    json!({key: {"$regex": pattern}})
                }
            }
            "isNull" => json!({key: null}),
            "isNotNull" => json!({key: {"$ne": null}}),
            "isNullOrEmpty" => json!({key: {"$in": [null, ""]}}),
            "isNotNullOrEmpty" => json!({key: {"$nin": [null, ""]}}),
            "[]" | "[)" | "(]" | "()" => {
                let Value::Array(items) = &node.value else {
                    if empty {
                        return Ok(None);
                    }
                    return Err(QueryError::InvalidOperand {
                        op: node.op.clone(),
                        message: "range takes [low, high]".to_string(),
                    });
                };
                if items.len() != 2 {
                    return Err(QueryError::InvalidOperand {
                        op: node.op.clone(),
                        message: format!("range takes [low, high], got {} values", items.len()),
                    });
                }
                let mut bounds = Map::new();
                if !items[0].is_null() {
                    let operator = if node.op.starts_with('[') { "$gte" } else { "$gt" };
                    bounds.insert(operator.to_string(), format(&items[0])?);
                }
                if !items[1].is_null() {
                    let operator = if node.op.ends_with(']') { "$lte" } else { "$lt" };
                    bounds.insert(operator.to_string(), format(&items[1])?);
                }
                if bounds.is_empty() {
                    return Ok(None);
                }
                json!({key: bounds})
            }
            other => return Err(QueryError::OperatorNotFound(other.to_string())),
        };
        Ok(Some(condition))
    }

    /// Conditions on calculated fields compare through `$expr`.
    fn expr_condition(&self, node: &ConditionNode, field: &CalcField) -> Result<Option<Value>> {
        if field.fragment.has_aggregate {
            return Err(QueryError::InvalidOperand {
                op: node.op.clone(),
                message: format!(
                    "cannot filter on aggregate calculated field '{}'",
                    node.field
                ),
            });
        }
        if node.value.is_null() {
            return Ok(None);
        }
        let operator = match node.op.as_str() {
            "=" | "==" => "$eq",
            "!=" | "<>" => "$ne",
            ">" => "$gt",
            ">=" => "$gte",
            "<" => "$lt",
            "<=" => "$lte",
            "in" => "$in",
            other => {
                return Err(QueryError::InvalidOperand {
                    op: other.to_string(),
                    message: "operator not supported on calculated fields here".to_string(),
                })
            }
        };
        Ok(Some(json!({"$expr": {
            operator: [field.fragment.value.clone(), node.value.clone()]
        }})))
    }
}

// =============================================================================
// Name resolution inside expressions
// =============================================================================

/// Resolves formula references: earlier calculated fields, then measures,
/// then collection fields.
struct FieldScope<'a> {
    model: &'a QueryModel,
    calc: &'a [CalcField],
}

impl MongoResolver for FieldScope<'_> {
    fn resolve(&self, name: &str) -> Result<MongoFragment> {
        if let Some(field) = self.calc.iter().find(|f| f.name == name) {
            return Ok(field.fragment.clone());
        }
        if let Some(measure) = self.model.measure(name) {
            if let Some(exp) = measure.formula_exp()? {
                return MongoExpContext::new(self).render(exp);
            }
            let column = self
                .model
                .primary
                .column(&measure.column)
                .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
            return Ok(MongoFragment::field(
                &column.physical,
                Some(column.column_type),
            ));
        }
        let column = self
            .model
            .primary
            .column(name)
            .ok_or_else(|| QueryError::UnknownField(name.to_string()))?;
        Ok(MongoFragment::field(
            &column.physical,
            Some(column.column_type),
        ))
    }
}

/// Date bucket formats for `$dateToString`.
fn date_to_string(path: &str, granularity: &str) -> Value {
    let format = match granularity.to_ascii_lowercase().as_str() {
        "year" => "%Y",
        "month" => "%Y-%m",
        "hour" => "%Y-%m-%d %H:00",
        _ => "%Y-%m-%d",
    };
    json!({"$dateToString": {"format": format, "date": path}})
}
