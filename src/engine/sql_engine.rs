//! Request compilation for relational backends.
//!
//! Compilation is a pure function of the model, the request and the engine
//! configuration; nothing touches a database until [`SqlQueryEngine::execute`]
//! hands the compiled statement to an executor.

use std::cell::RefCell;
use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use super::executor::SqlExecutor;
use super::{inline_alias, parse_agg};
use super::request::{ConditionNode, GroupByItem, OrderByItem, QueryOutput, QueryRequest};
use crate::config::EngineConfig;
use crate::error::{QueryError, Result};
use crate::expr::{self, functions};
use crate::formula::{FormulaService, HierarchyOperatorService, Link};
use crate::model::{Aggregation, Column, ColumnKind, QueryModel};
use crate::sql::{DateGranularity, Dialect, SqlExpContext, SqlFragment, SqlResolver};

/// A compiled relational query.
#[derive(Debug, Clone)]
pub struct CompiledSql {
    pub query: SqlFragment,
    /// Second statement computing the row count and measure totals.
    pub total_query: Option<SqlFragment>,
}

/// Compiles [`QueryRequest`]s into SQL for one dialect.
pub struct SqlQueryEngine {
    config: EngineConfig,
    dialect: Dialect,
    formulas: FormulaService,
    hierarchy: HierarchyOperatorService,
}

impl SqlQueryEngine {
    pub fn new(dialect: Dialect) -> SqlQueryEngine {
        SqlQueryEngine::with_config(dialect, EngineConfig::default())
    }

    pub fn with_config(dialect: Dialect, config: EngineConfig) -> SqlQueryEngine {
        SqlQueryEngine {
            config,
            dialect,
            formulas: FormulaService::new(),
            hierarchy: HierarchyOperatorService::new(),
        }
    }

    /// Replace the operator registry, e.g. to add custom formulas.
    pub fn with_formulas(mut self, formulas: FormulaService) -> SqlQueryEngine {
        self.formulas = formulas;
        self
    }

    pub fn compile(&self, model: &QueryModel, request: &QueryRequest) -> Result<CompiledSql> {
        let compiled = Compilation::new(self, model, request).run()?;
        debug!(
            model = %model.name,
            sql = %compiled.query.sql,
            "compiled relational query"
        );
        Ok(compiled)
    }

    /// Compile and run, including the totals statement when requested.
    pub fn execute(
        &self,
        model: &QueryModel,
        request: &QueryRequest,
        executor: &dyn SqlExecutor,
    ) -> Result<QueryOutput> {
        let compiled = self.compile(model, request)?;
        let rows = executor.query(&compiled.query.sql, &compiled.query.params)?;
        let mut output = QueryOutput::of(rows.into_iter().map(Value::Object).collect());

        if let Some(total_query) = compiled.total_query {
            let total_rows = executor.query(&total_query.sql, &total_query.params)?;
            if let Some(mut row) = total_rows.into_iter().next() {
                output.total = row
                    .remove("total")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
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

// =============================================================================
// Per-request compilation state
// =============================================================================

struct CalcField {
    name: String,
    sql: String,
    aggregate: bool,
    /// Requested aggregation for a non-aggregate expression in group mode.
    agg: Option<Aggregation>,
}

/// One item of the SELECT list.
struct SelectItem {
    alias: String,
    sql: String,
    /// Set for measures; drives the totals statement.
    totals: Option<Aggregation>,
}

#[derive(Default)]
struct CondChain {
    fragment: SqlFragment,
    count: usize,
}

impl CondChain {
    fn push(&mut self, link: Link, fragment: SqlFragment) {
        if self.count > 0 {
            self.fragment.push_str(&format!(" {} ", link.sql()));
        }
        self.fragment.push_fragment(fragment);
        self.count += 1;
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }
}

struct Compilation<'a> {
    engine: &'a SqlQueryEngine,
    model: &'a QueryModel,
    request: &'a QueryRequest,
    group_mode: bool,
    calc_fields: Vec<CalcField>,
    columns: Vec<String>,
    /// Non-primary tables touched by any rendered expression, in first-touch
    /// order. RefCell because resolution happens behind `&self` resolvers.
    touched: RefCell<Vec<String>>,
    closure_joins: Vec<String>,
}

impl<'a> Compilation<'a> {
    fn new(
        engine: &'a SqlQueryEngine,
        model: &'a QueryModel,
        request: &'a QueryRequest,
    ) -> Compilation<'a> {
        Compilation {
            engine,
            model,
            request,
            group_mode: !request.group_by.is_empty(),
            calc_fields: Vec::new(),
            columns: Vec::new(),
            touched: RefCell::new(Vec::new()),
            closure_joins: Vec::new(),
        }
    }

    fn run(mut self) -> Result<CompiledSql> {
        self.prepare()?;
        let select = self.build_select()?;
        let request = self.request;
        let (where_chain, having_chain) = self.build_slice(&request.slice)?;
        let group_keys = self.build_group_keys()?;
        let order_sql = self.build_order(&select)?;

        // Join rendering must come last; it consumes the touched-table list.
        let joins = self.build_joins()?;

        let mut base = SqlFragment::new();
        base.push_str("SELECT ");
        let select_sql: Vec<String> = select
            .iter()
            .map(|item| format!("{} AS {}", item.sql, self.quote(&item.alias)))
            .collect();
        base.push_str(&select_sql.join(", "));
        base.push_str(" FROM ");
        base.push_str(&self.model.primary.sql_from());
        for join in &joins {
            base.push_str(" ");
            base.push_str(join);
        }
        for join in &self.closure_joins {
            base.push_str(" ");
            base.push_str(join);
        }
        if !where_chain.is_empty() {
            base.push_str(" WHERE ");
            base.push_fragment(where_chain.fragment);
        }
        if !group_keys.is_empty() {
            base.push_str(" GROUP BY ");
            base.push_str(&group_keys.join(", "));
        }
        if !having_chain.is_empty() {
            base.push_str(" HAVING ");
            base.push_fragment(having_chain.fragment);
        }

        let total_query = if self.request.return_total {
            Some(self.build_totals(&base, &select))
        } else {
            None
        };

        let mut query = base;
        if !order_sql.is_empty() {
            query.push_str(" ORDER BY ");
            query.push_str(&order_sql);
        }
        if let Some(limit) = self.limit_clause() {
            query.push_str(" ");
            query.push_str(&limit);
        }

        Ok(CompiledSql { query, total_query })
    }

    // -------------------------------------------------------------------------
    // Preparation: calculated fields and the effective column list
    // -------------------------------------------------------------------------

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
            // An inline `expr AS alias` column becomes a calculated field.
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
        let aggregate = functions::has_aggregate(&exp)
            || exp
                .columns()
                .iter()
                .any(|c| self.calc_field(c).map_or(false, |f| f.aggregate));
        let sql = SqlExpContext::new(&self.scope()).render(&exp)?;
        self.calc_fields.push(CalcField {
            name: name.to_string(),
            sql,
            aggregate,
            agg,
        });
        Ok(())
    }

    fn calc_field(&self, name: &str) -> Option<&CalcField> {
        self.calc_fields.iter().find(|f| f.name == name)
    }

    fn scope(&self) -> ExprScope<'_> {
        ExprScope {
            model: self.model,
            config: &self.engine.config,
            calc: &self.calc_fields,
            touched: &self.touched,
        }
    }

    fn touch(&self, table: &str) {
        if table == self.model.primary.name {
            return;
        }
        let mut touched = self.touched.borrow_mut();
        if !touched.iter().any(|t| t == table) {
            touched.push(table.to_string());
        }
    }

    fn quote(&self, ident: &str) -> String {
        self.engine.dialect.rules().quote(ident)
    }

    // -------------------------------------------------------------------------
    // SELECT
    // -------------------------------------------------------------------------

    fn build_select(&self) -> Result<Vec<SelectItem>> {
        let mut items = Vec::new();
        if self.group_mode {
            for group in &self.request.group_by {
                // An agg override turns the entry into an aggregate instead
                // of a grouping key; on a measure it replaces the default
                // aggregation.
                if let Some(agg) = self.group_agg(group)? {
                    items.push(SelectItem {
                        alias: group.field.clone(),
                        sql: self.apply_aggregation(&self.raw_field_sql(&group.field)?, agg),
                        totals: Some(agg),
                    });
                    continue;
                }
                items.push(SelectItem {
                    alias: group.field.clone(),
                    sql: self.group_expr(group)?,
                    totals: None,
                });
            }
            for name in &self.columns {
                if self.request.group_by.iter().any(|g| &g.field == name) {
                    continue;
                }
                if let Some(measure) = self.model.measure(name) {
                    items.push(SelectItem {
                        alias: name.clone(),
                        sql: self.aggregated_measure_sql(measure)?,
                        totals: Some(measure.aggregation),
                    });
                } else if let Some(field) = self.calc_field(name) {
                    if field.aggregate {
                        items.push(SelectItem {
                            alias: name.clone(),
                            sql: field.sql.clone(),
                            totals: None,
                        });
                    } else if let Some(agg) = field.agg {
                        items.push(SelectItem {
                            alias: name.clone(),
                            sql: self.apply_aggregation(&field.sql, agg),
                            totals: Some(agg),
                        });
                    }
                }
                // Plain columns outside the grouping keys have no grouped value.
            }
        } else {
            for name in &self.columns {
                items.push(self.plain_select_item(name)?);
            }
        }
        Ok(items)
    }

    fn plain_select_item(&self, name: &str) -> Result<SelectItem> {
        if let Some(field) = self.calc_field(name) {
            return Ok(SelectItem {
                alias: name.to_string(),
                sql: field.sql.clone(),
                totals: None,
            });
        }
        if let Some(measure) = self.model.measure(name) {
            return Ok(SelectItem {
                alias: name.to_string(),
                sql: self.raw_measure_sql(measure)?,
                totals: Some(measure.aggregation),
            });
        }
        let resolved = self.model.find_column(name, &self.engine.config)?;
        self.touch(&resolved.table.name);
        Ok(SelectItem {
            alias: name.to_string(),
            sql: resolved.qualified(),
            totals: matches!(resolved.column.kind, ColumnKind::Measure)
                .then_some(resolved.column.aggregation),
        })
    }

    /// The measure's expression without aggregation applied.
    fn raw_measure_sql(&self, measure: &crate::model::Measure) -> Result<String> {
        if let Some(exp) = measure.formula_exp()? {
            return SqlExpContext::new(&self.scope()).render(exp);
        }
        let resolved = self.model.find_column(&measure.column, &self.engine.config)?;
        self.touch(&resolved.table.name);
        Ok(resolved.qualified())
    }

    /// The unaggregated expression behind any selectable name.
    fn raw_field_sql(&self, name: &str) -> Result<String> {
        if let Some(field) = self.calc_field(name) {
            return Ok(field.sql.clone());
        }
        if let Some(measure) = self.model.measure(name) {
            return self.raw_measure_sql(measure);
        }
        let resolved = self.model.find_column(name, &self.engine.config)?;
        self.touch(&resolved.table.name);
        Ok(resolved.qualified())
    }

    fn apply_aggregation(&self, raw: &str, agg: Aggregation) -> String {
        match agg {
            Aggregation::GroupConcat => self.engine.dialect.rules().group_concat(raw),
            Aggregation::None => raw.to_string(),
            Aggregation::Count => "COUNT(*)".to_string(),
            agg => {
                let name = agg.sql_name().unwrap_or("SUM");
                format!("{name}({raw})")
            }
        }
    }

    fn group_agg(&self, group: &GroupByItem) -> Result<Option<Aggregation>> {
        group.agg.as_deref().map(parse_agg).transpose()
    }

    fn aggregated_measure_sql(&self, measure: &crate::model::Measure) -> Result<String> {
        let raw = self.raw_measure_sql(measure)?;
        if let Some(exp) = measure.formula_exp()? {
            // A formula that aggregates itself is used verbatim.
            if functions::has_aggregate(exp) {
                return Ok(raw);
            }
        }
        Ok(match measure.aggregation {
            Aggregation::GroupConcat => self.engine.dialect.rules().group_concat(&raw),
            Aggregation::None => raw,
            agg => {
                let name = agg.sql_name().unwrap_or("SUM");
                format!("{name}({raw})")
            }
        })
    }

    // -------------------------------------------------------------------------
    // Slice
    // -------------------------------------------------------------------------

    fn build_slice(&mut self, nodes: &[ConditionNode]) -> Result<(CondChain, CondChain)> {
        let mut where_chain = CondChain::default();
        let mut having_chain = CondChain::default();
        let mut plain_fields: Vec<String> = Vec::new();
        let mut aggregate_fields: Vec<String> = Vec::new();
        let mut has_or = false;

        for (i, node) in nodes.iter().enumerate() {
            let link = if i == 0 { Link::And } else { node.chain() };
            if link == Link::Or {
                has_or = true;
            }

            if node.is_junction() {
                let (sub_where, sub_having) = self.build_slice(&node.children)?;
                match (sub_where.is_empty(), sub_having.is_empty()) {
                    (false, true) => {
                        where_chain.push(link, wrap(sub_where.fragment));
                        plain_fields.push("(...)".to_string());
                    }
                    (true, false) => {
                        having_chain.push(link, wrap(sub_having.fragment));
                        aggregate_fields.push("(...)".to_string());
                    }
                    (false, false) => {
                        // A group spanning WHERE and HAVING only splits under AND.
                        if link == Link::Or {
                            return Err(QueryError::MixedOrCondition {
                                aggregate: "(...)".to_string(),
                                plain: "(...)".to_string(),
                            });
                        }
                        where_chain.push(link, wrap(sub_where.fragment));
                        having_chain.push(link, wrap(sub_having.fragment));
                        plain_fields.push("(...)".to_string());
                        aggregate_fields.push("(...)".to_string());
                    }
                    (true, true) => {}
                }
                continue;
            }

            if self.engine.hierarchy.contains(&node.op) {
                if let Some(fragment) = self.build_hierarchy(node)? {
                    where_chain.push(link, fragment);
                    plain_fields.push(node.field.clone());
                }
                continue;
            }

            let (column, column_sql, aggregate) = self.condition_target(node)?;
            self.check_list_size(node)?;
            let op = self.effective_op(&column, &node.op);
            let built =
                self.engine
                    .formulas
                    .build(&op, &column, &column_sql, &node.value)?;
            if let Some(fragment) = built {
                if aggregate {
                    having_chain.push(link, fragment);
                    aggregate_fields.push(node.field.clone());
                } else {
                    where_chain.push(link, fragment);
                    plain_fields.push(node.field.clone());
                }
            }
        }

        if has_or && !plain_fields.is_empty() && !aggregate_fields.is_empty() {
            return Err(QueryError::MixedOrCondition {
                aggregate: aggregate_fields.join(", "),
                plain: plain_fields.join(", "),
            });
        }
        Ok((where_chain, having_chain))
    }

    /// Resolve a condition's target column, its rendered SQL and whether the
    /// condition belongs in HAVING.
    fn condition_target(&self, node: &ConditionNode) -> Result<(Column, String, bool)> {
        if let Some(field) = self.calc_field(&node.field) {
            let mut column = Column::property(&node.field, crate::model::ColumnType::Unknown);
            column.kind = ColumnKind::Calculated;
            return Ok((column, format!("({})", field.sql), field.aggregate));
        }
        if let Some(measure) = self.model.measure(&node.field) {
            let aggregate_formula = measure
                .formula_exp()?
                .map_or(false, functions::has_aggregate);
            if self.group_mode {
                let sql = self.aggregated_measure_sql(measure)?;
                return Ok((
                    Column::property(&node.field, crate::model::ColumnType::Number),
                    sql,
                    true,
                ));
            }
            let sql = self.raw_measure_sql(measure)?;
            return Ok((
                Column::property(&node.field, crate::model::ColumnType::Number),
                format!("({sql})"),
                aggregate_formula,
            ));
        }
        let resolved = self.model.find_column(&node.field, &self.engine.config)?;
        self.touch(&resolved.table.name);
        Ok((resolved.column.clone(), resolved.qualified(), false))
    }

    /// Bit-flag columns filter by mask overlap regardless of requested op.
    fn effective_op(&self, column: &Column, op: &str) -> String {
        if column.is_bit() && matches!(op, "in" | "=") {
            "bitIn".to_string()
        } else {
            op.to_string()
        }
    }

    fn check_list_size(&self, node: &ConditionNode) -> Result<()> {
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
        Ok(())
    }

    fn build_hierarchy(&mut self, node: &ConditionNode) -> Result<Option<SqlFragment>> {
        let operator = self.engine.hierarchy.get(&node.op)?;
        let dim_name = node.field.split('$').next().unwrap_or(&node.field);
        let dimension = self
            .model
            .dimension(dim_name)
            .ok_or_else(|| QueryError::UnknownField(node.field.clone()))?;
        let closure = dimension.closure().ok_or_else(|| QueryError::InvalidOperand {
            op: node.op.clone(),
            message: format!("'{dim_name}' is not a parent-child dimension"),
        })?;

        let id = self
            .model
            .find_column(&dimension.id_field(), &self.engine.config)?;
        let anchor_sql = format!("{}.{}", closure.alias, closure.ancestor_column);
        let anchor_op = if node.value.is_array() { "in" } else { "=" };
        let anchor = self.engine.formulas.build(
            anchor_op,
            id.column,
            &anchor_sql,
            &node.value,
        )?;
        // Without an anchor value the whole condition drops; the closure join
        // must not be emitted either.
        let Some(anchor) = anchor else {
            return Ok(None);
        };
        self.touch(&id.table.name);

        let join = format!(
            "JOIN {} {} ON {}.{} = {}",
            closure.table,
            closure.alias,
            closure.alias,
            closure.descendant_column,
            id.qualified(),
        );
        if !self.closure_joins.contains(&join) {
            self.closure_joins.push(join);
        }

        let distance_sql = format!("{}.{}", closure.alias, closure.distance_column);
        let mut fragment = SqlFragment::new();
        if let Some(distance) = operator.distance_condition(&distance_sql, node.max_depth) {
            fragment.push_str(&distance);
            fragment.push_str(" AND ");
        }
        fragment.push_fragment(anchor);
        Ok(Some(fragment))
    }

    // -------------------------------------------------------------------------
    // GROUP BY / ORDER BY / LIMIT
    // -------------------------------------------------------------------------

    fn group_expr(&self, group: &GroupByItem) -> Result<String> {
        if let Some(field) = self.calc_field(&group.field) {
            return Ok(field.sql.clone());
        }
        let resolved = self.model.find_column(&group.field, &self.engine.config)?;
        self.touch(&resolved.table.name);
        let sql = resolved.qualified();
        if resolved.column.column_type.is_temporal() {
            if let Some(granularity) = group
                .date_granularity
                .as_deref()
                .and_then(DateGranularity::parse)
            {
                return Ok(self.engine.dialect.rules().date_group(&sql, granularity));
            }
        }
        Ok(sql)
    }

    fn build_group_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for group in &self.request.group_by {
            // Agg-overridden entries aggregate; they are not keys.
            if self.group_agg(group)?.is_some() {
                continue;
            }
            keys.push(self.group_expr(group)?);
        }
        Ok(keys)
    }

    fn build_order(&self, select: &[SelectItem]) -> Result<String> {
        let orders: Vec<OrderByItem> = if self.request.order_by.is_empty() {
            self.model
                .orders
                .iter()
                .map(|o| OrderByItem {
                    field: o.field.clone(),
                    desc: o.desc,
                    ..OrderByItem::default()
                })
                .collect()
        } else {
            self.request.order_by.clone()
        };

        let mut parts = Vec::with_capacity(orders.len());
        for order in &orders {
            let selected = select.iter().any(|item| item.alias == order.field);
            // Grouped output can only sort by what it selects.
            if self.group_mode && !selected {
                warn!(field = %order.field, "order field absent from grouped selection, skipped");
                continue;
            }
            // Selected columns order by alias, anything else by expression.
            let expr = if selected {
                self.quote(&order.field)
            } else if let Some(field) = self.calc_field(&order.field) {
                field.sql.clone()
            } else {
                let resolved = self.model.find_column(&order.field, &self.engine.config)?;
                self.touch(&resolved.table.name);
                resolved.qualified()
            };
            let direction = if order.desc { " DESC" } else { "" };
            if order.null_first || order.null_last {
                if let Some(clause) = self.engine.dialect.rules().nulls_clause(order.null_first) {
                    parts.push(format!("{expr}{direction} {clause}"));
                    continue;
                }
                // Emulated with a leading boolean key: IS NULL sorts nulls
                // last ascending, IS NOT NULL sorts them first.
                parts.push(if order.null_first {
                    format!("{expr} IS NOT NULL")
                } else {
                    format!("{expr} IS NULL")
                });
            }
            parts.push(format!("{expr}{direction}"));
        }
        Ok(parts.join(", "))
    }

    fn limit_clause(&self) -> Option<String> {
        let size = self.request.limit.or(self.engine.config.default_limit)?;
        let offset = self.request.start.unwrap_or(0);
        Some(self.engine.dialect.rules().limit_offset(size, offset))
    }

    // -------------------------------------------------------------------------
    // Joins
    // -------------------------------------------------------------------------

    fn build_joins(&self) -> Result<Vec<String>> {
        let mut reached: HashSet<String> = HashSet::new();
        reached.insert(self.model.primary.name.clone());
        let mut clauses = Vec::new();

        let touched = self.touched.borrow().clone();
        for target in &touched {
            for edge in self.model.join_path(target) {
                let (new_table, new_column, old_table, old_column) =
                    if reached.contains(&edge.left_table) {
                        (
                            &edge.right_table,
                            &edge.right_column,
                            &edge.left_table,
                            &edge.left_column,
                        )
                    } else {
                        (
                            &edge.left_table,
                            &edge.left_column,
                            &edge.right_table,
                            &edge.right_column,
                        )
                    };
                if reached.contains(new_table) {
                    continue;
                }
                let new_model = self
                    .model
                    .table(new_table)
                    .ok_or_else(|| QueryError::UnknownField(new_table.clone()))?;
                let old_model = self
                    .model
                    .table(old_table)
                    .ok_or_else(|| QueryError::UnknownField(old_table.clone()))?;
                let new_physical = new_model
                    .column(new_column)
                    .map(|c| c.physical.clone())
                    .unwrap_or_else(|| new_column.clone());
                let old_physical = old_model
                    .column(old_column)
                    .map(|c| c.physical.clone())
                    .unwrap_or_else(|| old_column.clone());
                clauses.push(format!(
                    "LEFT JOIN {} ON {}.{} = {}.{}",
                    new_model.sql_from(),
                    old_model.alias,
                    old_physical,
                    new_model.alias,
                    new_physical,
                ));
                reached.insert(new_table.clone());
            }
        }
        Ok(clauses)
    }

    // -------------------------------------------------------------------------
    // Totals
    // -------------------------------------------------------------------------

    /// Wrap the unordered base statement and aggregate across every page.
    fn build_totals(&self, base: &SqlFragment, select: &[SelectItem]) -> SqlFragment {
        let mut outer_items = Vec::new();
        for item in select {
            let Some(aggregation) = item.totals else {
                continue;
            };
            let alias = self.quote(&item.alias);
            let column = format!("tx.{alias}");
            // Grouped counts are per-group row counts; summing them restores
            // the overall count.
            let outer = match (self.group_mode, aggregation) {
                (_, Aggregation::GroupConcat) | (_, Aggregation::None) => continue,
                (true, Aggregation::Count) | (_, Aggregation::Sum) => format!("SUM({column})"),
                (false, Aggregation::Count) => format!("COUNT({column})"),
                (_, Aggregation::Avg) => format!("AVG({column})"),
                (_, Aggregation::Min) => format!("MIN({column})"),
                (_, Aggregation::Max) => format!("MAX({column})"),
            };
            outer_items.push(format!("{outer} AS {alias}"));
        }
        outer_items.push("COUNT(*) AS total".to_string());

        let mut total = SqlFragment::new();
        total.push_str("SELECT ");
        total.push_str(&outer_items.join(", "));
        total.push_str(" FROM (");
        total.push_fragment(base.clone());
        total.push_str(") tx");
        total
    }
}

fn wrap(fragment: SqlFragment) -> SqlFragment {
    let mut wrapped = SqlFragment::raw("(");
    wrapped.push_fragment(fragment);
    wrapped.push_str(")");
    wrapped
}

// =============================================================================
// Name resolution inside expressions
// =============================================================================

/// Resolves names referenced by formulas: calculated fields defined earlier
/// in the request, then measures, then model columns. Forward references to
/// later calculated fields fail as unknown fields.
struct ExprScope<'a> {
    model: &'a QueryModel,
    config: &'a EngineConfig,
    calc: &'a [CalcField],
    touched: &'a RefCell<Vec<String>>,
}

impl SqlResolver for ExprScope<'_> {
    fn resolve(&self, name: &str) -> Result<String> {
        if let Some(field) = self.calc.iter().find(|f| f.name == name) {
            return Ok(format!("({})", field.sql));
        }
        if let Some(measure) = self.model.measure(name) {
            if let Some(exp) = measure.formula_exp()? {
                return SqlExpContext::new(self).render(exp);
            }
            let resolved = self.model.find_column(&measure.column, self.config)?;
            self.touch(&resolved.table.name);
            return Ok(resolved.qualified());
        }
        let resolved = self.model.find_column(name, self.config)?;
        self.touch(&resolved.table.name);
        Ok(resolved.qualified())
    }
}

impl ExprScope<'_> {
    fn touch(&self, table: &str) {
        if table == self.model.primary.name {
            return;
        }
        let mut touched = self.touched.borrow_mut();
        if !touched.iter().any(|t| t == table) {
            touched.push(table.to_string());
        }
    }
}
