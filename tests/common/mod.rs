#![allow(dead_code)]

//! Shared fixtures: a relational sales model, a document events model and
//! recording executors.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use facet::engine::{DocumentExecutor, Row, SqlExecutor};
use facet::error::Result;
use facet::model::{parse_catalog, QueryModel};
use facet::sql::ParamValue;

pub const CATALOG: &str = r#"
[[tables]]
name = "orders"
alias = "t0"
id_column = "id"

[tables.source]
table = "t_orders"

[[tables.columns]]
name = "id"
type = "INTEGER"

[[tables.columns]]
name = "orderdate"
type = "DAY"

[[tables.columns]]
name = "status"
type = "TEXT"

[[tables.columns]]
name = "qty"
type = "INTEGER"

[[tables.columns]]
name = "flags"
type = "BIT"

[[tables.columns]]
name = "totaldue"
type = "MONEY"
kind = "measure"
aggregation = "SUM"

[[tables.columns]]
name = "freight"
type = "MONEY"
kind = "measure"
aggregation = "SUM"

[[tables.columns]]
name = "team_id"
type = "INTEGER"
kind = "dimension"
dimension = "team"

[[tables]]
name = "teams"
alias = "t1"

[tables.source]
table = "t_teams"

[[tables.columns]]
name = "id"
type = "INTEGER"

[[tables.columns]]
name = "name"
type = "TEXT"

[[tables.columns]]
name = "region_id"
type = "INTEGER"

[[tables]]
name = "regions"
alias = "t2"

[tables.source]
table = "t_regions"

[[tables.columns]]
name = "id"
type = "INTEGER"

[[tables.columns]]
name = "name"
type = "TEXT"

[[tables]]
name = "events"
alias = "e"

[tables.source]
collection = "events"

[[tables.columns]]
name = "kind"
type = "TEXT"

[[tables.columns]]
name = "amount"
type = "MONEY"
kind = "measure"
aggregation = "SUM"

[[tables.columns]]
name = "duration"
type = "INTEGER"

[[tables.columns]]
name = "createdAt"
type = "DATETIME"
physical = "created_at"

[[models]]
name = "sales"
table = "orders"
default_columns = ["id", "orderdate", "status"]

[[models.dimensions]]
name = "team"
caption = "Team"
table = "teams"
foreign_key = "team_id"
caption_column = "name"

[models.dimensions.closure]
table = "t_team_closure"
alias = "tc"

[[models.dimensions]]
name = "region"
caption = "Region"
table = "regions"
foreign_key = "region_id"
caption_column = "name"
nested_via = "team"

[[models.measures]]
name = "totaldue"
column = "totaldue"
aggregation = "SUM"

[[models.measures]]
name = "freight"
column = "freight"
aggregation = "SUM"

[[models.measures]]
name = "net"
column = "totaldue"
aggregation = "SUM"
formula = "totaldue - freight"

[[models.measures]]
name = "orderCount"
column = "id"
aggregation = "COUNT"

[[models.orders]]
field = "orderdate"
desc = true

[[models]]
name = "events"
table = "events"
default_columns = ["kind", "amount", "duration"]

[[models.measures]]
name = "amount"
column = "amount"
aggregation = "SUM"

[[models.measures]]
name = "netAmount"
column = "amount"
aggregation = "SUM"
formula = "amount - duration"
"#;

pub fn catalog() -> HashMap<String, Arc<QueryModel>> {
    parse_catalog(CATALOG).expect("fixture catalog parses")
}

pub fn sales() -> Arc<QueryModel> {
    catalog().remove("sales").expect("sales model")
}

pub fn events() -> Arc<QueryModel> {
    catalog().remove("events").expect("events model")
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("object row")
}

/// SQL executor that records every statement and replays canned rows.
pub struct RecordingSql {
    pub calls: RefCell<Vec<(String, Vec<ParamValue>)>>,
    responses: RefCell<VecDeque<Vec<Row>>>,
}

impl RecordingSql {
    pub fn new(responses: Vec<Vec<Row>>) -> RecordingSql {
        RecordingSql {
            calls: RefCell::new(Vec::new()),
            responses: RefCell::new(responses.into()),
        }
    }
}

impl SqlExecutor for RecordingSql {
    fn query(&self, sql: &str, params: &[ParamValue]) -> Result<Vec<Row>> {
        self.calls
            .borrow_mut()
            .push((sql.to_string(), params.to_vec()));
        Ok(self.responses.borrow_mut().pop_front().unwrap_or_default())
    }
}

/// Document executor that records every pipeline and replays canned rows.
pub struct RecordingDocuments {
    pub calls: RefCell<Vec<(String, Vec<Value>)>>,
    responses: RefCell<VecDeque<Vec<Row>>>,
}

impl RecordingDocuments {
    pub fn new(responses: Vec<Vec<Row>>) -> RecordingDocuments {
        RecordingDocuments {
            calls: RefCell::new(Vec::new()),
            responses: RefCell::new(responses.into()),
        }
    }
}

impl DocumentExecutor for RecordingDocuments {
    fn aggregate(&self, collection: &str, pipeline: &[Value]) -> Result<Vec<Row>> {
        self.calls
            .borrow_mut()
            .push((collection.to_string(), pipeline.to_vec()));
        Ok(self.responses.borrow_mut().pop_front().unwrap_or_default())
    }
}
