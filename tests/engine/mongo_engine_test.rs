//! End-to-end aggregation pipeline compilation and execution.

#[path = "../common/mod.rs"]
mod common;

use facet::engine::{
    CalculatedFieldDef, ConditionNode, GroupByItem, MongoQueryEngine, OrderByItem, QueryRequest,
};
use facet::error::QueryError;
use serde_json::json;

fn engine() -> MongoQueryEngine {
    MongoQueryEngine::new()
}

fn request() -> QueryRequest {
    QueryRequest {
        model: "events".into(),
        ..QueryRequest::default()
    }
}

#[test]
fn test_default_columns_project() {
    let compiled = engine().compile(&common::events(), &request()).unwrap();
    assert_eq!(compiled.collection, "events");
    assert_eq!(
        compiled.pipeline,
        vec![json!({"$project": {
            "kind": "$kind",
            "amount": "$amount",
            "duration": "$duration",
        }})]
    );
}

#[test]
fn test_ex_columns_trim_the_projection() {
    let mut req = request();
    req.ex_columns = vec!["duration".into()];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$project": {
            "kind": "$kind",
            "amount": "$amount",
        }})
    );
}

#[test]
fn test_physical_field_names_are_used() {
    let mut req = request();
    req.columns = vec!["createdAt".into()];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$project": {"createdAt": "$created_at"}})
    );
}

#[test]
fn test_equality_match() {
    let mut req = request();
    req.slice = vec![ConditionNode {
        field: "kind".into(),
        op: "=".into(),
        value: json!("click"),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(compiled.pipeline[0], json!({"$match": {"kind": "click"}}));
}

#[test]
fn test_or_groups_split_on_link() {
    let mut req = request();
    req.slice = vec![
        ConditionNode {
            field: "kind".into(),
            op: "=".into(),
            value: json!("click"),
            ..ConditionNode::default()
        },
        ConditionNode {
            field: "duration".into(),
            op: ">".into(),
            value: json!(60),
            ..ConditionNode::default()
        },
        ConditionNode {
            field: "kind".into(),
            op: "=".into(),
            value: json!("view"),
            link: 2,
            ..ConditionNode::default()
        },
    ];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$match": {"$or": [
            {"$and": [{"kind": "click"}, {"duration": {"$gt": 60}}]},
            {"kind": "view"},
        ]}})
    );
}

#[test]
fn test_like_operators_become_anchored_regex() {
    let mut req = request();
    req.slice = vec![ConditionNode {
        field: "kind".into(),
        op: "right_like".into(),
        value: json!("cli"),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$match": {"kind": {"$regex": "^cli"}}})
    );
}

#[test]
fn test_range_renders_bound_operators() {
    let mut req = request();
    req.slice = vec![ConditionNode {
        field: "duration".into(),
        op: "[)".into(),
        value: json!([10, 20]),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$match": {"duration": {"$gte": 10, "$lt": 20}}})
    );
}

#[test]
fn test_null_or_empty_checks() {
    let mut req = request();
    req.slice = vec![ConditionNode {
        field: "kind".into(),
        op: "isNullOrEmpty".into(),
        value: json!(null),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$match": {"kind": {"$in": [null, ""]}}})
    );
}

#[test]
fn test_empty_values_drop_conditions() {
    let mut req = request();
    req.slice = vec![ConditionNode {
        field: "kind".into(),
        op: "=".into(),
        value: json!(""),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert!(compiled
        .pipeline
        .iter()
        .all(|stage| stage.get("$match").is_none()));
}

#[test]
fn test_calculated_field_adds_before_project() {
    let mut req = request();
    req.columns = vec!["kind".into(), "minutes".into()];
    req.calculated_fields = vec![CalculatedFieldDef {
        name: "minutes".into(),
        expression: "duration / 60".into(),
        ..CalculatedFieldDef::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$addFields": {"minutes": {"$divide": ["$duration", 60]}}})
    );
    assert_eq!(
        compiled.pipeline[1],
        json!({"$project": {"kind": "$kind", "minutes": 1}})
    );
}

#[test]
fn test_formula_measure_projects_its_expression() {
    let mut req = request();
    req.columns = vec!["kind".into(), "netAmount".into()];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$project": {
            "kind": "$kind",
            "netAmount": {"$subtract": ["$amount", "$duration"]},
        }})
    );
}

#[test]
fn test_formula_measure_groups_over_its_expression() {
    let mut req = request();
    req.columns = vec!["netAmount".into()];
    req.group_by = vec![GroupByItem {
        field: "kind".into(),
        ..GroupByItem::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$group": {
            "_id": {"kind": "$kind"},
            "netAmount": {"$sum": {"$subtract": ["$amount", "$duration"]}},
        }})
    );
}

#[test]
fn test_group_by_agg_entry_aggregates_instead_of_keying() {
    let mut req = request();
    req.columns = vec!["amount".into()];
    req.group_by = vec![
        GroupByItem {
            field: "kind".into(),
            ..GroupByItem::default()
        },
        GroupByItem {
            field: "duration".into(),
            agg: Some("MAX".into()),
            ..GroupByItem::default()
        },
    ];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$group": {
            "_id": {"kind": "$kind"},
            "duration": {"$max": "$duration"},
            "amount": {"$sum": "$amount"},
        }})
    );
    assert_eq!(
        compiled.pipeline[1],
        json!({"$project": {
            "_id": 0,
            "kind": "$_id.kind",
            "duration": 1,
            "amount": 1,
        }})
    );
}

#[test]
fn test_group_stage_flattens_keys() {
    let mut req = request();
    req.columns = vec!["amount".into()];
    req.group_by = vec![GroupByItem {
        field: "kind".into(),
        date_granularity: None,
        ..GroupByItem::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0],
        json!({"$group": {
            "_id": {"kind": "$kind"},
            "amount": {"$sum": "$amount"},
        }})
    );
    assert_eq!(
        compiled.pipeline[1],
        json!({"$project": {"_id": 0, "kind": "$_id.kind", "amount": 1}})
    );
}

#[test]
fn test_temporal_group_uses_date_to_string() {
    let mut req = request();
    req.columns = vec!["amount".into()];
    req.group_by = vec![GroupByItem {
        field: "createdAt".into(),
        date_granularity: Some("month".into()),
        ..GroupByItem::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    assert_eq!(
        compiled.pipeline[0]["$group"]["_id"]["createdAt"],
        json!({"$dateToString": {"format": "%Y-%m", "date": "$created_at"}})
    );
}

#[test]
fn test_sort_and_pagination_with_stable_tiebreak() {
    let mut req = request();
    req.columns = vec!["kind".into()];
    req.order_by = vec![OrderByItem {
        field: "kind".into(),
        desc: true,
        ..OrderByItem::default()
    }];
    req.start = Some(10);
    req.limit = Some(10);
    let compiled = engine().compile(&common::events(), &req).unwrap();
    let n = compiled.pipeline.len();
    assert_eq!(
        compiled.pipeline[n - 3],
        json!({"$sort": {"kind": -1, "_id": 1}})
    );
    assert_eq!(compiled.pipeline[n - 2], json!({"$skip": 10}));
    assert_eq!(compiled.pipeline[n - 1], json!({"$limit": 10}));
}

#[test]
fn test_totals_pipeline_counts_and_sums() {
    let mut req = request();
    req.columns = vec!["kind".into(), "amount".into()];
    req.return_total = true;
    req.slice = vec![ConditionNode {
        field: "kind".into(),
        op: "=".into(),
        value: json!("click"),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::events(), &req).unwrap();
    let totals = compiled.total_pipeline.unwrap();
    assert_eq!(totals[0], json!({"$match": {"kind": "click"}}));
    assert_eq!(
        totals[1],
        json!({"$group": {
            "_id": null,
            "total": {"$sum": 1},
            "amount": {"$sum": "$amount"},
        }})
    );
}

#[test]
fn test_joined_model_is_rejected() {
    let err = engine()
        .compile(
            &common::sales(),
            &QueryRequest {
                model: "sales".into(),
                ..QueryRequest::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, QueryError::UnsupportedJoin(name) if name == "sales"));
}

#[test]
fn test_hierarchy_operators_are_rejected() {
    let mut req = request();
    req.slice = vec![ConditionNode {
        field: "kind".into(),
        op: "descendantsOf".into(),
        value: json!(1),
        ..ConditionNode::default()
    }];
    assert!(matches!(
        engine().compile(&common::events(), &req).unwrap_err(),
        QueryError::InvalidOperand { .. }
    ));
}

#[test]
fn test_execute_normalizes_object_ids_and_totals() {
    let mut req = request();
    req.columns = vec!["kind".into(), "amount".into()];
    req.return_total = true;
    let executor = common::RecordingDocuments::new(vec![
        vec![common::row(json!({
            "_id": {"$oid": "64b0c9f1a2"},
            "kind": "click",
            "amount": 3.5,
        }))],
        vec![common::row(json!({"_id": null, "total": 1, "amount": 3.5}))],
    ]);
    let output = engine()
        .execute(&common::events(), &req, &executor)
        .unwrap();
    assert_eq!(output.items[0]["_id"], json!("64b0c9f1a2"));
    assert_eq!(output.total, 1);
    assert_eq!(output.totals, Some(json!({"amount": 3.5})));
    assert_eq!(executor.calls.borrow()[0].0, "events");
}
