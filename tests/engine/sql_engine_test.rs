//! End-to-end SQL compilation and execution.

#[path = "../common/mod.rs"]
mod common;

use facet::config::EngineConfig;
use facet::engine::{
    CalculatedFieldDef, ConditionNode, GroupByItem, OrderByItem, QueryRequest, SqlQueryEngine,
};
use facet::error::QueryError;
use facet::sql::{Dialect, ParamValue};
use serde_json::json;

fn engine() -> SqlQueryEngine {
    SqlQueryEngine::new(Dialect::MySql)
}

fn request() -> QueryRequest {
    QueryRequest {
        model: "sales".into(),
        ..QueryRequest::default()
    }
}

#[test]
fn test_default_columns_and_model_order() {
    let compiled = engine().compile(&common::sales(), &request()).unwrap();
    assert_eq!(
        compiled.query.sql,
        "SELECT t0.id AS `id`, t0.orderdate AS `orderdate`, t0.status AS `status` \
         FROM t_orders t0 ORDER BY `orderdate` DESC"
    );
    assert!(compiled.query.params.is_empty());
    assert!(compiled.total_query.is_none());
}

#[test]
fn test_ex_columns_trim_the_selection() {
    let mut req = request();
    req.ex_columns = vec!["status".into()];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert_eq!(
        compiled.query.sql,
        "SELECT t0.id AS `id`, t0.orderdate AS `orderdate` \
         FROM t_orders t0 ORDER BY `orderdate` DESC"
    );
}

#[test]
fn test_dimension_caption_pulls_a_join() {
    let mut req = request();
    req.columns = vec!["id".into(), "team$caption".into()];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert_eq!(
        compiled.query.sql,
        "SELECT t0.id AS `id`, t1.name AS `team$caption` FROM t_orders t0 \
         LEFT JOIN t_teams t1 ON t0.team_id = t1.id ORDER BY t0.orderdate DESC"
    );
}

#[test]
fn test_snowflake_dimension_chains_two_joins() {
    let mut req = request();
    req.columns = vec!["id".into(), "region$caption".into()];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    let sql = &compiled.query.sql;
    assert!(sql.contains("LEFT JOIN t_teams t1 ON t0.team_id = t1.id"));
    assert!(sql.contains("LEFT JOIN t_regions t2 ON t1.region_id = t2.id"));
}

#[test]
fn test_condition_only_fields_also_pull_joins() {
    let mut req = request();
    req.columns = vec!["id".into()];
    req.slice = vec![ConditionNode {
        field: "team$caption".into(),
        op: "like".into(),
        value: json!("north"),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled.query.sql.contains("LEFT JOIN t_teams t1"));
    assert!(compiled.query.sql.contains("WHERE t1.name LIKE ?"));
}

#[test]
fn test_where_chains_conditions_with_links() {
    let mut req = request();
    req.columns = vec!["id".into()];
    req.slice = vec![
        ConditionNode {
            field: "status".into(),
            op: "=".into(),
            value: json!("open"),
            ..ConditionNode::default()
        },
        ConditionNode {
            field: "qty".into(),
            op: "[)".into(),
            value: json!([1, 10]),
            ..ConditionNode::default()
        },
    ];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .contains("WHERE t0.status = ? AND t0.qty >= ? AND t0.qty < ?"));
    assert_eq!(
        compiled.query.params,
        vec![
            ParamValue::String("open".into()),
            ParamValue::Int(1),
            ParamValue::Int(10),
        ]
    );
}

#[test]
fn test_junction_nodes_render_parenthesized() {
    let mut req = request();
    req.columns = vec!["id".into()];
    req.slice = vec![
        ConditionNode {
            field: "status".into(),
            op: "=".into(),
            value: json!("open"),
            ..ConditionNode::default()
        },
        ConditionNode {
            link: 2,
            children: vec![
                ConditionNode {
                    field: "qty".into(),
                    op: ">".into(),
                    value: json!(5),
                    ..ConditionNode::default()
                },
                ConditionNode {
                    field: "qty".into(),
                    op: "<".into(),
                    value: json!(2),
                    link: 2,
                    ..ConditionNode::default()
                },
            ],
            ..ConditionNode::default()
        },
    ];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .contains("WHERE t0.status = ? OR (t0.qty > ? OR t0.qty < ?)"));
}

#[test]
fn test_dropped_conditions_leave_no_where() {
    let mut req = request();
    req.columns = vec!["id".into()];
    req.slice = vec![ConditionNode {
        field: "status".into(),
        op: "=".into(),
        value: json!(""),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(!compiled.query.sql.contains("WHERE"));
}

#[test]
fn test_bit_column_rewrites_in_to_mask_test() {
    let mut req = request();
    req.columns = vec!["id".into()];
    req.slice = vec![ConditionNode {
        field: "flags".into(),
        op: "in".into(),
        value: json!([1, 4]),
        ..ConditionNode::default()
    }];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .contains("WHERE ((t0.flags & ?) > 0 OR (t0.flags & ?) > 0)"));
}

#[test]
fn test_calculated_fields_resolve_left_to_right() {
    let mut req = request();
    req.columns = vec!["id".into(), "margin".into()];
    req.calculated_fields = vec![
        CalculatedFieldDef {
            name: "netValue".into(),
            expression: "totaldue - freight".into(),
            ..CalculatedFieldDef::default()
        },
        CalculatedFieldDef {
            name: "margin".into(),
            expression: "netValue / totaldue".into(),
            ..CalculatedFieldDef::default()
        },
    ];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .contains("(t0.totaldue - t0.freight) / t0.totaldue AS `margin`"));
}

#[test]
fn test_forward_reference_is_unknown() {
    let mut req = request();
    req.calculated_fields = vec![
        CalculatedFieldDef {
            name: "a".into(),
            expression: "b + 1".into(),
            ..CalculatedFieldDef::default()
        },
        CalculatedFieldDef {
            name: "b".into(),
            expression: "qty * 2".into(),
            ..CalculatedFieldDef::default()
        },
    ];
    let err = engine().compile(&common::sales(), &req).unwrap_err();
    assert!(matches!(err, QueryError::UnknownField(name) if name == "b"));
}

#[test]
fn test_inline_expression_column_hoists_to_calculated_field() {
    let mut req = request();
    req.columns = vec!["id".into(), "totaldue - freight AS net2".into()];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .contains("t0.totaldue - t0.freight AS `net2`"));
}

#[test]
fn test_measure_formula_expands_in_select() {
    let mut req = request();
    req.columns = vec!["id".into(), "net".into()];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .contains("t0.totaldue - t0.freight AS `net`"));
}

#[test]
fn test_group_by_date_bucket() {
    let mut req = request();
    req.columns = vec!["totaldue".into()];
    req.group_by = vec![GroupByItem {
        field: "orderdate".into(),
        date_granularity: Some("month".into()),
        ..GroupByItem::default()
    }];
    req.order_by = vec![OrderByItem {
        field: "orderdate".into(),
        desc: false,
        ..OrderByItem::default()
    }];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert_eq!(
        compiled.query.sql,
        "SELECT DATE_FORMAT(t0.orderdate, '%Y-%m') AS `orderdate`, \
         SUM(t0.totaldue) AS `totaldue` FROM t_orders t0 \
         GROUP BY DATE_FORMAT(t0.orderdate, '%Y-%m') ORDER BY `orderdate`"
    );
}

#[test]
fn test_group_by_agg_entry_aggregates_instead_of_keying() {
    let mut req = request();
    req.columns = vec!["totaldue".into()];
    req.group_by = vec![
        GroupByItem {
            field: "status".into(),
            ..GroupByItem::default()
        },
        GroupByItem {
            field: "qty".into(),
            agg: Some("MAX".into()),
            ..GroupByItem::default()
        },
    ];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert_eq!(
        compiled.query.sql,
        "SELECT t0.status AS `status`, MAX(t0.qty) AS `qty`, \
         SUM(t0.totaldue) AS `totaldue` FROM t_orders t0 GROUP BY t0.status"
    );
}

#[test]
fn test_group_by_agg_overrides_measure_default() {
    let mut req = request();
    req.columns = vec!["status".into()];
    req.group_by = vec![
        GroupByItem {
            field: "status".into(),
            ..GroupByItem::default()
        },
        GroupByItem {
            field: "totaldue".into(),
            agg: Some("AVG".into()),
            ..GroupByItem::default()
        },
    ];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled.query.sql.contains("AVG(t0.totaldue) AS `totaldue`"));
    assert!(compiled.query.sql.contains("GROUP BY t0.status"));
}

#[test]
fn test_calculated_field_agg_applies_in_group_mode() {
    let mut req = request();
    req.columns = vec!["gross".into()];
    req.calculated_fields = vec![CalculatedFieldDef {
        name: "gross".into(),
        expression: "totaldue + freight".into(),
        agg: Some("SUM".into()),
        ..CalculatedFieldDef::default()
    }];
    req.group_by = vec![GroupByItem {
        field: "status".into(),
        ..GroupByItem::default()
    }];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .contains("SUM(t0.totaldue + t0.freight) AS `gross`"));
}

#[test]
fn test_measure_condition_in_group_mode_goes_to_having() {
    let mut req = request();
    req.columns = vec!["totaldue".into()];
    req.group_by = vec![GroupByItem {
        field: "status".into(),
        date_granularity: None,
        ..GroupByItem::default()
    }];
    req.slice = vec![
        ConditionNode {
            field: "qty".into(),
            op: ">".into(),
            value: json!(0),
            ..ConditionNode::default()
        },
        ConditionNode {
            field: "totaldue".into(),
            op: ">".into(),
            value: json!(100),
            ..ConditionNode::default()
        },
    ];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    let sql = &compiled.query.sql;
    assert!(sql.contains("WHERE t0.qty > ?"));
    assert!(sql.contains("GROUP BY t0.status"));
    assert!(sql.contains("HAVING SUM(t0.totaldue) > ?"));
    // WHERE params bind before HAVING params.
    assert_eq!(
        compiled.query.params,
        vec![ParamValue::Int(0), ParamValue::Int(100)]
    );
}

#[test]
fn test_or_between_plain_and_aggregate_is_rejected() {
    let mut req = request();
    req.columns = vec!["totaldue".into()];
    req.group_by = vec![GroupByItem {
        field: "status".into(),
        date_granularity: None,
        ..GroupByItem::default()
    }];
    req.slice = vec![
        ConditionNode {
            field: "qty".into(),
            op: ">".into(),
            value: json!(0),
            ..ConditionNode::default()
        },
        ConditionNode {
            field: "totaldue".into(),
            op: ">".into(),
            value: json!(100),
            link: 2,
            ..ConditionNode::default()
        },
    ];
    let err = engine().compile(&common::sales(), &req).unwrap_err();
    assert!(matches!(err, QueryError::MixedOrCondition { .. }));
}

#[test]
fn test_null_placement_emulated_on_mysql() {
    let mut req = request();
    req.columns = vec!["id".into(), "orderdate".into()];
    req.order_by = vec![OrderByItem {
        field: "orderdate".into(),
        desc: true,
        null_last: true,
        ..OrderByItem::default()
    }];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .ends_with("ORDER BY `orderdate` IS NULL, `orderdate` DESC"));
}

#[test]
fn test_null_placement_uses_native_clause_on_postgres() {
    let engine = SqlQueryEngine::new(Dialect::Postgres);
    let mut req = request();
    req.columns = vec!["id".into(), "orderdate".into()];
    req.order_by = vec![OrderByItem {
        field: "orderdate".into(),
        null_first: true,
        ..OrderByItem::default()
    }];
    let compiled = engine.compile(&common::sales(), &req).unwrap();
    assert!(compiled
        .query
        .sql
        .ends_with("ORDER BY \"orderdate\" NULLS FIRST"));
}

#[test]
fn test_group_mode_skips_unselected_order_fields() {
    let mut req = request();
    req.columns = vec!["totaldue".into()];
    req.group_by = vec![GroupByItem {
        field: "status".into(),
        date_granularity: None,
        ..GroupByItem::default()
    }];
    req.order_by = vec![OrderByItem {
        field: "qty".into(),
        ..OrderByItem::default()
    }];
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(!compiled.query.sql.contains("ORDER BY"));
}

#[test]
fn test_pagination_appends_limit_offset() {
    let mut req = request();
    req.columns = vec!["id".into()];
    req.start = Some(40);
    req.limit = Some(20);
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    assert!(compiled.query.sql.ends_with("LIMIT 20 OFFSET 40"));
}

#[test]
fn test_default_limit_comes_from_config() {
    let config = EngineConfig {
        default_limit: Some(500),
        ..EngineConfig::default()
    };
    let engine = SqlQueryEngine::with_config(Dialect::MySql, config);
    let mut req = request();
    req.columns = vec!["id".into()];
    let compiled = engine.compile(&common::sales(), &req).unwrap();
    assert!(compiled.query.sql.ends_with("LIMIT 500"));
}

#[test]
fn test_in_list_size_limit() {
    let config = EngineConfig {
        max_in_list: Some(2),
        ..EngineConfig::default()
    };
    let engine = SqlQueryEngine::with_config(Dialect::MySql, config);
    let mut req = request();
    req.columns = vec!["id".into()];
    req.slice = vec![ConditionNode {
        field: "qty".into(),
        op: "in".into(),
        value: json!([1, 2, 3]),
        ..ConditionNode::default()
    }];
    assert!(matches!(
        engine.compile(&common::sales(), &req).unwrap_err(),
        QueryError::InvalidOperand { .. }
    ));
}

#[test]
fn test_postgres_dialect_changes_quoting_and_dates() {
    let engine = SqlQueryEngine::new(Dialect::Postgres);
    let mut req = request();
    req.columns = vec!["totaldue".into()];
    req.group_by = vec![GroupByItem {
        field: "orderdate".into(),
        date_granularity: Some("day".into()),
        ..GroupByItem::default()
    }];
    let compiled = engine.compile(&common::sales(), &req).unwrap();
    let sql = &compiled.query.sql;
    assert!(sql.contains("TO_CHAR(t0.orderdate, 'YYYY-MM-DD')"));
    assert!(sql.contains("AS \"totaldue\""));
}

#[test]
fn test_totals_statement_wraps_the_unpaginated_query() {
    let mut req = request();
    req.columns = vec!["id".into(), "totaldue".into()];
    req.return_total = true;
    req.limit = Some(10);
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    let total = compiled.total_query.unwrap();
    assert_eq!(
        total.sql,
        "SELECT SUM(tx.`totaldue`) AS `totaldue`, COUNT(*) AS total FROM \
         (SELECT t0.id AS `id`, t0.totaldue AS `totaldue` FROM t_orders t0) tx"
    );
    // The page query still paginates.
    assert!(compiled.query.sql.ends_with("LIMIT 10"));
}

#[test]
fn test_grouped_totals_sum_per_group_counts() {
    let mut req = request();
    req.columns = vec!["orderCount".into()];
    req.group_by = vec![GroupByItem {
        field: "status".into(),
        date_granularity: None,
        ..GroupByItem::default()
    }];
    req.return_total = true;
    let compiled = engine().compile(&common::sales(), &req).unwrap();
    let total = compiled.total_query.unwrap();
    assert!(total.sql.starts_with("SELECT SUM(tx.`orderCount`) AS `orderCount`, COUNT(*) AS total FROM ("));
}

#[test]
fn test_unknown_column_fails_compilation() {
    let mut req = request();
    req.columns = vec!["nonsense".into()];
    assert!(matches!(
        engine().compile(&common::sales(), &req).unwrap_err(),
        QueryError::UnknownField(_)
    ));
}

#[test]
fn test_execute_maps_rows_and_totals() {
    let mut req = request();
    req.columns = vec!["id".into(), "totaldue".into()];
    req.return_total = true;
    let executor = common::RecordingSql::new(vec![
        vec![
            common::row(json!({"id": 1, "totaldue": 10.0})),
            common::row(json!({"id": 2, "totaldue": 5.5})),
        ],
        vec![common::row(json!({"totaldue": 15.5, "total": 2}))],
    ]);
    let output = engine()
        .execute(&common::sales(), &req, &executor)
        .unwrap();
    assert_eq!(output.items.len(), 2);
    assert_eq!(output.items[0]["id"], json!(1));
    assert_eq!(output.total, 2);
    assert_eq!(output.totals, Some(json!({"totaldue": 15.5})));
    assert_eq!(executor.calls.borrow().len(), 2);
}

#[test]
fn test_execute_with_empty_totals_result_reports_zero() {
    let mut req = request();
    req.columns = vec!["id".into()];
    req.return_total = true;
    let executor = common::RecordingSql::new(vec![vec![common::row(json!({"id": 1}))]]);
    let output = engine()
        .execute(&common::sales(), &req, &executor)
        .unwrap();
    assert_eq!(output.items.len(), 1);
    assert_eq!(output.total, 0);
    assert!(output.totals.is_none());
}

#[test]
fn test_execute_without_totals_runs_one_statement() {
    let mut req = request();
    req.columns = vec!["id".into()];
    let executor = common::RecordingSql::new(vec![vec![common::row(json!({"id": 1}))]]);
    let output = engine()
        .execute(&common::sales(), &req, &executor)
        .unwrap();
    assert_eq!(output.total, -1);
    assert!(output.totals.is_none());
    assert_eq!(executor.calls.borrow().len(), 1);
}
