//! Formula compilation and rendering across both backends.

use facet::error::{QueryError, Result};
use facet::expr::{compile, has_aggregate};
use facet::model::ColumnType;
use facet::mongo::{MongoExpContext, MongoFragment, MongoResolver};
use facet::sql::{SqlExpContext, SqlResolver};
use serde_json::json;

struct Sql;

impl SqlResolver for Sql {
    fn resolve(&self, name: &str) -> Result<String> {
        Ok(format!("t0.{name}"))
    }
}

struct Mongo;

impl MongoResolver for Mongo {
    fn resolve(&self, name: &str) -> Result<MongoFragment> {
        Ok(MongoFragment::field(name, Some(ColumnType::Number)))
    }
}

fn sql(text: &str) -> Result<String> {
    SqlExpContext::new(&Sql).render(&compile(text)?)
}

fn mongo(text: &str) -> Result<MongoFragment> {
    MongoExpContext::new(&Mongo).render(&compile(text)?)
}

#[test]
fn test_same_formula_renders_on_both_backends() {
    let text = "ROUND((loadingValue + unloadingValue) / 2, 1)";
    assert_eq!(
        sql(text).unwrap(),
        "ROUND((t0.loadingValue + t0.unloadingValue) / 2, 1)"
    );
    assert_eq!(
        mongo(text).unwrap().value,
        json!({"$round": [
            {"$divide": [{"$add": ["$loadingValue", "$unloadingValue"]}, 2]},
            1
        ]})
    );
}

#[test]
fn test_operator_precedence_survives_compilation() {
    assert_eq!(sql("a + b * c").unwrap(), "t0.a + t0.b * t0.c");
    assert_eq!(
        mongo("a + b * c").unwrap().value,
        json!({"$add": ["$a", {"$multiply": ["$b", "$c"]}]})
    );
}

#[test]
fn test_case_renders_as_switch() {
    let fragment = mongo("CASE WHEN a > 1 THEN 'hi' ELSE 'lo' END").unwrap();
    assert_eq!(
        fragment.value,
        json!({"$switch": {
            "branches": [{"case": {"$gt": ["$a", 1]}, "then": "hi"}],
            "default": "lo"
        }})
    );
}

#[test]
fn test_operand_case_compares_each_value() {
    let fragment = mongo("CASE a WHEN 1 THEN 'one' END").unwrap();
    assert_eq!(
        fragment.value,
        json!({"$switch": {
            "branches": [{"case": {"$eq": ["$a", 1]}, "then": "one"}],
            "default": null
        }})
    );
}

#[test]
fn test_aggregate_detection() {
    assert!(has_aggregate(&compile("SUM(a) / COUNT(*)").unwrap()));
    assert!(!has_aggregate(&compile("ROUND(a / b, 2)").unwrap()));
}

#[test]
fn test_sql_allow_list_is_broader_than_mongo() {
    // DATE_FORMAT exists in SQL but has no faithful pipeline counterpart.
    assert!(sql("DATE_FORMAT(d, '%Y')").is_ok());
    assert!(matches!(
        mongo("DATE_FORMAT(d, '%Y')").unwrap_err(),
        QueryError::UnsupportedFunction { backend: "mongo", .. }
    ));
}

#[test]
fn test_disallowed_function_fails_on_both_backends() {
    assert!(matches!(
        sql("LOAD_FILE('/etc/passwd')").unwrap_err(),
        QueryError::UnsupportedFunction { backend: "sql", .. }
    ));
    assert!(mongo("LOAD_FILE('/etc/passwd')").is_err());
}

#[test]
fn test_syntax_error_carries_position() {
    let err = compile("CONCAT(a, ").unwrap_err();
    let QueryError::Compile { line, column, .. } = err else {
        panic!("expected compile error");
    };
    assert_eq!(line, 1);
    assert!(column > 1);
}

#[test]
fn test_column_positions_account_for_wrapping() {
    // The error position points into the formula text, not the synthetic
    // statement it is parsed inside.
    let err = compile("1 +").unwrap_err();
    let QueryError::Compile { column, .. } = err else {
        panic!("expected compile error");
    };
    assert!(column <= 4);
}
