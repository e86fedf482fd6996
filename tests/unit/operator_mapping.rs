//! Filter operators map onto their ClickHouse spellings in emitted SQL.

use screenhouse::compiler::{compile, CompileOptions};
use screenhouse::config::default_config;
use screenhouse::screener_query::UserQuery;
use serde_json::json;
use test_case::test_case;

#[test_case("eq", "close = 10" ; "eq maps to equals")]
#[test_case("neq", "close != 10" ; "neq maps to not equals")]
#[test_case("gt", "close > 10" ; "gt maps to greater")]
#[test_case("gte", "close >= 10" ; "gte maps to greater or equal")]
#[test_case("lt", "close < 10" ; "lt maps to less")]
#[test_case("lte", "close <= 10" ; "lte maps to less or equal")]
fn comparison_operator_spelling(op: &str, expected: &str) {
    let query: UserQuery = serde_json::from_value(json!({
        "id": "q", "name": "n", "status": "active",
        "filter": {"target": {"metric": "close"}, "op": op, "value": 10}
    }))
    .unwrap();
    let result = compile(&query, default_config(), CompileOptions::default()).unwrap();
    assert!(
        result.sql.query.contains(expected),
        "missing {:?} in:\n{}",
        expected,
        result.sql.query
    );
}

#[test_case("in", "ticker IN {param_1: Array(String)}" ; "in maps to IN")]
#[test_case("nin", "ticker NOT IN {param_1: Array(String)}" ; "nin maps to NOT IN")]
fn membership_operator_spelling(op: &str, expected: &str) {
    let query: UserQuery = serde_json::from_value(json!({
        "id": "q", "name": "n", "status": "active",
        "filter": {"target": {"metric": "ticker"}, "op": op, "value": ["AAPL", "MSFT"]}
    }))
    .unwrap();
    let result = compile(&query, default_config(), CompileOptions::default()).unwrap();
    assert!(
        result.sql.query.contains(expected),
        "missing {:?} in:\n{}",
        expected,
        result.sql.query
    );
}

#[test_case("contains", "name LIKE {param_1: String}" ; "contains maps to LIKE")]
#[test_case("ncontains", "name NOT LIKE {param_1: String}" ; "ncontains maps to NOT LIKE")]
fn like_operator_spelling(op: &str, expected: &str) {
    let query: UserQuery = serde_json::from_value(json!({
        "id": "q", "name": "n", "status": "active",
        "filter": {"target": {"metric": "name"}, "op": op, "value": "Corp"}
    }))
    .unwrap();
    let result = compile(&query, default_config(), CompileOptions::default()).unwrap();
    assert!(
        result.sql.query.contains(expected),
        "missing {:?} in:\n{}",
        expected,
        result.sql.query
    );
}
