//! Parameter-table behavior observed end to end.

use screenhouse::compiler::{compile, CompileOptions};
use screenhouse::config::default_config;
use screenhouse::screener_query::UserQuery;
use serde_json::json;

fn compile_json(query_json: serde_json::Value) -> screenhouse::compiler::CompileResult {
    let query: UserQuery = serde_json::from_value(query_json).unwrap();
    compile(&query, default_config(), CompileOptions::default()).unwrap()
}

#[test]
fn strings_and_arrays_become_parameters_in_encounter_order() {
    let result = compile_json(json!({
        "id": "q", "name": "n", "status": "active",
        "filter": {"operator": "and", "filters": [
            {"target": {"metric": "sector"}, "op": "eq", "value": "Technology"},
            {"target": {"metric": "ticker"}, "op": "in", "value": ["AAPL", "MSFT"]},
            {"target": {"metric": "close"}, "op": "gt", "value": 250}
        ]}
    }));

    let names: Vec<&String> = result.sql.parameters.keys().collect();
    assert_eq!(names, vec!["param_1", "param_2"]);
    assert_eq!(result.sql.parameters["param_1"], json!("Technology"));
    assert_eq!(result.sql.parameters["param_2"], json!(["AAPL", "MSFT"]));

    // Numbers inline; no third parameter.
    assert!(result.sql.query.contains("close > 250"));
    assert!(result.sql.query.contains("{param_1: String}"));
    assert!(result.sql.query.contains("{param_2: Array(String)}"));
}

#[test]
fn contains_wraps_value_for_like() {
    let result = compile_json(json!({
        "id": "q", "name": "n", "status": "active",
        "filter": {"target": {"metric": "name"}, "op": "contains", "value": "Corp"}
    }));
    assert_eq!(result.sql.parameters["param_1"], json!("%Corp%"));
    assert!(result.sql.query.contains("LIKE {param_1: String}"));
}

#[test]
fn booleans_inline_as_integers() {
    let result = compile_json(json!({
        "id": "q", "name": "n", "status": "active",
        "filter": {"target": {"metric": "active"}, "op": "eq", "value": true}
    }));
    assert!(result.sql.parameters.is_empty());
    assert!(result.sql.query.contains("active = 1"));
}
