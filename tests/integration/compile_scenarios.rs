//! End-to-end compile scenarios: UserQuery JSON in, SQL shape out.

use screenhouse::compiler::{compile, CompileOptions};
use screenhouse::compute_graph::NodeKind;
use screenhouse::config::default_config;
use screenhouse::ir_builder::IrBuilder;
use screenhouse::optimizer::optimize;
use screenhouse::screener_query::{Expression, UserQuery};
use serde_json::json;

fn compile_value(
    query_json: serde_json::Value,
    risky: bool,
) -> screenhouse::compiler::CompileResult {
    let query: UserQuery = serde_json::from_value(query_json).unwrap();
    compile(
        &query,
        default_config(),
        CompileOptions {
            risky_optimizations: risky,
        },
    )
    .unwrap()
}

#[test]
fn sector_filter_with_limit() {
    let result = compile_value(
        json!({
            "id": "scr-1", "name": "tech", "status": "active",
            "filter": {"target": {"metric": "sector"}, "op": "eq", "value": "Technology"},
            "limit": 100
        }),
        false,
    );
    let sql = &result.sql.query;
    assert!(sql.contains("FROM tickers"), "sql was:\n{}", sql);
    assert!(sql.contains("sector = {param_1: String}"), "sql was:\n{}", sql);
    assert!(sql.contains("LIMIT 100"), "sql was:\n{}", sql);
    assert_eq!(result.sql.parameters["param_1"], json!("Technology"));
}

#[test]
fn thirty_day_return_screen() {
    let result = compile_value(
        json!({
            "id": "scr-2", "name": "momentum", "status": "active",
            "filter": {
                "target": {"target": {"metric": "close"}, "aggregation": "diff_pct",
                           "time_range": {"type": "relative", "duration": 30, "unit": "day"},
                           "alias": "return_30d"},
                "op": "gt", "value": 10
            },
            "sort_by": [{"target": {"target": {"metric": "close"}, "aggregation": "diff_pct",
                                     "time_range": {"type": "relative", "duration": 30, "unit": "day"},
                                     "alias": "return_30d"}, "direction": "desc"}],
            "limit": 50
        }),
        false,
    );
    let sql = &result.sql.query;
    for expected in [
        "WITH",
        "last_value",
        "first_value",
        "nullIf(",
        "QUALIFY",
        "ORDER BY return_30d desc",
        "LIMIT 50",
    ] {
        assert!(sql.contains(expected), "missing {:?} in:\n{}", expected, sql);
    }

    // Exactly one aggregate expression node survives optimization.
    let query: UserQuery = serde_json::from_value(json!({
        "id": "scr-2", "name": "momentum", "status": "active",
        "filter": {
            "target": {"target": {"metric": "close"}, "aggregation": "diff_pct",
                       "time_range": {"type": "relative", "duration": 30, "unit": "day"},
                       "alias": "return_30d"},
            "op": "gt", "value": 10
        },
        "sort_by": [{"target": {"target": {"metric": "close"}, "aggregation": "diff_pct",
                                 "time_range": {"type": "relative", "duration": 30, "unit": "day"},
                                 "alias": "return_30d"}, "direction": "desc"}]
    }))
    .unwrap();
    let mut lowered = IrBuilder::new(default_config()).build(&query).unwrap();
    optimize(&mut lowered.graph, default_config(), false).unwrap();
    let aggregates = lowered
        .graph
        .nodes()
        .filter(|n| matches!(&n.kind, NodeKind::Expression(e)
            if matches!(e.expression, Expression::Aggregate(_))))
        .count();
    assert_eq!(aggregates, 1);
}

fn top_n_query() -> serde_json::Value {
    json!({
        "id": "scr-3", "name": "top3", "status": "active",
        "filter": {"operator": "and", "filters": [
            {"target": {"metric": "country"}, "op": "eq", "value": "United States"},
            {"target": {"metric": "active"}, "op": "eq", "value": true}
        ]},
        "group_by": [{"dimension": "sector", "limit": 3,
                      "expression": {"target": {"metric": "close"}, "aggregation": "diff_pct",
                                     "time_range": {"type": "relative", "duration": 90, "unit": "day"},
                                     "alias": "change_90d"}}],
        "limit": 100
    })
}

#[test]
fn top_three_per_sector() {
    let result = compile_value(top_n_query(), false);
    let sql = &result.sql.query;
    for expected in ["LIMIT 3 BY sector", "GROUP BY sector", "LIMIT 100"] {
        assert!(sql.contains(expected), "missing {:?} in:\n{}", expected, sql);
    }
    // Both tables participate, joined on the shared primary key.
    assert!(sql.contains("tickers"), "sql was:\n{}", sql);
    assert!(sql.contains("daily_agg"), "sql was:\n{}", sql);
    assert!(
        sql.contains("tickers.ticker = daily_agg.ticker")
            || sql.contains("daily_agg.ticker = tickers.ticker"),
        "sql was:\n{}",
        sql
    );
}

#[test]
fn risky_prunes_ticker_only_join() {
    // No grouping dimension here: the only reason `tickers` participates
    // is the ticker filter, which daily_agg can answer by itself.
    let ticker_only = json!({
        "id": "scr-3b", "name": "watchlist", "status": "active",
        "filter": {"operator": "and", "filters": [
            {"target": {"metric": "ticker"}, "op": "in", "value": ["AAPL", "MSFT"]},
            {"target": {"metric": "close"}, "op": "gt", "value": 10}
        ]},
        "limit": 100
    });
    let query: UserQuery = serde_json::from_value(ticker_only.clone()).unwrap();

    let mut lowered = IrBuilder::new(default_config()).build(&query).unwrap();
    optimize(&mut lowered.graph, default_config(), true).unwrap();
    assert!(!lowered
        .graph
        .nodes()
        .any(|n| matches!(n.kind, NodeKind::Join(_))));
    assert!(!lowered
        .graph
        .nodes()
        .any(|n| matches!(&n.kind, NodeKind::Source(s) if s.table == "tickers")));

    let result = compile_value(ticker_only, true);
    assert!(!result.sql.query.contains("tickers"), "sql was:\n{}", result.sql.query);
}

#[test]
fn composite_over_same_aggregate_collapses() {
    let query: UserQuery = serde_json::from_value(json!({
        "id": "scr-4", "name": "band", "status": "active",
        "filter": {"operator": "and", "filters": [
            {"target": {"target": {"metric": "close"}, "aggregation": "avg",
                        "time_range": {"type": "relative", "duration": 30, "unit": "day"}},
             "op": "gt", "value": 100},
            {"target": {"target": {"metric": "close"}, "aggregation": "avg",
                        "time_range": {"type": "relative", "duration": 30, "unit": "day"}},
             "op": "lt", "value": 200}
        ]}
    }))
    .unwrap();
    let mut lowered = IrBuilder::new(default_config()).build(&query).unwrap();
    optimize(&mut lowered.graph, default_config(), false).unwrap();

    let aggregates = lowered
        .graph
        .nodes()
        .filter(|n| matches!(&n.kind, NodeKind::Expression(e)
            if matches!(e.expression, Expression::Aggregate(_))))
        .count();
    assert_eq!(aggregates, 1);
    assert!(lowered.graph.nodes().any(|n| n.kind.is_filterish()));
}

#[test]
fn absolute_range_gets_one_day_leeway() {
    // 2024-01-01 .. 2024-12-31 UTC
    let result = compile_value(
        json!({
            "id": "scr-5", "name": "fy24", "status": "active",
            "filter": {
                "target": {"target": {"metric": "close"}, "aggregation": "diff_pct",
                           "time_range": {"type": "absolute",
                                          "from": 1704067200, "to": 1735603200}},
                "op": "gt", "value": 0
            }
        }),
        false,
    );
    assert!(
        result
            .sql
            .query
            .contains("BETWEEN toDate('2023-12-31') AND toDate('2024-12-31')"),
        "sql was:\n{}",
        result.sql.query
    );
}

#[test]
fn math_over_metrics_inlines_numbers() {
    let result = compile_value(
        json!({
            "id": "scr-6", "name": "liquidity", "status": "active",
            "filter": {
                "target": {"operator": "divide",
                           "operands": [{"metric": "close"}, {"metric": "volume"}]},
                "op": "gt", "value": 0.001
            }
        }),
        false,
    );
    assert!(
        result.sql.query.contains("(close / volume)"),
        "sql was:\n{}",
        result.sql.query
    );
    assert!(result.sql.parameters.is_empty());
}

#[test]
fn trading_range_uses_row_frame() {
    let result = compile_value(
        json!({
            "id": "scr-7", "name": "trading", "status": "active",
            "filter": {
                "target": {"target": {"metric": "close"}, "aggregation": "avg",
                           "time_range": {"type": "trading", "duration": 20, "unit": "day"},
                           "alias": "avg_20t"},
                "op": "gt", "value": 50
            }
        }),
        false,
    );
    assert!(
        result
            .sql
            .query
            .contains("ROWS BETWEEN 19 PRECEDING AND CURRENT ROW"),
        "sql was:\n{}",
        result.sql.query
    );
}

#[test]
fn diagram_is_produced_alongside_sql() {
    let result = compile_value(
        json!({
            "id": "scr-8", "name": "diagram", "status": "active",
            "filter": {"target": {"metric": "sector"}, "op": "eq", "value": "Energy"}
        }),
        false,
    );
    assert!(result.diagram.starts_with("graph TD;"));
    assert!(result.diagram.contains("tickers[(tickers)]"));
}
