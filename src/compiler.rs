//! End-to-end compile pipeline.
//!
//! `UserQuery → IR builder → join inference → optimizer → SQL + diagram`,
//! with per-stage timings logged the same way on every call. All state
//! (graph, parameter table, id counters) lives inside the call and is
//! dropped on return; only the read-only config is shared.

use std::time::Instant;

use thiserror::Error;

use crate::config::ScreenerConfig;
use crate::diagram::render_diagram;
use crate::ir_builder::{BuildError, IrBuilder};
use crate::optimizer::{optimize, OptimizerError};
use crate::screener_query::UserQuery;
use crate::sql_generator::{generate_sql, SqlError, SqlQuery};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error(transparent)]
    Sql(#[from] SqlError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Enable the risky optimizer passes (join pruning, duplicate-filter
    /// collapse).
    pub risky_optimizations: bool,
}

#[derive(Debug, Clone)]
pub struct CompileResult {
    pub sql: SqlQuery,
    pub diagram: String,
    pub timings: CompileTimings,
}

/// Per-stage wall-clock timings, in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileTimings {
    pub lower_time: f64,
    pub optimize_time: f64,
    pub render_time: f64,
    pub sql_time: f64,
    pub total_time: f64,
}

impl CompileTimings {
    pub fn log_performance(&self, query_id: &str) {
        log::info!(
            "Compile performance [{}] - Total: {:.3}ms, Lower: {:.3}ms, Optimize: {:.3}ms, Diagram: {:.3}ms, SQL: {:.3}ms",
            query_id,
            self.total_time * 1000.0,
            self.lower_time * 1000.0,
            self.optimize_time * 1000.0,
            self.render_time * 1000.0,
            self.sql_time * 1000.0,
        );
    }
}

pub fn compile(
    query: &UserQuery,
    config: &ScreenerConfig,
    options: CompileOptions,
) -> Result<CompileResult, CompileError> {
    let started = Instant::now();
    let mut timings = CompileTimings::default();

    let stage = Instant::now();
    let lowered = IrBuilder::new(config).build(query)?;
    timings.lower_time = stage.elapsed().as_secs_f64();

    let mut graph = lowered.graph;
    let stage = Instant::now();
    optimize(&mut graph, config, options.risky_optimizations)?;
    timings.optimize_time = stage.elapsed().as_secs_f64();

    let stage = Instant::now();
    let diagram = render_diagram(&graph);
    timings.render_time = stage.elapsed().as_secs_f64();

    let stage = Instant::now();
    let sql = generate_sql(&graph, lowered.params, config)?;
    timings.sql_time = stage.elapsed().as_secs_f64();

    timings.total_time = started.elapsed().as_secs_f64();
    timings.log_performance(&query.id);

    Ok(CompileResult {
        sql,
        diagram,
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;

    #[test]
    fn test_compile_is_deterministic() {
        let query: UserQuery = serde_json::from_str(
            r#"{
                "id": "q", "name": "n", "status": "active",
                "filter": {"operator": "and", "filters": [
                    {"target": {"metric": "sector"}, "op": "eq", "value": "Technology"},
                    {"target": {"metric": "close"}, "op": "gt", "value": 100}
                ]},
                "limit": 10
            }"#,
        )
        .unwrap();
        let first = compile(&query, default_config(), CompileOptions::default()).unwrap();
        let second = compile(&query, default_config(), CompileOptions::default()).unwrap();
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.diagram, second.diagram);
    }
}
