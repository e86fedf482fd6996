//! ClickHouse SQL generation from the optimized compute graph.
//!
//! The planner partitions the graph into CTE groups plus a main scope
//! ([`cte_planner`]); each scope is emitted with the fixed clause order
//! SELECT / FROM / PREWHERE / WHERE / QUALIFY / GROUP BY / ORDER BY /
//! LIMIT. Fragments are collected into lists and joined once at the end —
//! WHERE vs QUALIFY placement is decided before any text is assembled.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::compute_graph::{ComputeGraph, NodeId};
use crate::config::ScreenerConfig;
use crate::ir_builder::ParameterTable;

pub mod cte_planner;
pub mod errors;
mod expression_sql;
mod filter_sql;
mod scope;
pub mod time_window;

pub use errors::SqlError;

/// Final SQL artifact: the statement text with `{param_n: Type}`
/// placeholders and the parameter values in insertion order.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SqlQuery {
    pub query: String,
    pub parameters: IndexMap<String, Value>,
}

pub fn generate_sql(
    graph: &ComputeGraph,
    params: ParameterTable,
    config: &ScreenerConfig,
) -> Result<SqlQuery, SqlError> {
    let generator = SqlGenerator {
        graph,
        config,
        params,
        node_outputs: HashMap::new(),
    };
    generator.generate()
}

/// One emitted CTE: its name, body text, and the column names it exposes.
pub(crate) struct EmittedCte {
    pub name: String,
    pub body: String,
    pub exposed: Vec<String>,
}

/// A scope to emit: member nodes, CTE groups it reads from, and whether
/// this is the outermost SELECT.
pub(crate) struct ScopeSpec {
    pub nodes: Vec<NodeId>,
    pub deps: Vec<usize>,
    pub is_main: bool,
}

pub(crate) struct SqlGenerator<'a> {
    pub graph: &'a ComputeGraph,
    pub config: &'a ScreenerConfig,
    pub params: ParameterTable,
    /// node id → name it answers to in emitted SQL (projection output or
    /// expression alias), filled in as scopes are emitted.
    pub node_outputs: HashMap<NodeId, String>,
}

impl SqlGenerator<'_> {
    fn generate(mut self) -> Result<SqlQuery, SqlError> {
        let plan = cte_planner::plan(self.graph)?;

        let mut ctes: Vec<EmittedCte> = Vec::new();
        for (index, group) in plan.groups.iter().enumerate() {
            let spec = ScopeSpec {
                nodes: group.nodes.clone(),
                deps: group.depends_on.clone(),
                is_main: false,
            };
            let (body, exposed) = self.emit_scope(&spec, &ctes)?;
            ctes.push(EmittedCte {
                name: format!("cte_{}", index),
                body,
                exposed,
            });
        }

        let main_spec = ScopeSpec {
            nodes: plan.main_nodes.clone(),
            deps: plan.root_groups(),
            is_main: true,
        };
        let (main_sql, _) = self.emit_scope(&main_spec, &ctes)?;

        let query = if ctes.is_empty() {
            main_sql
        } else {
            let with_list = ctes
                .iter()
                .map(|cte| format!("{} AS (\n{}\n)", cte.name, indent(&cte.body)))
                .collect::<Vec<_>>()
                .join(",\n");
            format!("WITH {}\n{}", with_list, main_sql)
        };

        log::debug!(
            "Generated SQL: {} CTEs, {} parameters",
            ctes.len(),
            self.params.len()
        );
        Ok(SqlQuery {
            query,
            parameters: self.params.into_values(),
        })
    }
}

fn indent(body: &str) -> String {
    body.lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
