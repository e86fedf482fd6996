//! Semantics-preserving graph rewrites.
//!
//! `optimize` runs the pass sequence exactly once (each pass may iterate
//! internally): duplicate-projection removal, parameter inlining, filter
//! merging, degenerate-composite removal, duplicate-expression removal,
//! then the risky simplifications when requested. The required-columns
//! pass runs again at the end so removals never strand a windowed
//! aggregate without its time column.

use crate::compute_graph::ComputeGraph;
use crate::config::ScreenerConfig;
use crate::ir_builder::add_required_columns;

pub mod errors;
pub mod graph_pass;

mod cross_table_prune;
mod dedup_expressions;
mod dedup_filters;
mod dedup_projections;
mod inline_parameters;
mod merge_filters;
mod simplify_composites;

pub use errors::OptimizerError;
pub use graph_pass::{GraphPass, OptimizerResult};

use cross_table_prune::CrossTablePrune;
use dedup_expressions::DedupExpressions;
use dedup_filters::DedupFilters;
use dedup_projections::DedupProjections;
use inline_parameters::InlineParameters;
use merge_filters::MergeFilters;
use simplify_composites::SimplifyComposites;

pub fn optimize(
    graph: &mut ComputeGraph,
    config: &ScreenerConfig,
    risky: bool,
) -> OptimizerResult<()> {
    let mut passes: Vec<Box<dyn GraphPass + '_>> = vec![
        Box::new(DedupProjections),
        Box::new(InlineParameters),
        Box::new(MergeFilters),
        Box::new(SimplifyComposites),
        Box::new(DedupExpressions),
    ];
    if risky {
        passes.push(Box::new(CrossTablePrune { config }));
        passes.push(Box::new(DedupFilters));
    }

    for pass in passes {
        let before = graph.len();
        let changed = pass.apply(graph)?;
        if changed {
            log::debug!(
                "Optimizer pass {}: {} -> {} nodes",
                pass.name(),
                before,
                graph.len()
            );
        }
    }

    add_required_columns(graph, config);
    Ok(())
}
