//! Optimizer pass trait.
//!
//! Every rewrite implements [`GraphPass`], mutating the graph in place and
//! reporting whether anything changed. Passes must be semantics-preserving
//! and idempotent: a second application of the full sequence leaves the
//! graph untouched.

use crate::compute_graph::ComputeGraph;

use super::errors::OptimizerError;

pub type OptimizerResult<T> = Result<T, OptimizerError>;

pub trait GraphPass {
    fn name(&self) -> &'static str;

    fn apply(&self, graph: &mut ComputeGraph) -> OptimizerResult<bool>;
}
