//! Worklist solving strategy: change-driven re-computation.

use crate::controlflow::Cfg;
use crate::dataflow::{init_result, update_node, DataflowAnalysis, DataflowResult, Worklist};
use crate::errors::AnalysisResult;
use crate::ir::{Body, StmtId};

/// Solves `analysis` over `cfg` with a de-duplicated FIFO seeded with
/// all nodes in program order; a node whose output changed re-enqueues
/// its downstream neighbors (successors forward, predecessors
/// backward). Produces the same result as
/// [`solve_iterative`](crate::dataflow::solve_iterative) with fewer
/// transfer applications.
///
/// # Errors
///
/// Fails if `cfg` violates the graph preconditions (see
/// [`Cfg::validate`]).
pub fn solve_worklist<A: DataflowAnalysis>(
    analysis: &A,
    body: &Body,
    cfg: &Cfg,
) -> AnalysisResult<DataflowResult<StmtId, A::Fact>> {
    cfg.validate(body)?;
    let mut result = init_result(analysis, cfg);

    let mut worklist = Worklist::new(cfg.inner.node_count());
    for stmt in cfg.iter_nodes() {
        worklist.push(cfg.node_ids[&stmt]);
    }

    while let Some(id) = worklist.pop() {
        let stmt = cfg.inner[id];
        log::debug!("---- node {stmt}");
        if update_node(analysis, cfg, &mut result, stmt) {
            let downstream = if analysis.is_forward() {
                cfg.succs_of(stmt)
            } else {
                cfg.preds_of(stmt)
            };
            for n in downstream {
                worklist.push(cfg.node_ids[&n]);
            }
        }
    }
    Ok(result)
}
