//! Naive iterative solving strategy: whole-graph passes until a full
//! pass changes nothing.

use crate::controlflow::Cfg;
use crate::dataflow::{init_result, update_node, DataflowAnalysis, DataflowResult};
use crate::errors::AnalysisResult;
use crate::ir::{Body, StmtId};

/// Solves `analysis` over `cfg` by re-deriving every node on every
/// pass. Deterministic regardless of visitation order; forward passes
/// run in program order, backward passes in reverse program order.
///
/// # Errors
///
/// Fails if `cfg` violates the graph preconditions (see
/// [`Cfg::validate`]).
pub fn solve_iterative<A: DataflowAnalysis>(
    analysis: &A,
    body: &Body,
    cfg: &Cfg,
) -> AnalysisResult<DataflowResult<StmtId, A::Fact>> {
    cfg.validate(body)?;
    let mut result = init_result(analysis, cfg);
    let nodes: Vec<StmtId> = cfg.iter_nodes().collect();

    let mut pass = 0usize;
    loop {
        pass += 1;
        log::debug!("---- iterative pass {pass}");
        let mut changed = false;
        if analysis.is_forward() {
            for &stmt in &nodes {
                changed |= update_node(analysis, cfg, &mut result, stmt);
            }
        } else {
            for &stmt in nodes.iter().rev() {
                changed |= update_node(analysis, cfg, &mut result, stmt);
            }
        }
        if !changed {
            break;
        }
    }
    log::debug!("fixed point reached after {pass} passes");
    Ok(result)
}
