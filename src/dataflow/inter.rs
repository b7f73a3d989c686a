//! Worklist solver over the interprocedural control-flow graph.
//!
//! Unlike the intraprocedural solvers, facts do not flow along edges
//! unchanged: each edge kind applies its own transfer before meeting
//! into the target input. The solver is forward only.

use super::{DataflowResult, Worklist};
use crate::errors::AnalysisResult;
use crate::icfg::{Icfg, IcfgEdge, IcfgNode};
use crate::program::MethodId;
use std::fmt;

/// The contract an interprocedural analysis implements.
///
/// Same lattice laws as [`super::DataflowAnalysis`]; in addition the
/// edge transfers must be monotone in the fact argument.
pub trait InterDataflowAnalysis {
    type Fact: Clone + PartialEq + fmt::Debug;

    /// Fact seeding the entry point of the entry method.
    fn new_boundary_fact(&self, method: MethodId) -> Self::Fact;

    fn new_initial_fact(&self) -> Self::Fact;

    fn meet_into(&self, fact: &Self::Fact, target: &mut Self::Fact);

    /// Whether the node is an invoke statement. Call nodes do not apply
    /// the statement's effect locally; their result variable is bound by
    /// the return edge transfer instead.
    fn is_call_node(&self, node: IcfgNode) -> bool;

    /// Transfer for invoke statements; returns true iff `output`
    /// changed.
    fn transfer_call_node(&self, node: IcfgNode, input: &Self::Fact, output: &mut Self::Fact)
        -> bool;

    /// Transfer for every other statement; returns true iff `output`
    /// changed.
    fn transfer_non_call_node(
        &self,
        node: IcfgNode,
        input: &Self::Fact,
        output: &mut Self::Fact,
    ) -> bool;

    /// Applies the edge's effect to the fact flowing out of `source`.
    fn transfer_edge(&self, edge: &IcfgEdge, source: IcfgNode, fact: &Self::Fact) -> Self::Fact;
}

/// Runs `analysis` to its fixed point over `icfg`.
///
/// # Errors
///
/// None at present; the signature matches the intraprocedural solvers
/// so callers handle all strategies uniformly.
pub fn solve_inter<A: InterDataflowAnalysis>(
    analysis: &A,
    icfg: &Icfg,
) -> AnalysisResult<DataflowResult<IcfgNode, A::Fact>> {
    let mut result = DataflowResult::new();
    for node in icfg.iter_nodes() {
        result.in_facts.insert(node, analysis.new_initial_fact());
        result.out_facts.insert(node, analysis.new_initial_fact());
    }
    let boundary = icfg.entry_node();
    result
        .in_facts
        .insert(boundary, analysis.new_boundary_fact(icfg.entry_method()));

    let mut worklist = Worklist::new(icfg.nb_nodes());
    for node in icfg.iter_nodes() {
        if let Some(id) = icfg.index_of(node) {
            worklist.push(id);
        }
    }

    let mut nb_steps = 0usize;
    while let Some(id) = worklist.pop() {
        nb_steps += 1;
        let node = icfg.node_at(id);

        // Accumulating into the stored input keeps the boundary seed:
        // the entry node has no incoming edges to overwrite it.
        let mut input = result.in_facts[&node].clone();
        for (src, edge) in icfg.in_edges_of(node) {
            let transferred = analysis.transfer_edge(edge, src, &result.out_facts[&src]);
            analysis.meet_into(&transferred, &mut input);
        }

        let mut output = result.out_facts[&node].clone();
        let changed = if analysis.is_call_node(node) {
            analysis.transfer_call_node(node, &input, &mut output)
        } else {
            analysis.transfer_non_call_node(node, &input, &mut output)
        };
        log::trace!("    {node}: input {input:?} -> output {output:?} (changed: {changed})");
        result.in_facts.insert(node, input);
        result.out_facts.insert(node, output);

        if changed {
            for succ in icfg.succs_of(node) {
                if let Some(succ_id) = icfg.index_of(succ) {
                    worklist.push(succ_id);
                }
            }
        }
    }
    log::debug!("interprocedural fixed point after {nb_steps} steps");
    Ok(result)
}
