//! Whole-program dataflow analysis engine: a generic fixed-point
//! solver framework with constant propagation, live variables, a CHA
//! call graph and interprocedural constant propagation built on top of
//! it, plus a dead-code detection client.

pub mod callgraph;
pub mod constprop;
pub mod controlflow;
pub mod dataflow;
pub mod deadcode;
pub mod errors;
pub mod hierarchy;
pub mod icfg;
pub mod inter_constprop;
pub mod ir;
pub mod liveness;
pub mod program;

use crate::callgraph::CallGraph;
use crate::constprop::{ConstantPropagation, CpFact};
use crate::controlflow::Cfg;
use crate::dataflow::{solve_inter, solve_worklist, DataflowResult};
use crate::deadcode::DeadCode;
use crate::errors::AnalysisResult;
use crate::hierarchy::Hierarchy;
use crate::icfg::{Icfg, IcfgNode};
use crate::inter_constprop::InterConstantPropagation;
use crate::ir::{Body, StmtId};
use crate::liveness::{LiveFact, LiveVariables};
use crate::program::{MethodId, Program};
use std::collections::BTreeMap;

pub fn run_constant_propagation(
    body: &Body,
    cfg: &Cfg,
) -> AnalysisResult<DataflowResult<StmtId, CpFact>> {
    solve_worklist(&ConstantPropagation::new(body), body, cfg)
}

pub fn run_live_variables(
    body: &Body,
    cfg: &Cfg,
) -> AnalysisResult<DataflowResult<StmtId, LiveFact>> {
    solve_worklist(&LiveVariables::new(body), body, cfg)
}

/// Solves both supporting analyses, then runs the detection.
pub fn run_dead_code(body: &Body, cfg: &Cfg) -> AnalysisResult<DeadCode> {
    let constants = run_constant_propagation(body, cfg)?;
    let liveness = run_live_variables(body, cfg)?;
    deadcode::find_dead_code(body, cfg, &constants, &liveness)
}

/// Builds the call graph and ICFG from `entry`, then solves
/// interprocedural constant propagation over them.
pub fn run_inter_constant_propagation(
    program: &Program,
    entry: MethodId,
    cfgs: &BTreeMap<MethodId, Cfg>,
) -> AnalysisResult<DataflowResult<IcfgNode, CpFact>> {
    let hierarchy = Hierarchy::build(program);
    let call_graph = CallGraph::build(&hierarchy, entry)?;
    let icfg = Icfg::build(program, &call_graph, cfgs)?;
    solve_inter(&InterConstantPropagation::new(program), &icfg)
}
