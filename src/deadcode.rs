//! Dead-code detection.
//!
//! A client of the constant-propagation and liveness results for one
//! method. Reachability is explored from the entry with a worklist,
//! pruning branch successors the constants prove untaken; reachable
//! assignments whose result is not live and whose right-hand side has
//! no side effect are flagged separately.

use crate::constprop::{evaluate, CpFact, Value};
use crate::controlflow::{Cfg, Edge};
use crate::dataflow::DataflowResult;
use crate::errors::AnalysisResult;
use crate::ir::{ArithOp, BinaryOp, Body, Exp, Stmt, StmtId};
use crate::liveness::LiveFact;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

/// Dead statements of one method, sorted in program order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeadCode {
    /// Statements with no feasible path from the entry.
    pub unreachable: BTreeSet<StmtId>,
    /// Reachable assignments with no observable effect.
    pub dead_assignments: BTreeSet<StmtId>,
}

impl DeadCode {
    /// Union of both kinds, the overall report.
    #[must_use]
    pub fn all(&self) -> BTreeSet<StmtId> {
        self.unreachable
            .union(&self.dead_assignments)
            .copied()
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unreachable.is_empty() && self.dead_assignments.is_empty()
    }
}

/// Runs the detection over already-solved analysis results.
///
/// # Errors
///
/// Fails if `cfg` is inconsistent with `body`.
pub fn find_dead_code(
    body: &Body,
    cfg: &Cfg,
    constants: &DataflowResult<StmtId, CpFact>,
    liveness: &DataflowResult<StmtId, LiveFact>,
) -> AnalysisResult<DeadCode> {
    cfg.validate(body)?;

    let mut report = DeadCode::default();
    let mut visited: BTreeSet<StmtId> = BTreeSet::new();
    let mut queue: VecDeque<StmtId> = VecDeque::from([cfg.entry()]);

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        match body.stmt(node) {
            Stmt::If { cond } => {
                let value = constants
                    .in_fact(node)
                    .map_or(Value::Nac, |fact| evaluate(cond, fact, body));
                if let Value::Const(n) = value {
                    let taken = if branch_taken(n) {
                        Edge::IfTrue
                    } else {
                        Edge::IfFalse
                    };
                    for (edge, succ) in cfg.out_edges_of(node) {
                        if edge == taken {
                            queue.push_back(succ);
                        }
                    }
                } else {
                    queue.extend(cfg.succs_of(node));
                }
            }
            Stmt::Switch { var } => {
                let value = constants
                    .in_fact(node)
                    .map_or(Value::Nac, |fact| fact.get(*var));
                if let Value::Const(n) = value {
                    enqueue_switch_targets(body, cfg, node, n, &mut queue);
                } else {
                    queue.extend(cfg.succs_of(node));
                }
            }
            Stmt::Assign { lhs, rhs } => {
                let live_after = liveness
                    .out_fact(node)
                    .is_some_and(|live| live.contains(lhs));
                if !live_after && has_no_side_effect(rhs) {
                    report.dead_assignments.insert(node);
                }
                queue.extend(cfg.succs_of(node));
            }
            _ => queue.extend(cfg.succs_of(node)),
        }
    }

    for node in cfg.iter_nodes() {
        if !visited.contains(&node) && !cfg.is_exit(node) {
            report.unreachable.insert(node);
        }
    }
    log::debug!(
        "dead code: {} unreachable, {} dead assignments",
        report.unreachable.len(),
        report.dead_assignments.len()
    );
    Ok(report)
}

/// Conditions only evaluate to 0 or 1, but hand-built facts may carry
/// any constant; branch-on-nonzero keeps those consistent with the
/// comparison results.
const fn branch_taken(cond: i32) -> bool {
    cond != 0
}

/// First matching case wins; a matched case statement that can fall
/// through drags in the subsequent case targets, in declaration order,
/// up to and including the first one that cannot. An unmatched selector
/// reaches only the default target.
fn enqueue_switch_targets(
    body: &Body,
    cfg: &Cfg,
    node: StmtId,
    selector: i32,
    queue: &mut VecDeque<StmtId>,
) {
    let out_edges = cfg.out_edges_of(node);
    let case_targets: Vec<(i32, StmtId)> = out_edges
        .iter()
        .filter_map(|(edge, succ)| match edge {
            Edge::SwitchCase(v) => Some((*v, *succ)),
            _ => None,
        })
        .collect();

    if let Some(matched) = case_targets.iter().position(|&(v, _)| v == selector) {
        for &(_, target) in &case_targets[matched..] {
            queue.push_back(target);
            if !body.stmt(target).can_fall_through() {
                break;
            }
        }
    } else {
        for (edge, succ) in out_edges {
            if edge == Edge::SwitchDefault {
                queue.push_back(succ);
            }
        }
    }
}

/// Allocation, casts, memory reads and possibly-trapping arithmetic
/// keep an otherwise dead assignment alive.
fn has_no_side_effect(exp: &Exp) -> bool {
    match exp {
        Exp::New(_) | Exp::Cast(_) | Exp::FieldAccess(_) | Exp::ArrayAccess(_) => false,
        Exp::Binary { op, .. } => !matches!(
            op,
            BinaryOp::Arith(ArithOp::Div) | BinaryOp::Arith(ArithOp::Rem)
        ),
        Exp::IntLiteral(_) | Exp::Var(_) => true,
    }
}
