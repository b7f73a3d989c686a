//! Dataflow analysis framework.
//!
//! The engine is generic over the fact lattice: a concrete analysis
//! implements [`DataflowAnalysis`] and any solver strategy iterates its
//! transfer functions to a fixed point. The iterative and worklist
//! strategies are interchangeable and produce identical results; they
//! differ only in how many transfer applications reach the fixed point.

use crate::controlflow::Cfg;
use crate::ir::StmtId;
use fixedbitset::FixedBitSet;
use petgraph::graph::NodeIndex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

mod inter;
mod iterative;
mod worklist;

pub use inter::{solve_inter, InterDataflowAnalysis};
pub use iterative::solve_iterative;
pub use worklist::solve_worklist;

/// The contract a concrete analysis implements.
///
/// `meet` must be idempotent, commutative, associative and monotone,
/// and the transfer functions monotone; the engine does not check this,
/// a non-monotone instance makes the solvers loop forever.
pub trait DataflowAnalysis {
    type Fact: Clone + PartialEq + fmt::Debug;

    fn is_forward(&self) -> bool;

    /// Fact seeding the boundary node: the entry for a forward
    /// analysis, the exit for a backward one.
    fn new_boundary_fact(&self) -> Self::Fact;

    /// The lattice's "no information" element, seeding every other
    /// program point.
    fn new_initial_fact(&self) -> Self::Fact;

    /// Folds `fact` into `target` in place.
    fn meet_into(&self, fact: &Self::Fact, target: &mut Self::Fact);

    /// Applies the statement's effect to `input`, storing the result in
    /// `output`; returns true iff `output` changed. `input`/`output`
    /// are direction-relative (IN/OUT forward, OUT/IN backward).
    fn transfer_node(&self, stmt: StmtId, input: &Self::Fact, output: &mut Self::Fact) -> bool;
}

/// IN/OUT facts for every node, after reaching the fixed point.
#[derive(Debug, Clone)]
pub struct DataflowResult<N: Ord, F> {
    pub(crate) in_facts: BTreeMap<N, F>,
    pub(crate) out_facts: BTreeMap<N, F>,
}

impl<N: Ord + Copy, F> DataflowResult<N, F> {
    pub(crate) fn new() -> Self {
        Self {
            in_facts: BTreeMap::new(),
            out_facts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn in_fact(&self, node: N) -> Option<&F> {
        self.in_facts.get(&node)
    }

    #[must_use]
    pub fn out_fact(&self, node: N) -> Option<&F> {
        self.out_facts.get(&node)
    }

    pub fn iter_in_facts(&self) -> impl Iterator<Item = (N, &F)> {
        self.in_facts.iter().map(|(n, f)| (*n, f))
    }

    pub fn iter_out_facts(&self) -> impl Iterator<Item = (N, &F)> {
        self.out_facts.iter().map(|(n, f)| (*n, f))
    }
}

impl<N: Ord, F: PartialEq> PartialEq for DataflowResult<N, F> {
    fn eq(&self, other: &Self) -> bool {
        self.in_facts == other.in_facts && self.out_facts == other.out_facts
    }
}

/// De-duplicated FIFO over graph nodes: pushing an already pending node
/// is a no-op, so each node is in flight at most once.
pub(crate) struct Worklist {
    queue: VecDeque<NodeIndex>,
    pending: FixedBitSet,
}

impl Worklist {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            pending: FixedBitSet::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, node: NodeIndex) {
        if !self.pending.contains(node.index()) {
            self.pending.insert(node.index());
            self.queue.push_back(node);
        }
    }

    pub(crate) fn pop(&mut self) -> Option<NodeIndex> {
        let node = self.queue.pop_front()?;
        self.pending.set(node.index(), false);
        Some(node)
    }
}

/// Initial state: boundary fact on the boundary node's input side,
/// initial facts everywhere else.
pub(crate) fn init_result<A: DataflowAnalysis>(
    analysis: &A,
    cfg: &Cfg,
) -> DataflowResult<StmtId, A::Fact> {
    let boundary = if analysis.is_forward() {
        cfg.entry()
    } else {
        cfg.exit()
    };
    let mut result = DataflowResult::new();
    for stmt in cfg.iter_nodes() {
        let (in_fact, out_fact) = if stmt == boundary && analysis.is_forward() {
            (analysis.new_boundary_fact(), analysis.new_initial_fact())
        } else if stmt == boundary {
            (analysis.new_initial_fact(), analysis.new_boundary_fact())
        } else {
            (analysis.new_initial_fact(), analysis.new_initial_fact())
        };
        result.in_facts.insert(stmt, in_fact);
        result.out_facts.insert(stmt, out_fact);
    }
    result
}

/// One solver step: accumulate the meet of the upstream facts into the
/// node's stored input (which preserves the boundary seed, since the
/// boundary node's upstream set is empty), then apply the transfer
/// function. Returns true iff the node's output changed.
pub(crate) fn update_node<A: DataflowAnalysis>(
    analysis: &A,
    cfg: &Cfg,
    result: &mut DataflowResult<StmtId, A::Fact>,
    stmt: StmtId,
) -> bool {
    let forward = analysis.is_forward();
    let upstream = if forward {
        cfg.preds_of(stmt)
    } else {
        cfg.succs_of(stmt)
    };

    let mut input = if forward {
        result.in_facts[&stmt].clone()
    } else {
        result.out_facts[&stmt].clone()
    };
    for n in upstream {
        let from = if forward {
            &result.out_facts[&n]
        } else {
            &result.in_facts[&n]
        };
        analysis.meet_into(from, &mut input);
    }

    let mut output = if forward {
        result.out_facts[&stmt].clone()
    } else {
        result.in_facts[&stmt].clone()
    };
    let changed = analysis.transfer_node(stmt, &input, &mut output);
    log::trace!("    {stmt}: input {input:?} -> output {output:?} (changed: {changed})");

    if forward {
        result.in_facts.insert(stmt, input);
        result.out_facts.insert(stmt, output);
    } else {
        result.out_facts.insert(stmt, input);
        result.in_facts.insert(stmt, output);
    }
    changed
}
