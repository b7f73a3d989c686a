//! Live variable analysis.
//!
//! Backward may-analysis over a set lattice: a variable is live at a
//! point if some path to the exit reads it before redefining it. The
//! result feeds dead-assignment detection.

use crate::dataflow::DataflowAnalysis;
use crate::ir::{Body, StmtId, VarId};
use std::collections::BTreeSet;

pub type LiveFact = BTreeSet<VarId>;

#[derive(Debug)]
pub struct LiveVariables<'a> {
    body: &'a Body,
}

impl<'a> LiveVariables<'a> {
    #[must_use]
    pub fn new(body: &'a Body) -> Self {
        Self { body }
    }
}

impl DataflowAnalysis for LiveVariables<'_> {
    type Fact = LiveFact;

    fn is_forward(&self) -> bool {
        false
    }

    fn new_boundary_fact(&self) -> LiveFact {
        LiveFact::new()
    }

    fn new_initial_fact(&self) -> LiveFact {
        LiveFact::new()
    }

    fn meet_into(&self, fact: &LiveFact, target: &mut LiveFact) {
        for &var in fact {
            target.insert(var);
        }
    }

    // IN = (OUT - def) ∪ use
    fn transfer_node(&self, stmt: StmtId, input: &LiveFact, output: &mut LiveFact) -> bool {
        let s = self.body.stmt(stmt);
        let mut new_in = input.clone();
        if let Some(def) = s.def() {
            new_in.remove(&def);
        }
        for var in s.uses() {
            new_in.insert(var);
        }
        let changed = new_in != *output;
        *output = new_in;
        changed
    }
}
