//! Whole-program constant propagation.
//!
//! Extends the intraprocedural lattice over the ICFG. Calls no longer
//! poison their result variable: the call-to-return edge kills it, the
//! call edge binds callee parameters to the argument values at the
//! site, and the return edge binds it to the value the callee return
//! variables agree on. The analysis stays context-insensitive, all
//! calling contexts of a method meet at its entry.

use crate::constprop::{self, CpFact, Value};
use crate::dataflow::InterDataflowAnalysis;
use crate::icfg::{IcfgEdge, IcfgNode};
use crate::ir::{Body, Stmt};
use crate::program::{MethodId, Program};

#[derive(Debug)]
pub struct InterConstantPropagation<'a> {
    program: &'a Program,
}

impl<'a> InterConstantPropagation<'a> {
    #[must_use]
    pub fn new(program: &'a Program) -> Self {
        Self { program }
    }

    fn body_of(&self, method: MethodId) -> Option<&'a Body> {
        self.program.method(method).body()
    }
}

impl InterDataflowAnalysis for InterConstantPropagation<'_> {
    type Fact = CpFact;

    /// Entry-method parameters come from outside the analyzed program,
    /// so the ones that can hold an `int` start at NAC.
    fn new_boundary_fact(&self, method: MethodId) -> CpFact {
        let mut fact = CpFact::new();
        if let Some(body) = self.body_of(method) {
            for &param in body.params() {
                if body.var_type(param).can_hold_int() {
                    fact.update(param, Value::Nac);
                }
            }
        }
        fact
    }

    fn new_initial_fact(&self) -> CpFact {
        CpFact::new()
    }

    fn meet_into(&self, fact: &CpFact, target: &mut CpFact) {
        for (var, value) in fact.iter() {
            target.update(var, value.meet(target.get(var)));
        }
    }

    fn is_call_node(&self, node: IcfgNode) -> bool {
        self.body_of(node.method)
            .is_some_and(|body| body.stmt(node.stmt).is_call())
    }

    /// Identity: the local effect of a call is deferred to its edges.
    fn transfer_call_node(&self, _node: IcfgNode, input: &CpFact, output: &mut CpFact) -> bool {
        let changed = input != output;
        if changed {
            *output = input.clone();
        }
        changed
    }

    fn transfer_non_call_node(
        &self,
        node: IcfgNode,
        input: &CpFact,
        output: &mut CpFact,
    ) -> bool {
        let Some(body) = self.body_of(node.method) else {
            let changed = input != output;
            if changed {
                *output = input.clone();
            }
            return changed;
        };
        let new_out = constprop::transfer_stmt(body, node.stmt, input);
        let changed = new_out != *output;
        if changed {
            *output = new_out;
        }
        changed
    }

    fn transfer_edge(&self, edge: &IcfgEdge, source: IcfgNode, fact: &CpFact) -> CpFact {
        match edge {
            IcfgEdge::Normal => fact.clone(),
            // The callee may rebind the result variable; whatever value
            // it had before the call must not survive around it.
            IcfgEdge::CallToReturn => {
                let mut out = fact.clone();
                if let Some(body) = self.body_of(source.method) {
                    if let Some(def) = body.stmt(source.stmt).def() {
                        out.remove(def);
                    }
                }
                out
            }
            IcfgEdge::Call { callee } => {
                let mut out = CpFact::new();
                let (Some(caller_body), Some(callee_body)) =
                    (self.body_of(source.method), self.body_of(*callee))
                else {
                    return out;
                };
                let Stmt::Invoke { call, .. } = caller_body.stmt(source.stmt) else {
                    return out;
                };
                for (&param, &arg) in callee_body.params().iter().zip(call.args.iter()) {
                    if callee_body.var_type(param).can_hold_int() {
                        out.update(param, fact.get(arg));
                    }
                }
                out
            }
            IcfgEdge::Return {
                call_site,
                return_vars,
            } => {
                let mut out = CpFact::new();
                let Some(caller_body) = self.body_of(call_site.method) else {
                    return out;
                };
                let Some(result) = caller_body.stmt(call_site.stmt).def() else {
                    return out;
                };
                if !caller_body.var_type(result).can_hold_int() {
                    return out;
                }
                let agreed = return_vars
                    .iter()
                    .fold(Value::Undef, |acc, &v| acc.meet(fact.get(v)));
                out.update(result, agreed);
                out
            }
        }
    }
}
