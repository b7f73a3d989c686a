//! Call graph construction by Class Hierarchy Analysis.
//!
//! CHA resolves virtual and interface dispatch from static subtype
//! information only: the possible targets of a call are the dispatch
//! results over the declared class and all of its subtypes. Reachable
//! methods are discovered by a breadth-first traversal from the entry
//! method; the traversal is monotone and runs once, it is not iterated
//! to a fixed point.

use crate::errors::AnalysisResult;
use crate::hierarchy::Hierarchy;
use crate::ir::{CallExp, CallKind, Stmt, StmtId};
use crate::program::{MethodId, Program};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

/// Lexical position of a call: the invoke statement and the method
/// containing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CallSite {
    pub method: MethodId,
    pub stmt: StmtId,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.stmt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallEdge {
    pub kind: CallKind,
    pub site: CallSite,
}

impl fmt::Display for CallEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.site)
    }
}

/// Counters summary for external reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CallGraphStats {
    pub nb_reachable_methods: usize,
    pub nb_edges: usize,
    pub nb_call_sites: usize,
}

/// Methods-as-nodes graph of the possible calls reachable from the
/// entry method.
#[derive(Debug)]
pub struct CallGraph {
    inner: DiGraph<MethodId, CallEdge>,
    node_ids: BTreeMap<MethodId, NodeIndex>,
    reachable: BTreeSet<MethodId>,
    entry: MethodId,
}

impl CallGraph {
    /// Builds the call graph reachable from `entry` using CHA over the
    /// given hierarchy.
    ///
    /// # Errors
    ///
    /// Propagates hierarchy lookup failures; a call site resolving to
    /// zero targets is not an error and simply contributes no edges.
    pub fn build(hierarchy: &Hierarchy, entry: MethodId) -> AnalysisResult<Self> {
        let program = hierarchy.program();
        let mut cg = Self {
            inner: DiGraph::new(),
            node_ids: BTreeMap::new(),
            reachable: BTreeSet::new(),
            entry,
        };
        cg.ensure_node(entry);

        let mut queue = VecDeque::from([entry]);
        while let Some(method) = queue.pop_front() {
            if !cg.reachable.insert(method) {
                continue;
            }
            log::debug!("reachable method: {}", program.method_label(method));
            let Some(body) = program.method(method).body() else {
                continue;
            };
            for (stmt_id, stmt) in body.iter_stmts() {
                let Stmt::Invoke { call, .. } = stmt else {
                    continue;
                };
                let targets = resolve(hierarchy, call);
                if targets.is_empty() {
                    log::trace!(
                        "call site {method}:{stmt_id} ({}) resolves to no target",
                        call.sig
                    );
                }
                for target in targets {
                    let src = cg.ensure_node(method);
                    let dst = cg.ensure_node(target);
                    cg.inner.add_edge(
                        src,
                        dst,
                        CallEdge {
                            kind: call.kind,
                            site: CallSite {
                                method,
                                stmt: stmt_id,
                            },
                        },
                    );
                    queue.push_back(target);
                }
            }
        }
        Ok(cg)
    }

    fn ensure_node(&mut self, method: MethodId) -> NodeIndex {
        *self
            .node_ids
            .entry(method)
            .or_insert_with(|| self.inner.add_node(method))
    }

    #[inline]
    #[must_use]
    pub const fn entry(&self) -> MethodId {
        self.entry
    }

    #[must_use]
    pub fn contains(&self, method: MethodId) -> bool {
        self.reachable.contains(&method)
    }

    #[must_use]
    pub fn reachable_methods(&self) -> &BTreeSet<MethodId> {
        &self.reachable
    }

    /// All edges as (caller, edge, callee) triples.
    pub fn iter_edges(&self) -> impl Iterator<Item = (MethodId, CallEdge, MethodId)> + '_ {
        self.inner.edge_references().map(|edge| {
            (
                self.inner[edge.source()],
                *edge.weight(),
                self.inner[edge.target()],
            )
        })
    }

    /// Possible targets of the call at `site`, sorted and deduplicated.
    #[must_use]
    pub fn callees_at(&self, site: CallSite) -> Vec<MethodId> {
        let Some(&id) = self.node_ids.get(&site.method) else {
            return Vec::new();
        };
        let mut callees: Vec<MethodId> = self
            .inner
            .edges_directed(id, Direction::Outgoing)
            .filter(|edge| edge.weight().site == site)
            .map(|edge| self.inner[edge.target()])
            .collect();
        callees.sort_unstable();
        callees.dedup();
        callees
    }

    /// Statements of `method` that are resolved call sites.
    #[must_use]
    pub fn call_sites_in(&self, method: MethodId) -> BTreeSet<StmtId> {
        let Some(&id) = self.node_ids.get(&method) else {
            return BTreeSet::new();
        };
        self.inner
            .edges_directed(id, Direction::Outgoing)
            .map(|edge| edge.weight().site.stmt)
            .collect()
    }

    #[must_use]
    pub fn nb_methods(&self) -> usize {
        self.reachable.len()
    }

    #[must_use]
    pub fn nb_edges(&self) -> usize {
        self.inner.edge_count()
    }

    #[must_use]
    pub fn stats(&self) -> CallGraphStats {
        let call_sites: BTreeSet<CallSite> = self
            .inner
            .edge_references()
            .map(|edge| edge.weight().site)
            .collect();
        CallGraphStats {
            nb_reachable_methods: self.nb_methods(),
            nb_edges: self.nb_edges(),
            nb_call_sites: call_sites.len(),
        }
    }

    #[must_use]
    pub fn to_dot(&self, program: &Program) -> String {
        let mut res = String::new();
        res.push_str("digraph {\n");
        res.push_str("  rankdir=LR;\n");
        res.push_str(&format!(
            "{}",
            Dot::with_attr_getters(
                &self.inner,
                &[Config::GraphContentOnly, Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| format!("xlabel=\"{}\"", edge.weight()),
                &|_, (_, method)| {
                    format!("label=\"{}\",shape=box", program.method_label(*method))
                }
            )
        ));
        res.push('}');
        res
    }
}

/// CHA call-site resolution.
fn resolve(hierarchy: &Hierarchy, call: &CallExp) -> BTreeSet<MethodId> {
    let program = hierarchy.program();
    let mut targets = BTreeSet::new();
    match call.kind {
        CallKind::Static => {
            if let Some(m) = program.declared_method(call.class, &call.sig) {
                targets.insert(m);
            } else {
                log::warn!(
                    "static call to undeclared method {} on {}",
                    call.sig,
                    program.class(call.class).name()
                );
            }
        }
        CallKind::Special => {
            if let Some(m) = hierarchy.dispatch(call.class, &call.sig) {
                targets.insert(m);
            }
        }
        CallKind::Virtual | CallKind::Interface => {
            for class in std::iter::once(call.class).chain(hierarchy.all_subtypes_of(call.class)) {
                if let Some(m) = hierarchy.dispatch(class, &call.sig) {
                    targets.insert(m);
                }
            }
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Body, VarType};
    use crate::program::{ClassKind, Signature};

    fn call_stmt(kind: CallKind, class: crate::program::ClassId, sig: &str) -> Stmt {
        Stmt::Invoke {
            result: None,
            call: CallExp {
                kind,
                class,
                sig: Signature::new(sig),
                args: vec![],
            },
        }
    }

    fn empty_body() -> Body {
        Body::builder().build()
    }

    // A declares foo, B extends A (no override),
    // C extends B and overrides foo.
    fn abc_with_call(static_type: &str) -> (Program, MethodId, MethodId, MethodId) {
        let mut p = Program::new();
        let a = p.add_class("A", ClassKind::Class, None, vec![]).unwrap();
        let b = p.add_class("B", ClassKind::Class, Some(a), vec![]).unwrap();
        let c = p.add_class("C", ClassKind::Class, Some(b), vec![]).unwrap();
        let foo = Signature::new("foo()");
        let a_foo = p.add_method(a, foo.clone(), Some(empty_body())).unwrap();
        let c_foo = p.add_method(c, foo.clone(), Some(empty_body())).unwrap();

        let declared = p.class_by_name(static_type).unwrap();
        let mut mb = Body::builder();
        let _ = mb.var("o", VarType::Reference);
        mb.stmt(call_stmt(CallKind::Virtual, declared, "foo()"));
        let main = p
            .add_method(a, Signature::new("main()"), Some(mb.build()))
            .unwrap();
        (p, main, a_foo, c_foo)
    }

    #[test]
    fn virtual_call_on_base_resolves_to_both_implementations() {
        let (p, main, a_foo, c_foo) = abc_with_call("A");
        let h = Hierarchy::build(&p);
        let cg = CallGraph::build(&h, main).unwrap();
        let callees = cg.callees_at(CallSite {
            method: main,
            stmt: StmtId(0),
        });
        assert_eq!(callees, vec![a_foo, c_foo]);
        assert!(cg.contains(a_foo));
        assert!(cg.contains(c_foo));
        assert_eq!(cg.nb_methods(), 3);
    }

    #[test]
    fn virtual_call_on_middle_class_inherits_base_target() {
        // B has no override: dispatch on B finds A.foo, on C finds C.foo.
        let (p, main, a_foo, c_foo) = abc_with_call("B");
        let h = Hierarchy::build(&p);
        let cg = CallGraph::build(&h, main).unwrap();
        let callees = cg.callees_at(CallSite {
            method: main,
            stmt: StmtId(0),
        });
        assert_eq!(callees, vec![a_foo, c_foo]);
    }

    #[test]
    fn interface_without_implementor_contributes_no_edge() {
        let mut p = Program::new();
        let a = p.add_class("A", ClassKind::Class, None, vec![]).unwrap();
        let i = p.add_class("I", ClassKind::Interface, None, vec![]).unwrap();
        p.add_abstract_method(i, Signature::new("bar()")).unwrap();
        let mut mb = Body::builder();
        mb.stmt(call_stmt(CallKind::Interface, i, "bar()"));
        let main = p
            .add_method(a, Signature::new("main()"), Some(mb.build()))
            .unwrap();
        let h = Hierarchy::build(&p);
        let cg = CallGraph::build(&h, main).unwrap();
        assert_eq!(cg.nb_edges(), 0);
        assert_eq!(cg.reachable_methods().len(), 1);
    }

    #[test]
    fn static_and_special_dispatch() {
        let mut p = Program::new();
        let a = p.add_class("A", ClassKind::Class, None, vec![]).unwrap();
        let b = p.add_class("B", ClassKind::Class, Some(a), vec![]).unwrap();
        let init = p
            .add_method(a, Signature::new("<init>()"), Some(empty_body()))
            .unwrap();
        let util = p
            .add_method(a, Signature::new("util()"), Some(empty_body()))
            .unwrap();
        let mut mb = Body::builder();
        mb.stmt(call_stmt(CallKind::Static, a, "util()"));
        // special dispatch from B walks up to A.<init>
        mb.stmt(call_stmt(CallKind::Special, b, "<init>()"));
        let main = p
            .add_method(b, Signature::new("main()"), Some(mb.build()))
            .unwrap();
        let h = Hierarchy::build(&p);
        let cg = CallGraph::build(&h, main).unwrap();
        assert_eq!(
            cg.callees_at(CallSite {
                method: main,
                stmt: StmtId(0)
            }),
            vec![util]
        );
        assert_eq!(
            cg.callees_at(CallSite {
                method: main,
                stmt: StmtId(1)
            }),
            vec![init]
        );
        let stats = cg.stats();
        assert_eq!(stats.nb_call_sites, 2);
        assert_eq!(stats.nb_reachable_methods, 3);
    }

    #[test]
    fn recursion_is_recorded_once() {
        let mut p = Program::new();
        let a = p.add_class("A", ClassKind::Class, None, vec![]).unwrap();
        let mut mb = Body::builder();
        mb.stmt(call_stmt(CallKind::Static, a, "main()"));
        let body = mb.build();
        let main = p.add_method(a, Signature::new("main()"), Some(body)).unwrap();
        let h = Hierarchy::build(&p);
        let cg = CallGraph::build(&h, main).unwrap();
        assert_eq!(cg.nb_methods(), 1);
        assert_eq!(cg.nb_edges(), 1);
    }
}
