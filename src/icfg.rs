//! Interprocedural control-flow graph.
//!
//! The ICFG glues the per-method control-flow graphs together along the
//! call graph. Each node is a statement qualified by its containing
//! method. Inside a method the intraprocedural edges are kept, except
//! that the outgoing edges of an invoke statement become call-to-return
//! edges. Each resolved call contributes a call edge to the callee
//! entry and, for each local successor of the site, a return edge from
//! the callee exit carrying the callee return variables.

use crate::callgraph::{CallGraph, CallSite};
use crate::controlflow::Cfg;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::ir::{StmtId, VarId};
use crate::program::{MethodId, Program};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::BTreeMap;
use std::fmt;

/// A statement qualified by its containing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IcfgNode {
    pub method: MethodId,
    pub stmt: StmtId,
}

impl fmt::Display for IcfgNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.stmt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcfgEdge {
    /// Intraprocedural edge between two non-call program points.
    Normal,
    /// Intraprocedural edge leaving an invoke statement.
    CallToReturn,
    /// Call site to callee entry.
    Call { callee: MethodId },
    /// Callee exit back to a local successor of the call site.
    Return {
        call_site: CallSite,
        return_vars: Vec<VarId>,
    },
}

impl fmt::Display for IcfgEdge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "<seq>"),
            Self::CallToReturn => write!(f, "<skip>"),
            Self::Call { callee } => write!(f, "<call {callee}>"),
            Self::Return { call_site, .. } => write!(f, "<ret {call_site}>"),
        }
    }
}

#[derive(Debug)]
pub struct Icfg {
    inner: DiGraph<IcfgNode, IcfgEdge>,
    node_ids: BTreeMap<IcfgNode, NodeIndex>,
    boundaries: BTreeMap<MethodId, (StmtId, StmtId)>,
    entry_method: MethodId,
}

impl Icfg {
    /// Assembles the ICFG from the call graph and the control-flow
    /// graphs of the reachable methods. Methods without a graph (no
    /// analyzable body) keep their call edges unexpanded: calls to them
    /// are only covered by the call-to-return edge.
    ///
    /// # Errors
    ///
    /// Fails if the call-graph entry method has no control-flow graph,
    /// or if a graph is inconsistent with its method body.
    pub fn build(
        program: &Program,
        call_graph: &CallGraph,
        cfgs: &BTreeMap<MethodId, Cfg>,
    ) -> AnalysisResult<Self> {
        let entry_method = call_graph.entry();
        if !cfgs.contains_key(&entry_method) {
            return Err(AnalysisError::MissingEntry(entry_method.to_string()));
        }

        let mut icfg = Self {
            inner: DiGraph::new(),
            node_ids: BTreeMap::new(),
            boundaries: BTreeMap::new(),
            entry_method,
        };

        for (&method, cfg) in cfgs {
            if !call_graph.contains(method) {
                continue;
            }
            let body = program
                .method(method)
                .body()
                .ok_or(AnalysisError::NoBody(method.to_string()))?;
            cfg.validate(body)?;
            icfg.boundaries.insert(method, (cfg.entry(), cfg.exit()));
            for stmt in cfg.iter_nodes() {
                icfg.ensure_node(IcfgNode { method, stmt });
            }
            for stmt in cfg.iter_nodes() {
                let is_call = body.stmt(stmt).is_call();
                for (_, succ) in cfg.out_edges_of(stmt) {
                    let weight = if is_call {
                        IcfgEdge::CallToReturn
                    } else {
                        IcfgEdge::Normal
                    };
                    icfg.add_edge(
                        IcfgNode { method, stmt },
                        IcfgNode { method, stmt: succ },
                        weight,
                    );
                }
            }
        }

        for (caller, edge, callee) in call_graph.iter_edges() {
            let Some(callee_cfg) = cfgs.get(&callee) else {
                log::trace!(
                    "call edge to {} not expanded, callee has no graph",
                    program.method_label(callee)
                );
                continue;
            };
            let Some(caller_cfg) = cfgs.get(&caller) else {
                continue;
            };
            let callee_body = program
                .method(callee)
                .body()
                .ok_or(AnalysisError::NoBody(callee.to_string()))?;
            let site = IcfgNode {
                method: edge.site.method,
                stmt: edge.site.stmt,
            };
            icfg.add_edge(
                site,
                IcfgNode {
                    method: callee,
                    stmt: callee_cfg.entry(),
                },
                IcfgEdge::Call { callee },
            );
            let callee_exit = IcfgNode {
                method: callee,
                stmt: callee_cfg.exit(),
            };
            for succ in caller_cfg.succs_of(edge.site.stmt) {
                icfg.add_edge(
                    callee_exit,
                    IcfgNode {
                        method: caller,
                        stmt: succ,
                    },
                    IcfgEdge::Return {
                        call_site: edge.site,
                        return_vars: callee_body.return_vars(),
                    },
                );
            }
        }

        log::debug!(
            "icfg: {} nodes, {} edges",
            icfg.nb_nodes(),
            icfg.nb_edges()
        );
        Ok(icfg)
    }

    fn ensure_node(&mut self, node: IcfgNode) -> NodeIndex {
        *self
            .node_ids
            .entry(node)
            .or_insert_with(|| self.inner.add_node(node))
    }

    fn add_edge(&mut self, src: IcfgNode, dst: IcfgNode, weight: IcfgEdge) {
        let src = self.ensure_node(src);
        let dst = self.ensure_node(dst);
        self.inner.add_edge(src, dst, weight);
    }

    #[inline]
    #[must_use]
    pub const fn entry_method(&self) -> MethodId {
        self.entry_method
    }

    /// The boundary node of the whole analysis: the entry point of the
    /// entry method.
    #[must_use]
    pub fn entry_node(&self) -> IcfgNode {
        // build() guarantees the entry method has a graph.
        let (entry, _) = self.boundaries[&self.entry_method];
        IcfgNode {
            method: self.entry_method,
            stmt: entry,
        }
    }

    #[must_use]
    pub fn entry_of(&self, method: MethodId) -> Option<StmtId> {
        self.boundaries.get(&method).map(|&(entry, _)| entry)
    }

    #[must_use]
    pub fn exit_of(&self, method: MethodId) -> Option<StmtId> {
        self.boundaries.get(&method).map(|&(_, exit)| exit)
    }

    #[must_use]
    pub fn contains(&self, node: IcfgNode) -> bool {
        self.node_ids.contains_key(&node)
    }

    /// All nodes in (method, statement) order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = IcfgNode> + '_ {
        self.node_ids.keys().copied()
    }

    /// Incoming edges with their source nodes.
    #[must_use]
    pub fn in_edges_of(&self, node: IcfgNode) -> Vec<(IcfgNode, &IcfgEdge)> {
        let Some(&id) = self.node_ids.get(&node) else {
            return Vec::new();
        };
        let mut edges: Vec<(IcfgNode, &IcfgEdge)> = self
            .inner
            .edges_directed(id, Direction::Incoming)
            .map(|edge| (self.inner[edge.source()], edge.weight()))
            .collect();
        edges.reverse();
        edges
    }

    #[must_use]
    pub fn succs_of(&self, node: IcfgNode) -> Vec<IcfgNode> {
        let Some(&id) = self.node_ids.get(&node) else {
            return Vec::new();
        };
        let mut succs: Vec<IcfgNode> = self
            .inner
            .neighbors_directed(id, Direction::Outgoing)
            .map(|succ| self.inner[succ])
            .collect();
        succs.sort_unstable();
        succs.dedup();
        succs
    }

    pub(crate) fn index_of(&self, node: IcfgNode) -> Option<NodeIndex> {
        self.node_ids.get(&node).copied()
    }

    pub(crate) fn node_at(&self, id: NodeIndex) -> IcfgNode {
        self.inner[id]
    }

    #[must_use]
    pub fn nb_nodes(&self) -> usize {
        self.inner.node_count()
    }

    #[must_use]
    pub fn nb_edges(&self) -> usize {
        self.inner.edge_count()
    }

    #[must_use]
    pub fn to_dot(&self, program: &Program) -> String {
        let mut res = String::new();
        res.push_str("digraph {\n");
        res.push_str(&format!(
            "{}",
            Dot::with_attr_getters(
                &self.inner,
                &[Config::GraphContentOnly, Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| format!("xlabel=\"{}\"", edge.weight()),
                &|_, (_, node)| {
                    format!(
                        "label=\"{}:{}\",shape=box",
                        program.method_label(node.method),
                        node.stmt
                    )
                }
            )
        ));
        res.push('}');
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlflow::Edge;
    use crate::hierarchy::Hierarchy;
    use crate::ir::{Body, CallExp, CallKind, Exp, Stmt, VarType};
    use crate::program::{ClassKind, Program, Signature};

    // main() { x = id(); nop } with id() { return r }
    fn sample() -> (Program, BTreeMap<MethodId, Cfg>, MethodId, MethodId) {
        let mut p = Program::new();
        let a = p.add_class("A", ClassKind::Class, None, vec![]).unwrap();

        let mut ib = Body::builder();
        let r = ib.var("r", VarType::Int);
        let ret = ib.stmt(Stmt::Return { var: Some(r) });
        let id_body = ib.build();
        let mut id_cfg = Cfg::new(id_body.entry(), id_body.exit());
        id_cfg.add_node(ret).unwrap();
        id_cfg.add_edge(id_body.entry(), ret, Edge::Fallthrough).unwrap();
        id_cfg.add_edge(ret, id_body.exit(), Edge::Normal).unwrap();
        let id = p
            .add_method(a, Signature::new("id()"), Some(id_body))
            .unwrap();

        let mut mb = Body::builder();
        let x = mb.var("x", VarType::Int);
        let call = mb.stmt(Stmt::Invoke {
            result: Some(x),
            call: CallExp {
                kind: CallKind::Static,
                class: a,
                sig: Signature::new("id()"),
                args: vec![],
            },
        });
        let after = mb.stmt(Stmt::Assign {
            lhs: x,
            rhs: Exp::Var(x),
        });
        let main_body = mb.build();
        let mut main_cfg = Cfg::new(main_body.entry(), main_body.exit());
        main_cfg.add_node(call).unwrap();
        main_cfg.add_node(after).unwrap();
        main_cfg
            .add_edge(main_body.entry(), call, Edge::Fallthrough)
            .unwrap();
        main_cfg.add_edge(call, after, Edge::Fallthrough).unwrap();
        main_cfg
            .add_edge(after, main_body.exit(), Edge::Fallthrough)
            .unwrap();
        let main = p
            .add_method(a, Signature::new("main()"), Some(main_body))
            .unwrap();

        let mut cfgs = BTreeMap::new();
        cfgs.insert(id, id_cfg);
        cfgs.insert(main, main_cfg);
        (p, cfgs, main, id)
    }

    #[test]
    fn call_edges_are_threaded_through_callee() {
        let (p, cfgs, main, id) = sample();
        let h = Hierarchy::build(&p);
        let cg = CallGraph::build(&h, main).unwrap();
        let icfg = Icfg::build(&p, &cg, &cfgs).unwrap();

        let site = IcfgNode {
            method: main,
            stmt: StmtId(0),
        };
        let succs = icfg.succs_of(site);
        // call-to-return to the local successor and call edge to the
        // callee entry
        assert_eq!(succs.len(), 2);
        assert!(succs.contains(&IcfgNode {
            method: id,
            stmt: icfg.entry_of(id).unwrap(),
        }));
        assert!(succs.contains(&IcfgNode {
            method: main,
            stmt: StmtId(1),
        }));

        let after = IcfgNode {
            method: main,
            stmt: StmtId(1),
        };
        let incoming = icfg.in_edges_of(after);
        assert!(incoming.iter().any(|(src, edge)| {
            src.method == id
                && matches!(edge, IcfgEdge::Return { return_vars, .. } if return_vars.len() == 1)
        }));
        assert!(incoming
            .iter()
            .any(|(src, edge)| *src == site && **edge == IcfgEdge::CallToReturn));
    }

    #[test]
    fn entry_node_is_entry_method_entry() {
        let (p, cfgs, main, _) = sample();
        let h = Hierarchy::build(&p);
        let cg = CallGraph::build(&h, main).unwrap();
        let icfg = Icfg::build(&p, &cg, &cfgs).unwrap();
        assert_eq!(icfg.entry_method(), main);
        assert_eq!(icfg.entry_node().method, main);
        assert_eq!(Some(icfg.entry_node().stmt), icfg.entry_of(main));
    }

    #[test]
    fn missing_entry_graph_is_an_error() {
        let (p, mut cfgs, main, _) = sample();
        let h = Hierarchy::build(&p);
        let cg = CallGraph::build(&h, main).unwrap();
        cfgs.remove(&main);
        assert!(Icfg::build(&p, &cg, &cfgs).is_err());
    }
}
