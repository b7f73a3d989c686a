//! Control flow graph representation.
//!
//! Building a `Cfg` from straight-line IR is the loader's job; this
//! module only owns the graph structure the solvers consume. Nodes are
//! statement ids, edges carry the branch kind.

use crate::errors::{AnalysisError, AnalysisResult};
use crate::ir::{Body, StmtId};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Lexical successor of a non-branching statement.
    Fallthrough,
    /// Any other unconditional control transfer (goto targets,
    /// entry/exit wiring).
    Normal,
    IfTrue,
    IfFalse,
    SwitchCase(i32),
    SwitchDefault,
    /// Exceptional control transfer; carried through but never pruned.
    Exception,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Fallthrough => write!(f, "<seq>"),
            Self::Normal => write!(f, "<jmp>"),
            Self::IfTrue => write!(f, "<true>"),
            Self::IfFalse => write!(f, "<false>"),
            Self::SwitchCase(v) => write!(f, "<case {v}>"),
            Self::SwitchDefault => write!(f, "<case _>"),
            Self::Exception => write!(f, "<catch>"),
        }
    }
}

/// Per-method control flow graph with a unique entry and exit.
#[derive(Debug, Clone)]
pub struct Cfg {
    pub(crate) inner: DiGraph<StmtId, Edge>,
    pub(crate) node_ids: BTreeMap<StmtId, NodeIndex>,
    entry: StmtId,
    exit: StmtId,
}

impl Cfg {
    #[must_use]
    pub fn new(entry: StmtId, exit: StmtId) -> Self {
        let mut inner = DiGraph::new();
        let mut node_ids = BTreeMap::new();
        node_ids.insert(entry, inner.add_node(entry));
        if exit != entry {
            node_ids.insert(exit, inner.add_node(exit));
        }
        Self {
            inner,
            node_ids,
            entry,
            exit,
        }
    }

    /// # Errors
    ///
    /// Returns an error if `stmt` is already a node of this graph.
    pub fn add_node(&mut self, stmt: StmtId) -> AnalysisResult<()> {
        if self.node_ids.contains_key(&stmt) {
            return Err(AnalysisError::DuplicateNode(stmt.to_string()));
        }
        let id = self.inner.add_node(stmt);
        self.node_ids.insert(stmt, id);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if an endpoint has not been registered, so the
    /// graph can never hold a dangling edge.
    pub fn add_edge(&mut self, src: StmtId, dst: StmtId, edge: Edge) -> AnalysisResult<()> {
        let src_id = self
            .node_ids
            .get(&src)
            .ok_or_else(|| AnalysisError::UnknownNode(src.to_string()))?;
        let dst_id = self
            .node_ids
            .get(&dst)
            .ok_or_else(|| AnalysisError::UnknownNode(dst.to_string()))?;
        self.inner.add_edge(*src_id, *dst_id, edge);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn entry(&self) -> StmtId {
        self.entry
    }

    #[inline]
    #[must_use]
    pub const fn exit(&self) -> StmtId {
        self.exit
    }

    #[inline]
    #[must_use]
    pub fn is_exit(&self, stmt: StmtId) -> bool {
        stmt == self.exit
    }

    #[must_use]
    pub fn contains(&self, stmt: StmtId) -> bool {
        self.node_ids.contains_key(&stmt)
    }

    /// Nodes in ascending program order.
    pub fn iter_nodes(&self) -> impl Iterator<Item = StmtId> + '_ {
        self.node_ids.keys().copied()
    }

    #[must_use]
    pub fn preds_of(&self, stmt: StmtId) -> Vec<StmtId> {
        self.neighbors(stmt, Direction::Incoming)
    }

    #[must_use]
    pub fn succs_of(&self, stmt: StmtId) -> Vec<StmtId> {
        self.neighbors(stmt, Direction::Outgoing)
    }

    fn neighbors(&self, stmt: StmtId, dir: Direction) -> Vec<StmtId> {
        let Some(&id) = self.node_ids.get(&stmt) else {
            return Vec::new();
        };
        let mut ns: Vec<StmtId> = self
            .inner
            .neighbors_directed(id, dir)
            .map(|n| self.inner[n])
            .collect();
        ns.sort_unstable();
        ns.dedup();
        ns
    }

    /// Outgoing edges with their kinds, in insertion order (switch
    /// cases appear in declaration order).
    #[must_use]
    pub fn out_edges_of(&self, stmt: StmtId) -> Vec<(Edge, StmtId)> {
        let Some(&id) = self.node_ids.get(&stmt) else {
            return Vec::new();
        };
        let mut edges: Vec<(Edge, StmtId)> = self
            .inner
            .edges_directed(id, Direction::Outgoing)
            .map(|edge| (*edge.weight(), self.inner[edge.target()]))
            .collect();
        // petgraph iterates most-recently-inserted first
        edges.reverse();
        edges
    }

    #[must_use]
    pub fn nb_nodes(&self) -> usize {
        self.inner.node_count()
    }

    #[must_use]
    pub fn nb_edges(&self) -> usize {
        self.inner.edge_count()
    }

    /// Checks the graph preconditions the solvers rely on: all nodes
    /// belong to `body`, entry/exit match the body's synthetic points,
    /// and the exit has no outgoing edge.
    ///
    /// # Errors
    ///
    /// Returns the first violated precondition.
    pub fn validate(&self, body: &Body) -> AnalysisResult<()> {
        if self.entry != body.entry() || self.exit != body.exit() {
            return Err(AnalysisError::Internal(format!(
                "graph entry/exit {}/{} do not match the body",
                self.entry, self.exit
            )));
        }
        for stmt in self.iter_nodes() {
            if !body.contains_stmt(stmt) {
                return Err(AnalysisError::StmtOutOfBounds(stmt.to_string()));
            }
        }
        if !self.succs_of(self.exit).is_empty() {
            return Err(AnalysisError::ExitWithSuccessors(self.exit.to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_dot(&self, body: &Body) -> String {
        let mut res = String::new();
        res.push_str("digraph {\n");
        res.push_str(&format!(
            "{}",
            Dot::with_attr_getters(
                &self.inner,
                &[Config::GraphContentOnly, Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| {
                    let color = match edge.weight() {
                        Edge::IfTrue => "green",
                        Edge::IfFalse => "red",
                        Edge::SwitchCase(_) | Edge::SwitchDefault => "purple",
                        Edge::Exception => "orchid",
                        Edge::Fallthrough | Edge::Normal => "black",
                    };
                    format!("color={},xlabel=\"{}\"", color, edge.weight())
                },
                &|_, (_, stmt)| format!("label=\"{}: {}\",shape=box", stmt, body.stmt(*stmt)),
            )
        ));
        res.push('}');
        res
    }
}
