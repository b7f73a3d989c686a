//! Class hierarchy graph representation.
//!
//! Edges point from a type to the types it inherits from, so subtype
//! queries walk incoming edges.

use crate::errors::{AnalysisError, AnalysisResult};
use crate::program::{ClassId, ClassKind, MethodId, Program, Signature};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef, Reversed};
use petgraph::Direction;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inheritance {
    Extends,
    Implements,
}

impl fmt::Display for Inheritance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Extends => write!(f, "<extends>"),
            Self::Implements => write!(f, "<implements>"),
        }
    }
}

/// Inheritance queries over a [`Program`]'s class table.
#[derive(Debug)]
pub struct Hierarchy<'a> {
    program: &'a Program,
    inner: DiGraph<ClassId, Inheritance>,
    node_ids: BTreeMap<ClassId, NodeIndex>,
}

impl<'a> Hierarchy<'a> {
    #[must_use]
    pub fn build(program: &'a Program) -> Self {
        let mut inner = DiGraph::new();
        let mut node_ids = BTreeMap::new();
        for (id, _) in program.iter_classes() {
            node_ids.insert(id, inner.add_node(id));
        }
        for (id, class) in program.iter_classes() {
            let src = node_ids[&id];
            if let Some(sup) = class.super_class() {
                inner.add_edge(src, node_ids[&sup], Inheritance::Extends);
            }
            // For interfaces the "interfaces" list holds the extended
            // superinterfaces.
            let link = match class.kind() {
                ClassKind::Class => Inheritance::Implements,
                ClassKind::Interface => Inheritance::Extends,
            };
            for itf in class.interfaces() {
                inner.add_edge(src, node_ids[itf], link);
            }
        }
        Self {
            program,
            inner,
            node_ids,
        }
    }

    #[inline]
    #[must_use]
    pub fn program(&self) -> &'a Program {
        self.program
    }

    #[must_use]
    pub fn super_class_of(&self, class: ClassId) -> Option<ClassId> {
        self.program.class(class).super_class()
    }

    /// Classes directly extending `class`.
    #[must_use]
    pub fn direct_subclasses_of(&self, class: ClassId) -> Vec<ClassId> {
        self.direct_subtypes(class, |k, link| {
            k == ClassKind::Class && link == Inheritance::Extends
        })
    }

    /// Classes directly implementing the interface `itf`.
    #[must_use]
    pub fn direct_implementors_of(&self, itf: ClassId) -> Vec<ClassId> {
        self.direct_subtypes(itf, |k, link| {
            k == ClassKind::Class && link == Inheritance::Implements
        })
    }

    /// Interfaces directly extending the interface `itf`.
    #[must_use]
    pub fn direct_subinterfaces_of(&self, itf: ClassId) -> Vec<ClassId> {
        self.direct_subtypes(itf, |k, link| {
            k == ClassKind::Interface && link == Inheritance::Extends
        })
    }

    fn direct_subtypes<P>(&self, class: ClassId, keep: P) -> Vec<ClassId>
    where
        P: Fn(ClassKind, Inheritance) -> bool,
    {
        let Some(&id) = self.node_ids.get(&class) else {
            return Vec::new();
        };
        let mut subs: Vec<ClassId> = self
            .inner
            .edges_directed(id, Direction::Incoming)
            .filter(|edge| {
                let sub = self.inner[edge.source()];
                keep(self.program.class(sub).kind(), *edge.weight())
            })
            .map(|edge| self.inner[edge.source()])
            .collect();
        subs.sort_unstable();
        subs
    }

    /// All transitive subclasses, implementors and subinterfaces of
    /// `class`, excluding `class` itself.
    #[must_use]
    pub fn all_subtypes_of(&self, class: ClassId) -> Vec<ClassId> {
        let Some(&id) = self.node_ids.get(&class) else {
            return Vec::new();
        };
        let reversed = Reversed(&self.inner);
        let mut subs = Vec::new();
        let mut dfs = Dfs::new(reversed, id);
        while let Some(sub) = dfs.next(reversed) {
            if sub != id {
                subs.push(self.inner[sub]);
            }
        }
        subs.sort_unstable();
        subs
    }

    /// Virtual dispatch lookup: the concrete method `class` would run
    /// for `sig`, found by walking up the superclass chain.
    #[must_use]
    pub fn dispatch(&self, class: ClassId, sig: &Signature) -> Option<MethodId> {
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(m) = self.program.declared_method(c, sig) {
                if !self.program.method(m).is_abstract() {
                    return Some(m);
                }
            }
            current = self.program.class(c).super_class();
        }
        None
    }

    /// # Errors
    ///
    /// Returns an error if `name` names no class of the program.
    pub fn class_by_name(&self, name: &str) -> AnalysisResult<ClassId> {
        self.program
            .class_by_name(name)
            .ok_or_else(|| AnalysisError::ClassNotFound(name.to_string()))
    }

    #[must_use]
    pub fn to_dot(&self) -> String {
        format!(
            "{}",
            Dot::with_attr_getters(
                &self.inner,
                &[Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| {
                    let style = match edge.weight() {
                        Inheritance::Extends => "solid",
                        Inheritance::Implements => "dashed",
                    };
                    format!("arrowType=empty,style={style}")
                },
                &|_, (_, class)| {
                    let shape = match self.program.class(*class).kind() {
                        ClassKind::Class => "box",
                        ClassKind::Interface => "ellipse",
                    };
                    format!("label=\"{}\",shape={shape}", self.program.class(*class).name())
                }
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A <- B <- C, interface I with implementor B, subinterface J.
    fn sample() -> Program {
        let mut p = Program::new();
        let a = p.add_class("A", ClassKind::Class, None, vec![]).unwrap();
        let i = p.add_class("I", ClassKind::Interface, None, vec![]).unwrap();
        let b = p
            .add_class("B", ClassKind::Class, Some(a), vec![i])
            .unwrap();
        p.add_class("C", ClassKind::Class, Some(b), vec![]).unwrap();
        p.add_class("J", ClassKind::Interface, None, vec![i]).unwrap();
        p
    }

    #[test]
    fn direct_queries() {
        let p = sample();
        let h = Hierarchy::build(&p);
        let a = p.class_by_name("A").unwrap();
        let b = p.class_by_name("B").unwrap();
        let c = p.class_by_name("C").unwrap();
        let i = p.class_by_name("I").unwrap();
        let j = p.class_by_name("J").unwrap();
        assert_eq!(h.direct_subclasses_of(a), vec![b]);
        assert_eq!(h.direct_subclasses_of(b), vec![c]);
        assert_eq!(h.direct_implementors_of(i), vec![b]);
        assert_eq!(h.direct_subinterfaces_of(i), vec![j]);
        assert_eq!(h.super_class_of(c), Some(b));
    }

    #[test]
    fn transitive_subtypes() {
        let p = sample();
        let h = Hierarchy::build(&p);
        let a = p.class_by_name("A").unwrap();
        let i = p.class_by_name("I").unwrap();
        let b = p.class_by_name("B").unwrap();
        let c = p.class_by_name("C").unwrap();
        let j = p.class_by_name("J").unwrap();
        assert_eq!(h.all_subtypes_of(a), vec![b, c]);
        assert_eq!(h.all_subtypes_of(i), vec![b, c, j]);
    }

    #[test]
    fn dispatch_walks_superclasses() {
        let mut p = sample();
        let a = p.class_by_name("A").unwrap();
        let c = p.class_by_name("C").unwrap();
        let foo = Signature::new("foo()");
        let a_foo = p.add_method(a, foo.clone(), None).unwrap();
        let c_foo = p.add_method(c, foo.clone(), None).unwrap();
        let h = Hierarchy::build(&p);
        let b = p.class_by_name("B").unwrap();
        assert_eq!(h.dispatch(a, &foo), Some(a_foo));
        assert_eq!(h.dispatch(b, &foo), Some(a_foo));
        assert_eq!(h.dispatch(c, &foo), Some(c_foo));
    }

    #[test]
    fn dispatch_skips_abstract_declarations() {
        let mut p = Program::new();
        let a = p.add_class("A", ClassKind::Class, None, vec![]).unwrap();
        let b = p.add_class("B", ClassKind::Class, Some(a), vec![]).unwrap();
        let foo = Signature::new("foo()");
        p.add_abstract_method(a, foo.clone()).unwrap();
        let b_foo = p.add_method(b, foo.clone(), None).unwrap();
        let h = Hierarchy::build(&p);
        assert_eq!(h.dispatch(a, &foo), None);
        assert_eq!(h.dispatch(b, &foo), Some(b_foo));
    }
}
