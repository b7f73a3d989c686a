//! Whole-program context: class and method tables.
//!
//! The program object replaces any ambient global state; builders and
//! solvers receive it explicitly. It only stores declarations, the
//! inheritance queries live in [`crate::hierarchy`].

use crate::errors::{AnalysisError, AnalysisResult};
use crate::ir::Body;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Unique id of a class in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClassId(pub u32);

impl ClassId {
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Unique id of a method in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MethodId(pub u32);

impl MethodId {
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Method subsignature: the key under which dispatch looks methods up.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn new(sig: impl Into<String>) -> Self {
        Self(sig.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Class,
    Interface,
}

#[derive(Debug, Clone)]
pub struct Class {
    name: String,
    kind: ClassKind,
    super_class: Option<ClassId>,
    /// Implemented interfaces for a class, extended superinterfaces
    /// for an interface.
    interfaces: Vec<ClassId>,
    methods: BTreeMap<Signature, MethodId>,
}

impl Class {
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ClassKind {
        self.kind
    }

    #[must_use]
    pub const fn is_interface(&self) -> bool {
        matches!(self.kind, ClassKind::Interface)
    }

    #[inline]
    #[must_use]
    pub const fn super_class(&self) -> Option<ClassId> {
        self.super_class
    }

    #[inline]
    pub fn interfaces(&self) -> &[ClassId] {
        &self.interfaces
    }

    pub fn iter_methods(&self) -> impl Iterator<Item = (&Signature, MethodId)> {
        self.methods.iter().map(|(sig, id)| (sig, *id))
    }
}

#[derive(Debug, Clone)]
pub struct Method {
    class: ClassId,
    sig: Signature,
    is_abstract: bool,
    body: Option<Body>,
}

impl Method {
    #[inline]
    #[must_use]
    pub const fn class(&self) -> ClassId {
        self.class
    }

    #[inline]
    #[must_use]
    pub fn sig(&self) -> &Signature {
        &self.sig
    }

    #[inline]
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }
}

/// The program under analysis.
#[derive(Debug, Default)]
pub struct Program {
    classes: Vec<Class>,
    by_name: BTreeMap<String, ClassId>,
    methods: Vec<Method>,
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class or interface declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is already taken or a referenced
    /// superclass/interface id is unknown.
    pub fn add_class(
        &mut self,
        name: &str,
        kind: ClassKind,
        super_class: Option<ClassId>,
        interfaces: Vec<ClassId>,
    ) -> AnalysisResult<ClassId> {
        if self.by_name.contains_key(name) {
            return Err(AnalysisError::DuplicateClass(name.to_string()));
        }
        for parent in super_class.iter().chain(interfaces.iter()) {
            if parent.idx() >= self.classes.len() {
                return Err(AnalysisError::ClassNotFound(parent.to_string()));
            }
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class {
            name: name.to_string(),
            kind,
            super_class,
            interfaces,
            methods: BTreeMap::new(),
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Registers a concrete method; `body` is `None` for methods whose
    /// implementation is outside the analyzed program.
    ///
    /// # Errors
    ///
    /// Returns an error if the class is unknown or already declares the
    /// signature.
    pub fn add_method(
        &mut self,
        class: ClassId,
        sig: Signature,
        body: Option<Body>,
    ) -> AnalysisResult<MethodId> {
        self.insert_method(class, sig, false, body)
    }

    /// Registers an abstract method (never a dispatch target).
    ///
    /// # Errors
    ///
    /// Same conditions as [`Program::add_method`].
    pub fn add_abstract_method(
        &mut self,
        class: ClassId,
        sig: Signature,
    ) -> AnalysisResult<MethodId> {
        self.insert_method(class, sig, true, None)
    }

    fn insert_method(
        &mut self,
        class: ClassId,
        sig: Signature,
        is_abstract: bool,
        body: Option<Body>,
    ) -> AnalysisResult<MethodId> {
        let class_entry = self
            .classes
            .get_mut(class.idx())
            .ok_or_else(|| AnalysisError::ClassNotFound(class.to_string()))?;
        if class_entry.methods.contains_key(&sig) {
            return Err(AnalysisError::DuplicateMethod {
                class: class_entry.name.clone(),
                sig: sig.to_string(),
            });
        }
        let id = MethodId(self.methods.len() as u32);
        class_entry.methods.insert(sig.clone(), id);
        self.methods.push(Method {
            class,
            sig,
            is_abstract,
            body,
        });
        Ok(id)
    }

    /// # Panics
    ///
    /// Panics if `id` was not produced by this program.
    #[inline]
    #[must_use]
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.idx()]
    }

    /// # Panics
    ///
    /// Panics if `id` was not produced by this program.
    #[inline]
    #[must_use]
    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.idx()]
    }

    #[must_use]
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// The method `class` itself declares under `sig`, ignoring
    /// inherited declarations.
    #[must_use]
    pub fn declared_method(&self, class: ClassId, sig: &Signature) -> Option<MethodId> {
        self.classes
            .get(class.idx())
            .and_then(|c| c.methods.get(sig))
            .copied()
    }

    pub fn iter_classes(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassId(i as u32), c))
    }

    pub fn iter_methods(&self) -> impl Iterator<Item = (MethodId, &Method)> {
        self.methods
            .iter()
            .enumerate()
            .map(|(i, m)| (MethodId(i as u32), m))
    }

    #[must_use]
    pub fn nb_classes(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn nb_methods(&self) -> usize {
        self.methods.len()
    }

    /// Human-readable `Class.sig` label for diagnostics and dot output.
    #[must_use]
    pub fn method_label(&self, id: MethodId) -> String {
        let m = self.method(id);
        format!("{}.{}", self.class(m.class).name(), m.sig())
    }
}
