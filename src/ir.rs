//! Method body intermediate representation.
//!
//! Statements and expressions are closed sum types so that transfer
//! functions and the reachability explorer can match exhaustively.
//! A [`Body`] is a flat statement table; [`StmtId`] is the program-order
//! index of a statement and the node identity used by every solver.

use crate::program::{ClassId, Signature};
use serde::Serialize;
use std::fmt;

/// Method-local storage slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VarId(pub u32);

impl VarId {
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Program-order index of a statement inside a [`Body`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StmtId(pub u32);

impl StmtId {
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Int,
    Boolean,
    Byte,
    Short,
    Char,
    Long,
    Float,
    Double,
    Reference,
}

impl VarType {
    /// True for the types whose values fit the constant-propagation
    /// integer domain (Java widening to `int`).
    #[must_use]
    pub const fn can_hold_int(self) -> bool {
        matches!(
            self,
            Self::Int | Self::Boolean | Self::Byte | Self::Short | Self::Char
        )
    }
}

#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub ty: VarType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitwiseOp {
    Or,
    And,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    Shr,
    Ushr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arith(ArithOp),
    Bitwise(BitwiseOp),
    Cond(CondOp),
    Shift(ShiftOp),
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let op = match self {
            Self::Arith(ArithOp::Add) => "+",
            Self::Arith(ArithOp::Sub) => "-",
            Self::Arith(ArithOp::Mul) => "*",
            Self::Arith(ArithOp::Div) => "/",
            Self::Arith(ArithOp::Rem) => "%",
            Self::Bitwise(BitwiseOp::Or) => "|",
            Self::Bitwise(BitwiseOp::And) => "&",
            Self::Bitwise(BitwiseOp::Xor) => "^",
            Self::Cond(CondOp::Eq) => "==",
            Self::Cond(CondOp::Ne) => "!=",
            Self::Cond(CondOp::Lt) => "<",
            Self::Cond(CondOp::Gt) => ">",
            Self::Cond(CondOp::Le) => "<=",
            Self::Cond(CondOp::Ge) => ">=",
            Self::Shift(ShiftOp::Shl) => "<<",
            Self::Shift(ShiftOp::Shr) => ">>",
            Self::Shift(ShiftOp::Ushr) => ">>>",
        };
        write!(f, "{op}")
    }
}

/// Right-hand side expression of an assignment or an `if` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exp {
    IntLiteral(i32),
    Var(VarId),
    Binary { op: BinaryOp, lhs: VarId, rhs: VarId },
    New(String),
    Cast(VarId),
    FieldAccess(String),
    ArrayAccess(VarId),
}

impl Exp {
    pub(crate) fn uses(&self) -> Vec<VarId> {
        match self {
            Self::IntLiteral(_) | Self::New(_) | Self::FieldAccess(_) => Vec::new(),
            Self::Var(v) | Self::Cast(v) | Self::ArrayAccess(v) => vec![*v],
            Self::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        }
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::IntLiteral(n) => write!(f, "{n}"),
            Self::Var(v) => write!(f, "{v}"),
            Self::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Self::New(cl) => write!(f, "new {cl}"),
            Self::Cast(v) => write!(f, "(cast) {v}"),
            Self::FieldAccess(field) => write!(f, "{field}"),
            Self::ArrayAccess(v) => write!(f, "{v}[..]"),
        }
    }
}

/// Method dispatch kind of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CallKind {
    Static,
    Special,
    Virtual,
    Interface,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Special => write!(f, "special"),
            Self::Virtual => write!(f, "virtual"),
            Self::Interface => write!(f, "interface"),
        }
    }
}

/// A call expression: dispatch kind, statically declared class,
/// target signature and actual arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallExp {
    pub kind: CallKind,
    pub class: ClassId,
    pub sig: Signature,
    pub args: Vec<VarId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// Also used for the synthetic entry/exit program points.
    Nop,
    Assign { lhs: VarId, rhs: Exp },
    If { cond: Exp },
    Switch { var: VarId },
    Invoke { result: Option<VarId>, call: CallExp },
    Return { var: Option<VarId> },
    Goto,
}

impl Stmt {
    /// The variable this statement defines, if any.
    #[must_use]
    pub fn def(&self) -> Option<VarId> {
        match self {
            Self::Assign { lhs, .. } => Some(*lhs),
            Self::Invoke { result, .. } => *result,
            _ => None,
        }
    }

    /// The variables this statement reads.
    #[must_use]
    pub fn uses(&self) -> Vec<VarId> {
        match self {
            Self::Nop | Self::Goto => Vec::new(),
            Self::Assign { rhs, .. } => rhs.uses(),
            Self::If { cond } => cond.uses(),
            Self::Switch { var } => vec![*var],
            Self::Invoke { call, .. } => call.args.clone(),
            Self::Return { var } => var.iter().copied().collect(),
        }
    }

    /// Whether execution can continue at the lexically next statement.
    /// Used by dead-code detection to chain switch cases.
    #[must_use]
    pub fn can_fall_through(&self) -> bool {
        !matches!(self, Self::Goto | Self::Return { .. })
    }

    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self, Self::Invoke { .. })
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nop => write!(f, "nop"),
            Self::Assign { lhs, rhs } => write!(f, "{lhs} = {rhs}"),
            Self::If { cond } => write!(f, "if ({cond})"),
            Self::Switch { var } => write!(f, "switch ({var})"),
            Self::Invoke { result, call } => {
                if let Some(r) = result {
                    write!(f, "{r} = ")?;
                }
                write!(f, "invoke-{} {}(", call.kind, call.sig)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Return { var: Some(v) } => write!(f, "return {v}"),
            Self::Return { var: None } => write!(f, "return"),
            Self::Goto => write!(f, "goto"),
        }
    }
}

/// A method body: variable table, parameters, and the statement table in
/// program order, closed by synthetic entry/exit program points.
#[derive(Debug, Clone)]
pub struct Body {
    vars: Vec<VarInfo>,
    params: Vec<VarId>,
    stmts: Vec<Stmt>,
    entry: StmtId,
    exit: StmtId,
}

impl Body {
    #[must_use]
    pub fn builder() -> BodyBuilder {
        BodyBuilder::default()
    }

    #[inline]
    #[must_use]
    pub fn entry(&self) -> StmtId {
        self.entry
    }

    #[inline]
    #[must_use]
    pub fn exit(&self) -> StmtId {
        self.exit
    }

    #[inline]
    pub fn params(&self) -> &[VarId] {
        &self.params
    }

    #[must_use]
    pub fn nb_stmts(&self) -> usize {
        self.stmts.len()
    }

    #[must_use]
    pub fn nb_vars(&self) -> usize {
        self.vars.len()
    }

    pub(crate) fn contains_stmt(&self, id: StmtId) -> bool {
        id.idx() < self.stmts.len()
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this body. Solvers validate
    /// their graph against the body before indexing into it.
    #[inline]
    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.idx()]
    }

    #[inline]
    #[must_use]
    pub fn var_type(&self, v: VarId) -> VarType {
        self.vars[v.idx()].ty
    }

    #[inline]
    #[must_use]
    pub fn var_name(&self, v: VarId) -> &str {
        &self.vars[v.idx()].name
    }

    pub fn iter_stmts(&self) -> impl Iterator<Item = (StmtId, &Stmt)> {
        self.stmts
            .iter()
            .enumerate()
            .map(|(i, s)| (StmtId(i as u32), s))
    }

    /// Variables returned by the `Return` statements of this body.
    #[must_use]
    pub fn return_vars(&self) -> Vec<VarId> {
        self.stmts
            .iter()
            .filter_map(|s| match s {
                Stmt::Return { var } => *var,
                _ => None,
            })
            .collect()
    }
}

/// Incremental [`Body`] construction; `build` appends the synthetic
/// entry and exit points.
#[derive(Debug, Default)]
pub struct BodyBuilder {
    vars: Vec<VarInfo>,
    params: Vec<VarId>,
    stmts: Vec<Stmt>,
}

impl BodyBuilder {
    pub fn var(&mut self, name: &str, ty: VarType) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarInfo {
            name: name.to_string(),
            ty,
        });
        id
    }

    pub fn param(&mut self, name: &str, ty: VarType) -> VarId {
        let id = self.var(name, ty);
        self.params.push(id);
        id
    }

    pub fn stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    #[must_use]
    pub fn build(mut self) -> Body {
        let entry = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt::Nop);
        let exit = StmtId(self.stmts.len() as u32);
        self.stmts.push(Stmt::Nop);
        Body {
            vars: self.vars,
            params: self.params,
            stmts: self.stmts,
            entry,
            exit,
        }
    }
}
