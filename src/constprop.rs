//! Constant propagation for integer-width variables.
//!
//! The fact domain is the flat lattice Undef ⊑ Const(n) ⊑ NAC over a
//! per-variable map; absent bindings read as Undef. Only variables
//! whose type can hold an `int` participate, everything else evaluates
//! to NAC.

use crate::dataflow::DataflowAnalysis;
use crate::ir::{ArithOp, BinaryOp, Body, CondOp, Exp, ShiftOp, Stmt, StmtId, VarId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Abstract value of one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Value {
    /// No information yet: the variable has no reaching definition
    /// under currently known inputs.
    Undef,
    Const(i32),
    /// Provably not a single constant.
    Nac,
}

impl Value {
    #[must_use]
    pub const fn is_constant(self) -> bool {
        matches!(self, Self::Const(_))
    }

    #[must_use]
    pub const fn as_constant(self) -> Option<i32> {
        match self {
            Self::Const(n) => Some(n),
            _ => None,
        }
    }

    /// NAC absorbs, Undef is neutral, distinct constants clash to NAC.
    #[must_use]
    pub fn meet(self, other: Self) -> Self {
        match (self, other) {
            (Self::Nac, _) | (_, Self::Nac) => Self::Nac,
            (Self::Undef, v) | (v, Self::Undef) => v,
            (Self::Const(a), Self::Const(b)) if a == b => Self::Const(a),
            _ => Self::Nac,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Undef => write!(f, "UNDEF"),
            Self::Const(n) => write!(f, "{n}"),
            Self::Nac => write!(f, "NAC"),
        }
    }
}

/// Variable-to-value map; keys absent from the map are implicitly
/// [`Value::Undef`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpFact(BTreeMap<VarId, Value>);

impl CpFact {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, var: VarId) -> Value {
        self.0.get(&var).copied().unwrap_or(Value::Undef)
    }

    /// Binds `var` to `value`; binding Undef removes the entry so the
    /// map never stores the implicit bottom.
    pub fn update(&mut self, var: VarId, value: Value) {
        if value == Value::Undef {
            self.0.remove(&var);
        } else {
            self.0.insert(var, value);
        }
    }

    pub fn remove(&mut self, var: VarId) {
        self.0.remove(&var);
    }

    pub fn iter(&self) -> impl Iterator<Item = (VarId, Value)> + '_ {
        self.0.iter().map(|(v, val)| (*v, *val))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CpFact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (var, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Intraprocedural constant propagation over one method body.
#[derive(Debug)]
pub struct ConstantPropagation<'a> {
    body: &'a Body,
}

impl<'a> ConstantPropagation<'a> {
    #[must_use]
    pub fn new(body: &'a Body) -> Self {
        Self { body }
    }
}

impl DataflowAnalysis for ConstantPropagation<'_> {
    type Fact = CpFact;

    fn is_forward(&self) -> bool {
        true
    }

    /// Parameters that can hold an `int` are unknown at entry, hence
    /// NAC; other parameters never enter the domain.
    fn new_boundary_fact(&self) -> CpFact {
        let mut fact = CpFact::new();
        for &param in self.body.params() {
            if self.body.var_type(param).can_hold_int() {
                fact.update(param, Value::Nac);
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

    fn transfer_node(&self, stmt: StmtId, input: &CpFact, output: &mut CpFact) -> bool {
        let new_out = transfer_stmt(self.body, stmt, input);
        let changed = new_out != *output;
        *output = new_out;
        changed
    }
}

pub(crate) fn transfer_stmt(body: &Body, stmt: StmtId, input: &CpFact) -> CpFact {
    let mut out = input.clone();
    match body.stmt(stmt) {
        Stmt::Assign { lhs, rhs } if body.var_type(*lhs).can_hold_int() => {
            out.remove(*lhs);
            out.update(*lhs, evaluate(rhs, input, body));
        }
        // The result of a call is unknown intraprocedurally.
        Stmt::Invoke {
            result: Some(r), ..
        } if body.var_type(*r).can_hold_int() => {
            out.update(*r, Value::Nac);
        }
        _ => (),
    }
    out
}

/// Evaluates `exp` under the `fact` reaching it.
///
/// Division or remainder by a constant zero yields Undef, not NAC: no
/// value reaches past that operation under currently known inputs,
/// which is what lets unreachable-branch reasoning treat it specially.
#[must_use]
pub fn evaluate(exp: &Exp, fact: &CpFact, body: &Body) -> Value {
    match exp {
        Exp::IntLiteral(n) => Value::Const(*n),
        Exp::Var(v) => {
            if body.var_type(*v).can_hold_int() {
                fact.get(*v)
            } else {
                Value::Nac
            }
        }
        Exp::Binary { op, lhs, rhs } => {
            if !body.var_type(*lhs).can_hold_int() || !body.var_type(*rhs).can_hold_int() {
                return Value::Nac;
            }
            match (fact.get(*lhs), fact.get(*rhs)) {
                (Value::Undef, Value::Undef) => Value::Undef,
                (Value::Const(a), Value::Const(b)) => const_binary(*op, a, b),
                _ => Value::Nac,
            }
        }
        Exp::New(_) | Exp::Cast(_) | Exp::FieldAccess(_) | Exp::ArrayAccess(_) => Value::Nac,
    }
}

/// Java `int` semantics: wrapping arithmetic, shift distance masked to
/// the low 5 bits, `>>>` shifts the bit pattern.
fn const_binary(op: BinaryOp, a: i32, b: i32) -> Value {
    match op {
        BinaryOp::Arith(arith) => match arith {
            ArithOp::Add => Value::Const(a.wrapping_add(b)),
            ArithOp::Sub => Value::Const(a.wrapping_sub(b)),
            ArithOp::Mul => Value::Const(a.wrapping_mul(b)),
            ArithOp::Div => {
                if b == 0 {
                    Value::Undef
                } else {
                    Value::Const(a.wrapping_div(b))
                }
            }
            ArithOp::Rem => {
                if b == 0 {
                    Value::Undef
                } else {
                    Value::Const(a.wrapping_rem(b))
                }
            }
        },
        BinaryOp::Bitwise(bitwise) => match bitwise {
            crate::ir::BitwiseOp::Or => Value::Const(a | b),
            crate::ir::BitwiseOp::And => Value::Const(a & b),
            crate::ir::BitwiseOp::Xor => Value::Const(a ^ b),
        },
        BinaryOp::Cond(cond) => {
            let holds = match cond {
                CondOp::Eq => a == b,
                CondOp::Ne => a != b,
                CondOp::Lt => a < b,
                CondOp::Gt => a > b,
                CondOp::Le => a <= b,
                CondOp::Ge => a >= b,
            };
            Value::Const(i32::from(holds))
        }
        BinaryOp::Shift(shift) => match shift {
            ShiftOp::Shl => Value::Const(a.wrapping_shl(b as u32)),
            ShiftOp::Shr => Value::Const(a.wrapping_shr(b as u32)),
            ShiftOp::Ushr => Value::Const(((a as u32) >> (b as u32 & 31)) as i32),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BitwiseOp, VarType};

    #[test]
    fn meet_laws() {
        let values = [Value::Undef, Value::Const(1), Value::Const(2), Value::Nac];
        for a in values {
            for b in values {
                // commutativity
                assert_eq!(a.meet(b), b.meet(a));
                // idempotence of the folded result
                assert_eq!(a.meet(a.meet(b)), a.meet(b));
            }
            assert_eq!(a.meet(Value::Nac), Value::Nac);
            assert_eq!(Value::Undef.meet(a), a);
        }
        assert_eq!(Value::Const(1).meet(Value::Const(1)), Value::Const(1));
        assert_eq!(Value::Const(1).meet(Value::Const(2)), Value::Nac);
    }

    fn body_xy() -> (Body, VarId, VarId) {
        let mut b = Body::builder();
        let x = b.var("x", VarType::Int);
        let y = b.var("y", VarType::Int);
        (b.build(), x, y)
    }

    fn bin(op: BinaryOp, lhs: VarId, rhs: VarId) -> Exp {
        Exp::Binary { op, lhs, rhs }
    }

    #[test]
    fn evaluate_literal_and_var() {
        let (body, x, _) = body_xy();
        let mut fact = CpFact::new();
        fact.update(x, Value::Const(7));
        assert_eq!(
            evaluate(&Exp::IntLiteral(5), &fact, &body),
            Value::Const(5)
        );
        assert_eq!(evaluate(&Exp::Var(x), &fact, &body), Value::Const(7));
    }

    #[test]
    fn evaluate_arithmetic() {
        let (body, x, y) = body_xy();
        let mut fact = CpFact::new();
        fact.update(x, Value::Const(2));
        fact.update(y, Value::Const(3));
        assert_eq!(
            evaluate(&bin(BinaryOp::Arith(ArithOp::Add), x, y), &fact, &body),
            Value::Const(5)
        );
        assert_eq!(
            evaluate(&bin(BinaryOp::Arith(ArithOp::Mul), x, y), &fact, &body),
            Value::Const(6)
        );
    }

    #[test]
    fn division_by_constant_zero_is_undef() {
        let (body, x, y) = body_xy();
        let mut fact = CpFact::new();
        fact.update(x, Value::Const(4));
        fact.update(y, Value::Const(0));
        assert_eq!(
            evaluate(&bin(BinaryOp::Arith(ArithOp::Div), x, y), &fact, &body),
            Value::Undef
        );
        assert_eq!(
            evaluate(&bin(BinaryOp::Arith(ArithOp::Rem), x, y), &fact, &body),
            Value::Undef
        );
    }

    #[test]
    fn nac_operand_poisons() {
        let (body, x, y) = body_xy();
        let mut fact = CpFact::new();
        fact.update(x, Value::Const(2));
        fact.update(y, Value::Nac);
        assert_eq!(
            evaluate(&bin(BinaryOp::Arith(ArithOp::Add), x, y), &fact, &body),
            Value::Nac
        );
    }

    #[test]
    fn undef_operands() {
        let (body, x, y) = body_xy();
        let empty = CpFact::new();
        // both undefined: still undefined
        assert_eq!(
            evaluate(&bin(BinaryOp::Arith(ArithOp::Add), x, y), &empty, &body),
            Value::Undef
        );
        // one undefined, one constant: NAC
        let mut fact = CpFact::new();
        fact.update(x, Value::Const(2));
        assert_eq!(
            evaluate(&bin(BinaryOp::Arith(ArithOp::Add), x, y), &fact, &body),
            Value::Nac
        );
    }

    #[test]
    fn conditions_produce_zero_or_one() {
        let (body, x, y) = body_xy();
        let mut fact = CpFact::new();
        fact.update(x, Value::Const(1));
        fact.update(y, Value::Const(2));
        assert_eq!(
            evaluate(&bin(BinaryOp::Cond(CondOp::Lt), x, y), &fact, &body),
            Value::Const(1)
        );
        assert_eq!(
            evaluate(&bin(BinaryOp::Cond(CondOp::Eq), x, y), &fact, &body),
            Value::Const(0)
        );
    }

    #[test]
    fn bitwise_and_shift() {
        let (body, x, y) = body_xy();
        let mut fact = CpFact::new();
        fact.update(x, Value::Const(-8));
        fact.update(y, Value::Const(1));
        assert_eq!(
            evaluate(&bin(BinaryOp::Shift(ShiftOp::Shr), x, y), &fact, &body),
            Value::Const(-4)
        );
        assert_eq!(
            evaluate(&bin(BinaryOp::Shift(ShiftOp::Ushr), x, y), &fact, &body),
            Value::Const(0x7fff_fffc)
        );
        fact.update(x, Value::Const(0b1100));
        fact.update(y, Value::Const(0b1010));
        assert_eq!(
            evaluate(&bin(BinaryOp::Bitwise(BitwiseOp::And), x, y), &fact, &body),
            Value::Const(0b1000)
        );
    }

    #[test]
    fn non_liftable_operand_is_nac() {
        let mut b = Body::builder();
        let x = b.var("x", VarType::Int);
        let f = b.var("f", VarType::Float);
        let body = b.build();
        let mut fact = CpFact::new();
        fact.update(x, Value::Const(1));
        assert_eq!(
            evaluate(&bin(BinaryOp::Arith(ArithOp::Add), x, f), &fact, &body),
            Value::Nac
        );
        assert_eq!(evaluate(&Exp::Var(f), &fact, &body), Value::Nac);
    }

    #[test]
    fn transfer_replaces_old_binding() {
        let mut b = Body::builder();
        let x = b.var("x", VarType::Int);
        let s = b.stmt(Stmt::Assign {
            lhs: x,
            rhs: Exp::IntLiteral(3),
        });
        let body = b.build();
        let cp = ConstantPropagation::new(&body);
        let mut input = CpFact::new();
        input.update(x, Value::Const(1));
        let mut output = CpFact::new();
        assert!(cp.transfer_node(s, &input, &mut output));
        assert_eq!(output.get(x), Value::Const(3));
        // same input again: no change
        assert!(!cp.transfer_node(s, &input, &mut output));
    }

    #[test]
    fn boundary_fact_seeds_liftable_params_only() {
        let mut b = Body::builder();
        let x = b.param("x", VarType::Int);
        let o = b.param("o", VarType::Reference);
        let body = b.build();
        let cp = ConstantPropagation::new(&body);
        let boundary = cp.new_boundary_fact();
        assert_eq!(boundary.get(x), Value::Nac);
        assert_eq!(boundary.get(o), Value::Undef);
    }
}
