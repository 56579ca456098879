//! Terms of the SMT layer
//!
//! Terms are immutable trees with `Arc`-shared children. Constructors that
//! depend on operand sorts are checked and return [`FormulaResult`]; the
//! boolean connectives accept any boolean term and never fail. All
//! constructors fold literal operands so that encodings of concrete offsets
//! stay small.

// These constructors build AST nodes, not perform operations.
// Implementing std::ops traits would be semantically incorrect.
#![allow(clippy::should_implement_trait)]

use crate::error::{FormulaError, FormulaResult};
use crate::sort::{Sort, MAX_BV_WIDTH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Separator between a symbol name and its SSA index
pub const SSA_SEPARATOR: char = '@';

/// Name of version `index` of symbol `name`
pub fn ssa_name(name: &str, index: u32) -> String {
    format!("{name}{SSA_SEPARATOR}{index}")
}

/// Split an SSA-indexed name into base name and index
pub fn parse_ssa_name(name: &str) -> Option<(&str, u32)> {
    let (base, index) = name.rsplit_once(SSA_SEPARATOR)?;
    Some((base, index.parse().ok()?))
}

/// All-ones mask for a bitvector width
pub(crate) fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Interpret the low `width` bits of `value` as a two's complement number
pub(crate) fn to_signed(value: u128, width: u32) -> i128 {
    if width == 0 {
        return 0;
    }
    if width >= 128 {
        return value as i128;
    }
    let value = value & mask(width);
    if (value >> (width - 1)) & 1 == 1 {
        (value | !mask(width)) as i128
    } else {
        value as i128
    }
}

/// A sorted symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Var {
    pub name: String,
    pub sort: Sort,
}

impl Var {
    pub fn new(name: impl Into<String>, sort: Sort) -> Self {
        Self {
            name: name.into(),
            sort,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_symbol(f, &self.name)
    }
}

/// Operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    // Boolean operations
    Not,
    And,
    Or,
    Implies,
    Eq,
    Ite,

    // Integer arithmetic
    Add,
    Sub,
    Mul,
    Lt,
    Le,

    // Bitvector arithmetic
    BvAdd,
    BvSub,
    BvMul,
    BvUDiv,
    BvSDiv,
    BvURem,
    BvSRem,
    BvAnd,
    BvOr,
    BvXor,
    BvNot,
    BvNeg,
    BvShl,
    BvLShr,
    BvAShr,

    // Bitvector comparisons
    BvUlt,
    BvUle,
    BvSlt,
    BvSle,

    // Bitvector structure
    Concat,
    /// extract bits hi..=lo
    Extract(u32, u32),
    ZeroExtend(u32),
    SignExtend(u32),

    // Array operations
    /// select(arr, idx) - read from array
    Select,
    /// store(arr, idx, val) - write to array
    Store,
}

impl Op {
    fn smt_name(&self) -> &'static str {
        match self {
            Op::Not => "not",
            Op::And => "and",
            Op::Or => "or",
            Op::Implies => "=>",
            Op::Eq => "=",
            Op::Ite => "ite",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::BvAdd => "bvadd",
            Op::BvSub => "bvsub",
            Op::BvMul => "bvmul",
            Op::BvUDiv => "bvudiv",
            Op::BvSDiv => "bvsdiv",
            Op::BvURem => "bvurem",
            Op::BvSRem => "bvsrem",
            Op::BvAnd => "bvand",
            Op::BvOr => "bvor",
            Op::BvXor => "bvxor",
            Op::BvNot => "bvnot",
            Op::BvNeg => "bvneg",
            Op::BvShl => "bvshl",
            Op::BvLShr => "bvlshr",
            Op::BvAShr => "bvashr",
            Op::BvUlt => "bvult",
            Op::BvUle => "bvule",
            Op::BvSlt => "bvslt",
            Op::BvSle => "bvsle",
            Op::Concat => "concat",
            Op::Extract(..) => "extract",
            Op::ZeroExtend(_) => "zero_extend",
            Op::SignExtend(_) => "sign_extend",
            Op::Select => "select",
            Op::Store => "store",
        }
    }

    fn is_bv_binary(&self) -> bool {
        matches!(
            self,
            Op::BvAdd
                | Op::BvSub
                | Op::BvMul
                | Op::BvUDiv
                | Op::BvSDiv
                | Op::BvURem
                | Op::BvSRem
                | Op::BvAnd
                | Op::BvOr
                | Op::BvXor
                | Op::BvShl
                | Op::BvLShr
                | Op::BvAShr
        )
    }

    fn is_bv_predicate(&self) -> bool {
        matches!(self, Op::BvUlt | Op::BvUle | Op::BvSlt | Op::BvSle)
    }
}

/// Concrete semantics of binary bitvector operators (SMT-LIB conventions for
/// division by zero)
pub(crate) fn apply_bv_binary(op: Op, a: u128, b: u128, width: u32) -> Option<u128> {
    let m = mask(width);
    let (a, b) = (a & m, b & m);
    let r = match op {
        Op::BvAdd => a.wrapping_add(b),
        Op::BvSub => a.wrapping_sub(b),
        Op::BvMul => a.wrapping_mul(b),
        Op::BvUDiv => {
            if b == 0 {
                m
            } else {
                a / b
            }
        }
        Op::BvURem => {
            if b == 0 {
                a
            } else {
                a % b
            }
        }
        Op::BvSDiv => {
            let (sa, sb) = (to_signed(a, width), to_signed(b, width));
            if sb == 0 {
                if sa < 0 {
                    1
                } else {
                    m
                }
            } else {
                sa.wrapping_div(sb) as u128
            }
        }
        Op::BvSRem => {
            let (sa, sb) = (to_signed(a, width), to_signed(b, width));
            if sb == 0 {
                a
            } else {
                sa.wrapping_rem(sb) as u128
            }
        }
        Op::BvAnd => a & b,
        Op::BvOr => a | b,
        Op::BvXor => a ^ b,
        Op::BvShl => {
            if b >= width as u128 {
                0
            } else {
                a << b
            }
        }
        Op::BvLShr => {
            if b >= width as u128 {
                0
            } else {
                a >> b
            }
        }
        Op::BvAShr => {
            let sa = to_signed(a, width);
            if b >= width as u128 {
                if sa < 0 {
                    m
                } else {
                    0
                }
            } else {
                (sa >> b) as u128
            }
        }
        _ => return None,
    };
    Some(r & m)
}

/// Concrete semantics of bitvector comparisons
pub(crate) fn apply_bv_predicate(op: Op, a: u128, b: u128, width: u32) -> Option<bool> {
    let m = mask(width);
    let (a, b) = (a & m, b & m);
    Some(match op {
        Op::BvUlt => a < b,
        Op::BvUle => a <= b,
        Op::BvSlt => to_signed(a, width) < to_signed(b, width),
        Op::BvSle => to_signed(a, width) <= to_signed(b, width),
        _ => return None,
    })
}

/// A term
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// Boolean constant
    Bool(bool),
    /// Integer constant
    Int(i64),
    /// Bitvector constant (value, width); the value is kept masked
    BitVec(u128, u32),
    /// Symbol reference
    Var(Var),
    /// Operation application
    Op(Op, Vec<Arc<Term>>),
    /// Application of an uninterpreted function with result sort `sort`
    App {
        name: String,
        sort: Sort,
        args: Vec<Arc<Term>>,
    },
}

fn mismatch(op: &'static str, expected: impl fmt::Display, actual: &Sort) -> FormulaError {
    FormulaError::SortMismatch {
        op,
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn bv_width_of(op: &'static str, t: &Term) -> FormulaResult<u32> {
    match t.sort() {
        Sort::BitVec(w) => Ok(w),
        other => Err(mismatch(op, "bitvector", &other)),
    }
}

impl Term {
    // Convenience constructors

    pub fn bool_const(b: bool) -> Self {
        Term::Bool(b)
    }

    pub fn int(n: i64) -> Self {
        Term::Int(n)
    }

    /// Bitvector literal; negative values are taken in two's complement
    pub fn bv(value: i128, width: u32) -> Self {
        Term::BitVec((value as u128) & mask(width), width)
    }

    pub fn var(name: impl Into<String>, sort: Sort) -> Self {
        Term::Var(Var::new(name, sort))
    }

    /// Version `index` of symbol `name`
    pub fn ssa_var(name: &str, index: u32, sort: Sort) -> Self {
        Term::var(ssa_name(name, index), sort)
    }

    /// Numeric literal of an integer or bitvector sort
    pub fn number(sort: &Sort, value: i128) -> FormulaResult<Self> {
        match sort {
            Sort::Int => i64::try_from(value)
                .map(Term::Int)
                .map_err(|_| FormulaError::Unsupported(format!("integer literal {value}"))),
            Sort::BitVec(w) => Ok(Term::bv(value, *w)),
            other => Err(mismatch("number", "Int or bitvector", other)),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Term::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Literal value and width of a bitvector constant
    pub fn as_bv(&self) -> Option<(u128, u32)> {
        match self {
            Term::BitVec(v, w) => Some((*v, *w)),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Term::Bool(true))
    }

    pub fn not(e: Term) -> Self {
        match e {
            Term::Bool(b) => Term::Bool(!b),
            // Double negation elimination: NOT(NOT(x)) = x
            Term::Op(Op::Not, ref args) if args.len() == 1 => (*args[0]).clone(),
            e => Term::Op(Op::Not, vec![Arc::new(e)]),
        }
    }

    /// Conjunction of all terms; `true` when empty
    pub fn and_all(terms: impl IntoIterator<Item = Term>) -> Self {
        let mut args = Vec::new();
        for t in terms {
            match t {
                Term::Bool(true) => {}
                Term::Bool(false) => return Term::Bool(false),
                Term::Op(Op::And, nested) => args.extend(nested),
                t => args.push(Arc::new(t)),
            }
        }
        match args.len() {
            0 => Term::Bool(true),
            1 => (*args[0]).clone(),
            _ => Term::Op(Op::And, args),
        }
    }

    /// Disjunction of all terms; `false` when empty
    pub fn or_all(terms: impl IntoIterator<Item = Term>) -> Self {
        let mut args = Vec::new();
        for t in terms {
            match t {
                Term::Bool(false) => {}
                Term::Bool(true) => return Term::Bool(true),
                Term::Op(Op::Or, nested) => args.extend(nested),
                t => args.push(Arc::new(t)),
            }
        }
        match args.len() {
            0 => Term::Bool(false),
            1 => (*args[0]).clone(),
            _ => Term::Op(Op::Or, args),
        }
    }

    pub fn and(a: Term, b: Term) -> Self {
        Term::and_all([a, b])
    }

    pub fn or(a: Term, b: Term) -> Self {
        Term::or_all([a, b])
    }

    pub fn implies(a: Term, b: Term) -> Self {
        match (&a, &b) {
            (Term::Bool(false), _) | (_, Term::Bool(true)) => Term::Bool(true),
            (Term::Bool(true), _) => b,
            _ => Term::Op(Op::Implies, vec![Arc::new(a), Arc::new(b)]),
        }
    }

    /// Equality of two terms of the same sort
    pub fn eq(a: Term, b: Term) -> FormulaResult<Self> {
        let (sa, sb) = (a.sort(), b.sort());
        if sa != sb {
            return Err(mismatch("=", &sa, &sb));
        }
        if a == b {
            return Ok(Term::Bool(true));
        }
        match (&a, &b) {
            (Term::Bool(_), Term::Bool(_))
            | (Term::Int(_), Term::Int(_))
            | (Term::BitVec(..), Term::BitVec(..)) => Ok(Term::Bool(false)),
            _ => Ok(Term::Op(Op::Eq, vec![Arc::new(a), Arc::new(b)])),
        }
    }

    pub fn ite(cond: Term, then_: Term, else_: Term) -> FormulaResult<Self> {
        let sc = cond.sort();
        if sc != Sort::Bool {
            return Err(mismatch("ite", Sort::Bool, &sc));
        }
        let (st, se) = (then_.sort(), else_.sort());
        if st != se {
            return Err(mismatch("ite", &st, &se));
        }
        Ok(match cond {
            Term::Bool(true) => then_,
            Term::Bool(false) => else_,
            _ if then_ == else_ => then_,
            cond => Term::Op(Op::Ite, vec![Arc::new(cond), Arc::new(then_), Arc::new(else_)]),
        })
    }

    fn int_binary(op: Op, a: Term, b: Term) -> FormulaResult<Self> {
        for t in [&a, &b] {
            let s = t.sort();
            if s != Sort::Int {
                return Err(mismatch(op.smt_name(), Sort::Int, &s));
            }
        }
        if let (Term::Int(x), Term::Int(y)) = (&a, &b) {
            let folded = match op {
                Op::Add => x.checked_add(*y).map(Term::Int),
                Op::Sub => x.checked_sub(*y).map(Term::Int),
                Op::Mul => x.checked_mul(*y).map(Term::Int),
                Op::Lt => Some(Term::Bool(x < y)),
                Op::Le => Some(Term::Bool(x <= y)),
                _ => None,
            };
            if let Some(t) = folded {
                return Ok(t);
            }
        }
        if matches!(op, Op::Add | Op::Sub) && b == Term::Int(0) {
            return Ok(a);
        }
        Ok(Term::Op(op, vec![Arc::new(a), Arc::new(b)]))
    }

    fn bv_binary(op: Op, a: Term, b: Term) -> FormulaResult<Self> {
        let wa = bv_width_of(op.smt_name(), &a)?;
        let wb = bv_width_of(op.smt_name(), &b)?;
        if wa != wb {
            return Err(mismatch(op.smt_name(), Sort::BitVec(wa), &Sort::BitVec(wb)));
        }
        if let (Term::BitVec(x, _), Term::BitVec(y, _)) = (&a, &b) {
            if op.is_bv_binary() {
                if let Some(v) = apply_bv_binary(op, *x, *y, wa) {
                    return Ok(Term::BitVec(v, wa));
                }
            }
            if op.is_bv_predicate() {
                if let Some(r) = apply_bv_predicate(op, *x, *y, wa) {
                    return Ok(Term::Bool(r));
                }
            }
        }
        if matches!(op, Op::BvAdd | Op::BvSub) && matches!(b, Term::BitVec(0, _)) {
            return Ok(a);
        }
        Ok(Term::Op(op, vec![Arc::new(a), Arc::new(b)]))
    }

    pub fn int_add(a: Term, b: Term) -> FormulaResult<Self> {
        Self::int_binary(Op::Add, a, b)
    }

    pub fn int_sub(a: Term, b: Term) -> FormulaResult<Self> {
        Self::int_binary(Op::Sub, a, b)
    }

    pub fn int_lt(a: Term, b: Term) -> FormulaResult<Self> {
        Self::int_binary(Op::Lt, a, b)
    }

    pub fn int_le(a: Term, b: Term) -> FormulaResult<Self> {
        Self::int_binary(Op::Le, a, b)
    }

    pub fn bv_add(a: Term, b: Term) -> FormulaResult<Self> {
        Self::bv_binary(Op::BvAdd, a, b)
    }

    pub fn bv_sub(a: Term, b: Term) -> FormulaResult<Self> {
        Self::bv_binary(Op::BvSub, a, b)
    }

    pub fn bv_mul(a: Term, b: Term) -> FormulaResult<Self> {
        Self::bv_binary(Op::BvMul, a, b)
    }

    /// Division; `signed` selects bvsdiv over bvudiv
    pub fn bv_div(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        Self::bv_binary(if signed { Op::BvSDiv } else { Op::BvUDiv }, a, b)
    }

    pub fn bv_rem(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        Self::bv_binary(if signed { Op::BvSRem } else { Op::BvURem }, a, b)
    }

    pub fn bv_and(a: Term, b: Term) -> FormulaResult<Self> {
        Self::bv_binary(Op::BvAnd, a, b)
    }

    pub fn bv_or(a: Term, b: Term) -> FormulaResult<Self> {
        Self::bv_binary(Op::BvOr, a, b)
    }

    pub fn bv_xor(a: Term, b: Term) -> FormulaResult<Self> {
        Self::bv_binary(Op::BvXor, a, b)
    }

    pub fn bv_shl(a: Term, b: Term) -> FormulaResult<Self> {
        Self::bv_binary(Op::BvShl, a, b)
    }

    /// Right shift; arithmetic when `signed`
    pub fn bv_shr(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        Self::bv_binary(if signed { Op::BvAShr } else { Op::BvLShr }, a, b)
    }

    pub fn bv_lt(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        Self::bv_binary(if signed { Op::BvSlt } else { Op::BvUlt }, a, b)
    }

    pub fn bv_le(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        Self::bv_binary(if signed { Op::BvSle } else { Op::BvUle }, a, b)
    }

    fn bv_unary(op: Op, a: Term) -> FormulaResult<Self> {
        let w = bv_width_of(op.smt_name(), &a)?;
        if let Term::BitVec(v, _) = a {
            let r = match op {
                Op::BvNot => !v,
                _ => 0u128.wrapping_sub(v),
            };
            return Ok(Term::BitVec(r & mask(w), w));
        }
        Ok(Term::Op(op, vec![Arc::new(a)]))
    }

    pub fn bv_not(a: Term) -> FormulaResult<Self> {
        Self::bv_unary(Op::BvNot, a)
    }

    pub fn bv_neg(a: Term) -> FormulaResult<Self> {
        Self::bv_unary(Op::BvNeg, a)
    }

    /// Sort-directed addition (integer or bitvector)
    pub fn plus(a: Term, b: Term) -> FormulaResult<Self> {
        match a.sort() {
            Sort::Int => Self::int_add(a, b),
            Sort::BitVec(_) => Self::bv_add(a, b),
            other => Err(mismatch("plus", "Int or bitvector", &other)),
        }
    }

    /// Sort-directed subtraction (integer or bitvector)
    pub fn minus(a: Term, b: Term) -> FormulaResult<Self> {
        match a.sort() {
            Sort::Int => Self::int_sub(a, b),
            Sort::BitVec(_) => Self::bv_sub(a, b),
            other => Err(mismatch("minus", "Int or bitvector", &other)),
        }
    }

    /// Sort-directed multiplication (integer or bitvector)
    pub fn multiply(a: Term, b: Term) -> FormulaResult<Self> {
        match a.sort() {
            Sort::Int => Self::int_binary(Op::Mul, a, b),
            Sort::BitVec(_) => Self::bv_mul(a, b),
            other => Err(mismatch("multiply", "Int or bitvector", &other)),
        }
    }

    /// Sort-directed `a < b`
    pub fn less_than(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        match a.sort() {
            Sort::Int => Self::int_lt(a, b),
            Sort::BitVec(_) => Self::bv_lt(a, b, signed),
            other => Err(mismatch("less_than", "Int or bitvector", &other)),
        }
    }

    /// Sort-directed `a <= b`
    pub fn less_or_equal(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        match a.sort() {
            Sort::Int => Self::int_le(a, b),
            Sort::BitVec(_) => Self::bv_le(a, b, signed),
            other => Err(mismatch("less_or_equal", "Int or bitvector", &other)),
        }
    }

    pub fn greater_than(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        Self::less_than(b, a, signed)
    }

    pub fn greater_or_equal(a: Term, b: Term, signed: bool) -> FormulaResult<Self> {
        Self::less_or_equal(b, a, signed)
    }

    /// `concat(hi, lo)`: `hi` becomes the most significant part
    pub fn concat(hi: Term, lo: Term) -> FormulaResult<Self> {
        let wh = bv_width_of("concat", &hi)?;
        let wl = bv_width_of("concat", &lo)?;
        let width = wh + wl;
        if width > MAX_BV_WIDTH {
            return Err(FormulaError::InvalidWidth(width));
        }
        if let (Term::BitVec(h, _), Term::BitVec(l, _)) = (&hi, &lo) {
            return Ok(Term::BitVec(((h << wl) | l) & mask(width), width));
        }
        Ok(Term::Op(Op::Concat, vec![Arc::new(hi), Arc::new(lo)]))
    }

    /// Bits `hi..=lo` of `t`
    pub fn extract(t: Term, hi: u32, lo: u32) -> FormulaResult<Self> {
        let width = bv_width_of("extract", &t)?;
        if hi < lo || hi >= width {
            return Err(FormulaError::InvalidExtract { hi, lo, width });
        }
        let result_width = hi - lo + 1;
        if result_width == width {
            return Ok(t);
        }
        match &t {
            Term::BitVec(v, _) => Ok(Term::BitVec((v >> lo) & mask(result_width), result_width)),
            Term::Op(Op::Concat, args) if args.len() == 2 => {
                let low_width = args[1].sort().bv_width().unwrap_or(0);
                if hi < low_width {
                    Self::extract((*args[1]).clone(), hi, lo)
                } else if lo >= low_width {
                    Self::extract((*args[0]).clone(), hi - low_width, lo - low_width)
                } else {
                    Ok(Term::Op(Op::Extract(hi, lo), vec![Arc::new(t)]))
                }
            }
            _ => Ok(Term::Op(Op::Extract(hi, lo), vec![Arc::new(t)])),
        }
    }

    pub fn zero_extend(t: Term, extra: u32) -> FormulaResult<Self> {
        let width = bv_width_of("zero_extend", &t)?;
        if extra == 0 {
            return Ok(t);
        }
        if width + extra > MAX_BV_WIDTH {
            return Err(FormulaError::InvalidWidth(width + extra));
        }
        if let Term::BitVec(v, _) = t {
            return Ok(Term::BitVec(v, width + extra));
        }
        Ok(Term::Op(Op::ZeroExtend(extra), vec![Arc::new(t)]))
    }

    pub fn sign_extend(t: Term, extra: u32) -> FormulaResult<Self> {
        let width = bv_width_of("sign_extend", &t)?;
        if extra == 0 {
            return Ok(t);
        }
        if width + extra > MAX_BV_WIDTH {
            return Err(FormulaError::InvalidWidth(width + extra));
        }
        if let Term::BitVec(v, _) = t {
            return Ok(Term::bv(to_signed(v, width), width + extra));
        }
        Ok(Term::Op(Op::SignExtend(extra), vec![Arc::new(t)]))
    }

    /// Read from an array
    pub fn select(arr: Term, idx: Term) -> FormulaResult<Self> {
        let arr_sort = arr.sort();
        let Some((index_sort, _)) = arr_sort.array_parts() else {
            return Err(mismatch("select", "array", &arr_sort));
        };
        let idx_sort = idx.sort();
        if &idx_sort != index_sort {
            return Err(mismatch("select", index_sort, &idx_sort));
        }
        // select(store(a, i, v), i) = v
        if let Term::Op(Op::Store, args) = &arr {
            if args.len() == 3 && *args[1] == idx {
                return Ok((*args[2]).clone());
            }
        }
        Ok(Term::Op(Op::Select, vec![Arc::new(arr), Arc::new(idx)]))
    }

    /// Write to an array
    pub fn store(arr: Term, idx: Term, val: Term) -> FormulaResult<Self> {
        let arr_sort = arr.sort();
        let Some((index_sort, elem_sort)) = arr_sort.array_parts() else {
            return Err(mismatch("store", "array", &arr_sort));
        };
        let idx_sort = idx.sort();
        if &idx_sort != index_sort {
            return Err(mismatch("store", index_sort, &idx_sort));
        }
        let val_sort = val.sort();
        if &val_sort != elem_sort {
            return Err(mismatch("store", elem_sort, &val_sort));
        }
        Ok(Term::Op(
            Op::Store,
            vec![Arc::new(arr), Arc::new(idx), Arc::new(val)],
        ))
    }

    /// Application of the uninterpreted function `name` returning `sort`
    pub fn apply(name: impl Into<String>, sort: Sort, args: Vec<Term>) -> Self {
        Term::App {
            name: name.into(),
            sort,
            args: args.into_iter().map(Arc::new).collect(),
        }
    }

    /// Sort of this term
    pub fn sort(&self) -> Sort {
        fn arg_sort(args: &[Arc<Term>], i: usize) -> Sort {
            args.get(i).map(|a| a.sort()).unwrap_or(Sort::Bool)
        }
        match self {
            Term::Bool(_) => Sort::Bool,
            Term::Int(_) => Sort::Int,
            Term::BitVec(_, w) => Sort::BitVec(*w),
            Term::Var(v) => v.sort.clone(),
            Term::App { sort, .. } => sort.clone(),
            Term::Op(op, args) => match op {
                Op::Not
                | Op::And
                | Op::Or
                | Op::Implies
                | Op::Eq
                | Op::Lt
                | Op::Le
                | Op::BvUlt
                | Op::BvUle
                | Op::BvSlt
                | Op::BvSle => Sort::Bool,
                Op::Ite => arg_sort(args, 1),
                Op::Add | Op::Sub | Op::Mul => Sort::Int,
                Op::Concat => {
                    let w = arg_sort(args, 0).bv_width().unwrap_or(0)
                        + arg_sort(args, 1).bv_width().unwrap_or(0);
                    Sort::BitVec(w)
                }
                Op::Extract(hi, lo) => Sort::BitVec(hi.saturating_sub(*lo) + 1),
                Op::ZeroExtend(n) | Op::SignExtend(n) => {
                    Sort::BitVec(arg_sort(args, 0).bv_width().unwrap_or(0) + n)
                }
                Op::Select => match arg_sort(args, 0) {
                    Sort::Array(_, e) => *e,
                    other => other,
                },
                Op::Store => arg_sort(args, 0),
                _ => arg_sort(args, 0),
            },
        }
    }

    /// Names of all symbols (variables and function symbols) in this term
    pub fn symbols(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_symbols(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_symbols(&self, out: &mut Vec<String>) {
        match self {
            Term::Bool(_) | Term::Int(_) | Term::BitVec(..) => {}
            Term::Var(v) => out.push(v.name.clone()),
            Term::Op(_, args) => args.iter().for_each(|a| a.collect_symbols(out)),
            Term::App { name, args, .. } => {
                out.push(name.clone());
                args.iter().for_each(|a| a.collect_symbols(out));
            }
        }
    }
}

fn is_simple_symbol(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c))
}

fn write_symbol(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_simple_symbol(name) {
        write!(f, "{name}")
    } else {
        write!(f, "|{name}|")
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Bool(b) => write!(f, "{b}"),
            Term::Int(n) if *n < 0 => write!(f, "(- {})", n.unsigned_abs()),
            Term::Int(n) => write!(f, "{n}"),
            Term::BitVec(v, w) => write!(f, "(_ bv{v} {w})"),
            Term::Var(v) => write!(f, "{v}"),
            Term::App { name, args, .. } => {
                if args.is_empty() {
                    return write_symbol(f, name);
                }
                write!(f, "(")?;
                write_symbol(f, name)?;
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
            Term::Op(op, args) => {
                match op {
                    Op::Extract(hi, lo) => write!(f, "((_ extract {hi} {lo})")?,
                    Op::ZeroExtend(n) => write!(f, "((_ zero_extend {n})")?,
                    Op::SignExtend(n) => write!(f, "((_ sign_extend {n})")?,
                    _ => write!(f, "({}", op.smt_name())?,
                }
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
        }
    }
}
