//! Concrete models and term evaluation
//!
//! A [`Model`] assigns values to variables and to applications of
//! uninterpreted functions. It is used to check encodings without a solver:
//! the defining equations produced by an encoder are replayed with
//! [`Model::define`] and read terms are then evaluated with [`Model::eval`].

use crate::error::{FormulaError, FormulaResult};
use crate::sort::Sort;
use crate::term::{apply_bv_binary, apply_bv_predicate, mask, to_signed, Op, Term};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Concrete value of a term
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    /// Bitvector value (masked) and width
    BitVec(u128, u32),
    /// Array with a default element; entries equal to the default are never
    /// stored, so structural equality is extensional equality
    Array {
        default: Box<Value>,
        entries: BTreeMap<Value, Value>,
    },
}

impl Value {
    /// Default value of a sort (false, zero, constant-default arrays)
    pub fn default_of(sort: &Sort) -> Self {
        match sort {
            Sort::Bool => Value::Bool(false),
            Sort::Int => Value::Int(0),
            Sort::BitVec(w) => Value::BitVec(0, *w),
            Sort::Array(_, e) => Value::Array {
                default: Box::new(Value::default_of(e)),
                entries: BTreeMap::new(),
            },
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bv(&self) -> Option<(u128, u32)> {
        match self {
            Value::BitVec(v, w) => Some((*v, *w)),
            _ => None,
        }
    }

    fn select(&self, index: &Value) -> Option<Value> {
        match self {
            Value::Array { default, entries } => {
                Some(entries.get(index).cloned().unwrap_or_else(|| (**default).clone()))
            }
            _ => None,
        }
    }

    fn store(&self, index: Value, element: Value) -> Option<Value> {
        match self {
            Value::Array { default, entries } => {
                let mut entries = entries.clone();
                if element == **default {
                    entries.remove(&index);
                } else {
                    entries.insert(index, element);
                }
                Some(Value::Array {
                    default: default.clone(),
                    entries,
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::BitVec(v, w) => write!(f, "#x{v:x}[{w}]"),
            Value::Array { default, entries } => {
                write!(f, "[")?;
                for (k, v) in entries {
                    write!(f, "{k} -> {v}, ")?;
                }
                write!(f, "else -> {default}]")
            }
        }
    }
}

/// Variable and function interpretation
#[derive(Debug, Clone, Default)]
pub struct Model {
    vars: FxHashMap<String, Value>,
    functions: FxHashMap<String, BTreeMap<Vec<Value>, Value>>,
    /// When set, unbound symbols evaluate to the default value of their sort
    completing: bool,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    /// A model that completes unbound symbols with default values
    pub fn completing() -> Self {
        Self {
            completing: true,
            ..Self::default()
        }
    }

    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn assign_function(&mut self, name: impl Into<String>, args: Vec<Value>, value: Value) {
        self.functions
            .entry(name.into())
            .or_default()
            .insert(args, value);
    }

    pub fn value_of(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    fn unbound(&self, name: &str, sort: &Sort) -> FormulaResult<Value> {
        if self.completing {
            Ok(Value::default_of(sort))
        } else {
            Err(FormulaError::Unbound(name.to_string()))
        }
    }

    pub fn eval_bool(&self, term: &Term) -> FormulaResult<bool> {
        match self.eval(term)? {
            Value::Bool(b) => Ok(b),
            _ => Err(FormulaError::SortMismatch {
                op: "eval_bool",
                expected: Sort::Bool.to_string(),
                actual: term.sort().to_string(),
            }),
        }
    }

    /// Evaluate a term under this model
    pub fn eval(&self, term: &Term) -> FormulaResult<Value> {
        match term {
            Term::Bool(b) => Ok(Value::Bool(*b)),
            Term::Int(n) => Ok(Value::Int(*n)),
            Term::BitVec(v, w) => Ok(Value::BitVec(v & mask(*w), *w)),
            Term::Var(v) => match self.vars.get(&v.name) {
                Some(value) => Ok(value.clone()),
                None => self.unbound(&v.name, &v.sort),
            },
            Term::App { name, sort, args } => {
                let args = self.eval_args(args)?;
                match self.functions.get(name).and_then(|table| table.get(&args)) {
                    Some(value) => Ok(value.clone()),
                    None => self.unbound(name, sort),
                }
            }
            Term::Op(op, args) => self.eval_op(*op, args, term),
        }
    }

    fn eval_args(&self, args: &[Arc<Term>]) -> FormulaResult<Vec<Value>> {
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn eval_op(&self, op: Op, args: &[Arc<Term>], term: &Term) -> FormulaResult<Value> {
        let malformed = || FormulaError::Unsupported(format!("malformed term {term}"));
        let arg = |i: usize| -> FormulaResult<Value> {
            args.get(i).ok_or_else(malformed).and_then(|a| self.eval(a))
        };
        let bool_arg = |i: usize| -> FormulaResult<bool> { arg(i)?.as_bool().ok_or_else(malformed) };
        let bv_arg = |i: usize| -> FormulaResult<(u128, u32)> { arg(i)?.as_bv().ok_or_else(malformed) };
        let int_arg = |i: usize| -> FormulaResult<i64> {
            match arg(i)? {
                Value::Int(n) => Ok(n),
                _ => Err(malformed()),
            }
        };

        match op {
            Op::Not => Ok(Value::Bool(!bool_arg(0)?)),
            Op::And => {
                for i in 0..args.len() {
                    if !bool_arg(i)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Op::Or => {
                for i in 0..args.len() {
                    if bool_arg(i)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Op::Implies => Ok(Value::Bool(!bool_arg(0)? || bool_arg(1)?)),
            Op::Eq => Ok(Value::Bool(arg(0)? == arg(1)?)),
            Op::Ite => {
                if bool_arg(0)? {
                    arg(1)
                } else {
                    arg(2)
                }
            }
            Op::Add | Op::Sub | Op::Mul => {
                let (a, b) = (int_arg(0)?, int_arg(1)?);
                let r = match op {
                    Op::Add => a.checked_add(b),
                    Op::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                r.map(Value::Int)
                    .ok_or_else(|| FormulaError::Unsupported(format!("integer overflow in {term}")))
            }
            Op::Lt => Ok(Value::Bool(int_arg(0)? < int_arg(1)?)),
            Op::Le => Ok(Value::Bool(int_arg(0)? <= int_arg(1)?)),
            Op::BvNot => {
                let (v, w) = bv_arg(0)?;
                Ok(Value::BitVec(!v & mask(w), w))
            }
            Op::BvNeg => {
                let (v, w) = bv_arg(0)?;
                Ok(Value::BitVec(0u128.wrapping_sub(v) & mask(w), w))
            }
            Op::BvUlt | Op::BvUle | Op::BvSlt | Op::BvSle => {
                let ((a, w), (b, _)) = (bv_arg(0)?, bv_arg(1)?);
                apply_bv_predicate(op, a, b, w)
                    .map(Value::Bool)
                    .ok_or_else(malformed)
            }
            Op::Concat => {
                let ((h, wh), (l, wl)) = (bv_arg(0)?, bv_arg(1)?);
                let w = wh + wl;
                let shifted = if wl >= 128 { 0 } else { h << wl };
                Ok(Value::BitVec((shifted | l) & mask(w), w))
            }
            Op::Extract(hi, lo) => {
                let (v, _) = bv_arg(0)?;
                let w = hi - lo + 1;
                Ok(Value::BitVec((v >> lo) & mask(w), w))
            }
            Op::ZeroExtend(n) => {
                let (v, w) = bv_arg(0)?;
                Ok(Value::BitVec(v, w + n))
            }
            Op::SignExtend(n) => {
                let (v, w) = bv_arg(0)?;
                Ok(Value::BitVec(to_signed(v, w) as u128 & mask(w + n), w + n))
            }
            Op::Select => arg(0)?.select(&arg(1)?).ok_or_else(malformed),
            Op::Store => arg(0)?.store(arg(1)?, arg(2)?).ok_or_else(malformed),
            _ => {
                let ((a, w), (b, _)) = (bv_arg(0)?, bv_arg(1)?);
                apply_bv_binary(op, a, b, w)
                    .map(|v| Value::BitVec(v, w))
                    .ok_or_else(malformed)
            }
        }
    }

    /// Extend the model so that `formula` holds.
    ///
    /// Accepted shapes are conjunctions of equations whose left (or right)
    /// side is an unbound variable or an uninterpreted function application
    /// without an entry for the evaluated arguments. Any other conjunct must
    /// already evaluate to true.
    pub fn define(&mut self, formula: &Term) -> FormulaResult<()> {
        match formula {
            Term::Op(Op::And, args) => {
                for a in args {
                    self.define(a)?;
                }
                Ok(())
            }
            Term::Op(Op::Eq, args) if args.len() == 2 => {
                if self.try_bind(&args[0], &args[1])? || self.try_bind(&args[1], &args[0])? {
                    return Ok(());
                }
                self.check_holds(formula)
            }
            _ => self.check_holds(formula),
        }
    }

    fn check_holds(&self, formula: &Term) -> FormulaResult<()> {
        if self.eval_bool(formula)? {
            Ok(())
        } else {
            Err(FormulaError::NotADefinition(formula.to_string()))
        }
    }

    fn try_bind(&mut self, lhs: &Term, rhs: &Term) -> FormulaResult<bool> {
        match lhs {
            Term::Var(v) if !self.vars.contains_key(&v.name) => {
                let value = self.eval(rhs)?;
                self.vars.insert(v.name.clone(), value);
                Ok(true)
            }
            Term::App { name, args, .. } => {
                let args = self.eval_args(args)?;
                let bound = self
                    .functions
                    .get(name)
                    .is_some_and(|table| table.contains_key(&args));
                if bound {
                    return Ok(false);
                }
                let value = self.eval(rhs)?;
                self.assign_function(name.clone(), args, value);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
