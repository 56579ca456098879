//! SMT formula layer
//!
//! Sorted terms over booleans, integers, bitvectors and arrays, with
//! uninterpreted function applications, plus a concrete [`Model`] used to
//! evaluate encodings without an external solver.

pub mod error;
pub mod model;
pub mod sort;
pub mod term;

pub use error::{FormulaError, FormulaResult};
pub use model::{Model, Value};
pub use sort::{Sort, MAX_BV_WIDTH};
pub use term::{parse_ssa_name, ssa_name, Op, Term, Var, SSA_SEPARATOR};
