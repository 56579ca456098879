//! Results of evaluating C expressions
//!
//! Evaluating an expression yields either a value or a location. Locations
//! are aliased (an address in the heap, possibly with the region the value
//! lives in) or unaliased (a plain SSA variable).

use crate::region::MemoryRegion;
use c2smt_formula::Term;
use c2smt_types::CType;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A program variable encoded as an SSA symbol.
///
/// Identity is by name only.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    ty: CType,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: CType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &CType {
        &self.ty
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

/// A value: a term, or an unknown value that equals nothing
#[derive(Debug, Clone)]
pub enum Value {
    Term(Term),
    Nondet,
}

impl Value {
    pub fn term(&self) -> Option<&Term> {
        match self {
            Value::Term(t) => Some(t),
            Value::Nondet => None,
        }
    }

    pub fn is_nondet(&self) -> bool {
        matches!(self, Value::Nondet)
    }
}

/// `Nondet` is not equal to anything, itself included.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Term(a), Value::Term(b)) => a == b,
            _ => false,
        }
    }
}

/// A memory location
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// An address in the heap; `region` is known for scalar locations
    Aliased {
        address: Term,
        region: Option<MemoryRegion>,
    },
    /// A variable outside the heap
    Unaliased { variable: Variable },
}

impl Location {
    pub fn aliased(address: Term, region: Option<MemoryRegion>) -> Self {
        Location::Aliased { address, region }
    }

    pub fn unaliased(variable: Variable) -> Self {
        Location::Unaliased { variable }
    }

    pub fn is_aliased(&self) -> bool {
        matches!(self, Location::Aliased { .. })
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Value(Value),
    Location(Location),
}

impl Expression {
    pub fn value(term: Term) -> Self {
        Expression::Value(Value::Term(term))
    }

    pub fn nondet() -> Self {
        Expression::Value(Value::Nondet)
    }

    pub fn aliased(address: Term, region: Option<MemoryRegion>) -> Self {
        Expression::Location(Location::aliased(address, region))
    }

    pub fn unaliased(variable: Variable) -> Self {
        Expression::Location(Location::unaliased(variable))
    }

    pub fn is_location(&self) -> bool {
        matches!(self, Expression::Location(_))
    }

    pub fn as_location(&self) -> Option<&Location> {
        match self {
            Expression::Location(l) => Some(l),
            Expression::Value(_) => None,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Value(Value::Term(t)) => write!(f, "value {t}"),
            Expression::Value(Value::Nondet) => write!(f, "nondet"),
            Expression::Location(Location::Aliased { address, region }) => match region {
                Some(r) => write!(f, "aliased {address} in {r}"),
                None => write!(f, "aliased {address}"),
            },
            Expression::Location(Location::Unaliased { variable }) => {
                write!(f, "unaliased {}", variable.name())
            }
        }
    }
}
