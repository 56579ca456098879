//! Error types for formula construction and evaluation

use thiserror::Error;

/// Formula errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("sort mismatch in {op}: expected {expected}, got {actual}")]
    SortMismatch {
        op: &'static str,
        expected: String,
        actual: String,
    },

    #[error("invalid extract [{hi}:{lo}] from bitvector of width {width}")]
    InvalidExtract { hi: u32, lo: u32, width: u32 },

    #[error("unsupported bitvector width {0}")]
    InvalidWidth(u32),

    #[error("unbound symbol: {0}")]
    Unbound(String),

    #[error("cannot define model from formula: {0}")]
    NotADefinition(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Result type for formula operations
pub type FormulaResult<T> = Result<T, FormulaError>;
