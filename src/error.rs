//! Crate-wide error taxonomy.
//!
//! Compilation-time errors (everything except [`QueryError::Execute`]) are
//! raised before any backend call and always name the offending field,
//! operator or function. Backend execution errors pass through unmodified
//! from the executor collaborator; the compiler never retries.

use thiserror::Error;

use crate::model::ColumnType;

/// Errors raised while compiling or executing a query.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// Malformed expression syntax.
    #[error("expression syntax error at line {line}, column {column}: {message}")]
    Compile {
        message: String,
        line: u64,
        column: u64,
    },

    /// Column, dimension or calculated-field name not found in the model.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Function not in the active backend's allow-list.
    #[error("function {function} is not supported on the {backend} backend")]
    UnsupportedFunction {
        function: String,
        backend: &'static str,
    },

    /// Slice operator with no registered formula or hierarchy operator.
    #[error("no operator registered for '{0}'")]
    OperatorNotFound(String),

    /// Two formulas registered under the same operator name. Fatal at
    /// startup; callers must abort initialization.
    #[error("duplicate formula registration for operator '{0}'")]
    DuplicateFormula(String),

    /// Document backend handed a multi-table model.
    #[error("model '{0}' joins multiple tables; the document backend supports a single collection")]
    UnsupportedJoin(String),

    /// Value cannot be formatted to the column's declared type.
    #[error("cannot format value {value} for column '{column}' of type {expected}")]
    TypeCoercion {
        value: String,
        column: String,
        expected: ColumnType,
    },

    /// Operator given a value shape it does not accept, e.g. a scalar where
    /// a two-element range list is required.
    #[error("operator '{op}': {message}")]
    InvalidOperand { op: String, message: String },

    /// An OR group mixing aggregate and plain fields cannot be expressed:
    /// aggregate conditions live in HAVING, plain conditions in WHERE.
    #[error("cannot combine aggregate fields [{aggregate}] and plain fields [{plain}] with OR")]
    MixedOrCondition { aggregate: String, plain: String },

    /// Backend execution failure, passed through from the executor.
    #[error("query execution failed: {0}")]
    Execute(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = QueryError> = std::result::Result<T, E>;
