//! Formula expressions: compilation and the shared expression tree.

pub mod ast;
pub mod functions;
pub mod parser;

pub use ast::{BinaryOp, CaseBranch, Exp, UnaryOp};
pub use functions::{has_aggregate, is_allowed_sql, SQL_AGGREGATES, SQL_FUNCTIONS};
pub use parser::compile;
