//! SQL generation building blocks: fragments, dialects and expression
//! rendering.

pub mod context;
pub mod dialect;
pub mod fragment;

pub use context::{SqlExpContext, SqlResolver};
pub use dialect::{DateGranularity, Dialect, SqlDialect};
pub use fragment::{ParamValue, SqlFragment};
