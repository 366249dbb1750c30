//! MongoDB aggregation-pipeline building blocks.

pub mod context;
pub mod fragment;

pub use context::{MongoExpContext, MongoResolver};
pub use fragment::MongoFragment;
