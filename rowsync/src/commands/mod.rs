//! Store-neutral command generation.
//!
//! Turns an abstract table, field, and filter description into the dialect-specific
//! statement set a connector executes: page read, row count, insert, update, delete,
//! and existence check.

mod builder;
mod dialect;

pub use builder::*;
pub use dialect::*;
