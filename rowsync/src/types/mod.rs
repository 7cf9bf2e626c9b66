//! Common types used throughout the sync engine.
//!
//! Re-exports the neutral value model, table and filter descriptions, change events,
//! and write outcomes shared by connectors, workers, and the command builder.

mod event;
mod filter;
mod outcome;
mod table;
mod value;

pub use event::*;
pub use filter::*;
pub use outcome::*;
pub use table::*;
pub use value::*;
