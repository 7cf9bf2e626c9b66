//! Change capture.
//!
//! Capture sources watch a store for row changes and push normalized
//! [`crate::types::RowChangeEvent`]s into a bounded queue. One consumer worker applies
//! them in arrival order, so ordering and backpressure live here while projection and
//! writing stay with the rest of the engine.

mod base;
mod polling;
mod queue;

pub use base::*;
pub use polling::*;
pub use queue::*;
