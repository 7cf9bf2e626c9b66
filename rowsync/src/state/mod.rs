//! Run state tracking.
//!
//! Defines the per-mapping run record and the pluggable store it persists through.
//! Counters and checkpoints survive across flushes so an interrupted full sync can
//! resume from its last page.

mod meta;
pub mod store;

pub use meta::*;
