//! Run workers.
//!
//! One worker drives one live run of a mapping: the full sync worker copies table
//! groups page by page, the incremental worker replays captured change events. Both
//! report through the meta store and the flush sink and wind down on the shared stop
//! signal.

pub mod base;
pub mod full_sync;
pub mod incremental;
