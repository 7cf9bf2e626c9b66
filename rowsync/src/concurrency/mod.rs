//! Concurrency primitives shared by the sync workers.

pub mod stop;
