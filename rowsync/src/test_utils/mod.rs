//! Shared fixtures for engine tests.
//!
//! Provides canonical table and mapping builders around the in-memory connector,
//! plus a flush sink that lets tests wait for write activity instead of sleeping.
//! Exposed to downstream test crates through the `test-utils` feature.
pub mod group;
pub mod sink;
