pub mod capture;
pub mod commands;
pub mod concurrency;
pub mod connector;
pub mod error;
pub mod flush;
mod macros;
pub mod manager;
pub mod mapping;
pub mod picker;
pub mod state;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod workers;
