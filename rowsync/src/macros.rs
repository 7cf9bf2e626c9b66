//! Macros for sync error handling.
//!
//! Provides convenience macros for creating and returning [`crate::error::SyncError`] instances
//! with reduced boilerplate for common error handling patterns.

/// Creates a [`crate::error::SyncError`] from error kind and description.
///
/// This macro provides a concise way to create [`crate::error::SyncError`] instances with
/// either static descriptions or additional dynamic detail information.
#[macro_export]
macro_rules! sync_error {
    ($kind:expr, $desc:expr) => {
        SyncError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        SyncError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::SyncError`] from the current function.
///
/// This macro combines error creation with early return, reducing boilerplate
/// when handling error conditions that should immediately terminate execution.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::sync_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::sync_error!($kind, $desc, $detail))
    };
}
