use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,

    /// Page size controls source reads and must be non-zero.
    #[error("Invalid mapping config: `page_size` must be greater than zero")]
    ZeroPageSize,

    /// Batch size controls target write chunking and must be non-zero.
    #[error("Invalid mapping config: `batch_size` must be greater than zero")]
    ZeroBatchSize,

    /// The bounded write pool needs at least one worker.
    #[error("Invalid mapping config: `max_write_workers` must be greater than zero")]
    ZeroWriteWorkers,

    /// A mapping without table groups has nothing to synchronize.
    #[error("Invalid mapping config: at least one table group must be configured")]
    NoTableGroups,

    /// Increment mode needs a polling section to drive change capture.
    #[error("Invalid mapping config: `polling` must be set when `model` is `increment`")]
    MissingPollingSettings,

    /// General configuration validation error.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
