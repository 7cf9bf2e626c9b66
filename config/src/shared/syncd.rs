use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{ConnectorConfig, MappingConfig, ValidationError};

/// Complete configuration for the sync daemon.
///
/// Aggregates the source and target connectors together with the mapping they run.
/// Typically loaded from configuration files at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncdConfig {
    /// Configuration for the source connector rows are read from.
    pub source: ConnectorConfig,
    /// Configuration for the target connector rows are written to.
    pub target: ConnectorConfig,
    /// The synchronization job to run.
    pub mapping: MappingConfig,
}

impl SyncdConfig {
    /// Validates the complete daemon configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.target.validate()?;
        self.mapping.validate()?;

        Ok(())
    }
}

impl Config for SyncdConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
