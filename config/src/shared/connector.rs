use serde::{Deserialize, Serialize};

use crate::shared::{PgConnectionConfig, ValidationError};

/// Configuration for the supported connector backends.
///
/// A connector describes one side of a synchronization mapping; the same enum covers
/// sources and targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorConfig {
    /// In-memory connector for ephemeral or test data.
    Memory,
    /// Postgres connector configuration.
    Postgres(PgConnectionConfig),
}

impl ConnectorConfig {
    /// Name of the SQL dialect statements are generated in for this connector.
    ///
    /// The in-memory store never parses SQL and consumes positional binds only, so it
    /// pairs with the `?`-placeholder dialect.
    pub fn dialect(&self) -> &'static str {
        match self {
            ConnectorConfig::Memory => "mysql",
            ConnectorConfig::Postgres(_) => "postgres",
        }
    }

    /// Validates the connector configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            ConnectorConfig::Memory => Ok(()),
            ConnectorConfig::Postgres(config) => config.tls.validate(),
        }
    }
}
