//! Store connectors.
//!
//! A connector owns one store endpoint and executes the generated statements against
//! it: paged reads and counts on the source side, batch inserts and single-row event
//! writes on the target side. Statement text comes from the command builder; the
//! connector contributes value binding, result decoding, and schema introspection.

mod base;
mod fallback;
mod memory;
mod numeric;
mod postgres;

pub use base::*;
pub use memory::*;
pub use numeric::*;
pub use postgres::*;

use config::shared::ConnectorConfig;

use crate::commands::CommandSet;
use crate::error::SyncResult;
use crate::types::{Field, Row, RowChangeEvent, Table, WriteOutcome};

/// A connected store of any supported backend.
///
/// Dispatches [`Connector`] calls to the backend chosen by the [`ConnectorConfig`]
/// it was built from. Cloning shares the underlying connection or store.
#[derive(Debug, Clone)]
pub enum ConnectorClient {
    Memory(MemoryConnector),
    Postgres(PostgresConnector),
}

impl ConnectorClient {
    /// Connects to the store described by the configuration.
    pub async fn connect(config: &ConnectorConfig) -> SyncResult<Self> {
        match config {
            ConnectorConfig::Memory => Ok(ConnectorClient::Memory(MemoryConnector::new())),
            ConnectorConfig::Postgres(pg) => {
                Ok(ConnectorClient::Postgres(PostgresConnector::connect(pg).await?))
            }
        }
    }
}

impl Connector for ConnectorClient {
    async fn is_alive(&self) -> bool {
        match self {
            ConnectorClient::Memory(connector) => connector.is_alive().await,
            ConnectorClient::Postgres(connector) => connector.is_alive().await,
        }
    }

    async fn introspect(&self, table_name: &str) -> SyncResult<Table> {
        match self {
            ConnectorClient::Memory(connector) => connector.introspect(table_name).await,
            ConnectorClient::Postgres(connector) => connector.introspect(table_name).await,
        }
    }

    async fn read(&self, table_name: &str, query: &str, page_args: [u64; 2]) -> SyncResult<Vec<Row>> {
        match self {
            ConnectorClient::Memory(connector) => connector.read(table_name, query, page_args).await,
            ConnectorClient::Postgres(connector) => {
                connector.read(table_name, query, page_args).await
            }
        }
    }

    async fn count(&self, table_name: &str, query: &str) -> SyncResult<u64> {
        match self {
            ConnectorClient::Memory(connector) => connector.count(table_name, query).await,
            ConnectorClient::Postgres(connector) => connector.count(table_name, query).await,
        }
    }

    async fn write_batch(
        &self,
        table_name: &str,
        insert: &str,
        fields: &[Field],
        rows: Vec<Row>,
    ) -> SyncResult<WriteOutcome> {
        match self {
            ConnectorClient::Memory(connector) => {
                connector.write_batch(table_name, insert, fields, rows).await
            }
            ConnectorClient::Postgres(connector) => {
                connector.write_batch(table_name, insert, fields, rows).await
            }
        }
    }

    async fn write_one(
        &self,
        table_name: &str,
        commands: &CommandSet,
        fields: &[Field],
        event: &RowChangeEvent,
    ) -> SyncResult<WriteOutcome> {
        match self {
            ConnectorClient::Memory(connector) => {
                connector.write_one(table_name, commands, fields, event).await
            }
            ConnectorClient::Postgres(connector) => {
                connector.write_one(table_name, commands, fields, event).await
            }
        }
    }
}
