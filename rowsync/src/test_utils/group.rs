//! Canonical `USER` to `USER2` fixtures.
//!
//! Every builder here describes the same small mapping: a source table `USER(id, name)`
//! replicated into `USER2(uid, full_name)`, with both columns renamed on the way. The
//! rename keeps projection honest in tests; a sync that writes source column names
//! into the target shows up as missing values immediately.

use std::sync::Arc;

use config::shared::{FieldMappingConfig, MappingConfig, PollingConfig, SyncModel, TableGroupConfig};

use crate::commands::MySqlDialect;
use crate::connector::{ConnectorClient, MemoryConnector};
use crate::manager::SyncJob;
use crate::mapping::{TableGroup, resolve_table_group};
use crate::types::{ColumnType, Field, Row, Table, TableKind, Value, row_from};

pub fn user_table() -> Table {
    Table::new(
        "USER",
        TableKind::Table,
        vec![
            Field::primary_key("id", ColumnType::BigInt),
            Field::new("name", ColumnType::String),
        ],
    )
}

pub fn user2_table() -> Table {
    Table::new(
        "USER2",
        TableKind::Table,
        vec![
            Field::primary_key("uid", ColumnType::BigInt),
            Field::new("full_name", ColumnType::String),
        ],
    )
}

pub fn user_group_spec() -> TableGroupConfig {
    TableGroupConfig {
        source_table: "USER".to_string(),
        target_table: "USER2".to_string(),
        field_mappings: vec![
            FieldMappingConfig {
                source: Some("id".to_string()),
                target: Some("uid".to_string()),
                pk: false,
            },
            FieldMappingConfig {
                source: Some("name".to_string()),
                target: Some("full_name".to_string()),
                pk: false,
            },
        ],
        filters: vec![],
        converters: vec![],
    }
}

/// Resolves the canonical group against the in-memory store's dialect.
pub fn user_group() -> TableGroup {
    resolve_table_group(
        &user_group_spec(),
        user_table(),
        user2_table(),
        &MySqlDialect,
        &MySqlDialect,
        None,
    )
    .expect("the canonical user group resolves")
}

/// Mapping over the canonical group with sizes tuned for tests.
///
/// Page and batch sizes are small enough that a handful of rows already exercises
/// paging and chunk fan-out. Increment mode polls every 25ms on the `id` column.
pub fn user_mapping(model: SyncModel) -> MappingConfig {
    let polling = match model {
        SyncModel::Full => None,
        SyncModel::Increment => Some(PollingConfig {
            interval_ms: 25,
            event_field: "id".to_string(),
        }),
    };

    MappingConfig {
        id: 1,
        name: "users".to_string(),
        model,
        page_size: 2,
        batch_size: 2,
        max_write_workers: 2,
        event_queue_capacity: 16,
        force_update: false,
        polling,
        groups: vec![user_group_spec()],
    }
}

pub fn user_row(id: i64, name: &str) -> Row {
    row_from([("id", Value::from(id)), ("name", Value::from(name))])
}

/// Target-shaped row, as the canonical group projects it.
pub fn user2_row(uid: i64, full_name: &str) -> Row {
    row_from([("uid", Value::from(uid)), ("full_name", Value::from(full_name))])
}

/// `count` source rows with ids `1..=count` and generated names.
pub fn user_rows(count: i64) -> Vec<Row> {
    (1..=count)
        .map(|id| user_row(id, &format!("user_{id}")))
        .collect()
}

/// Memory store with `USER` seeded. The returned handle shares state with clones
/// handed to the engine, so tests can keep it for assertions.
pub async fn seeded_source(rows: Vec<Row>) -> MemoryConnector {
    let store = MemoryConnector::new();
    store
        .seed_table(user_table(), rows)
        .await
        .expect("seeding the source store");
    store
}

/// Memory store with an empty `USER2`.
pub async fn empty_target() -> MemoryConnector {
    target_with(vec![]).await
}

/// Memory store with `USER2` seeded, for conflict and idempotence tests.
pub async fn target_with(rows: Vec<Row>) -> MemoryConnector {
    let store = MemoryConnector::new();
    store
        .seed_table(user2_table(), rows)
        .await
        .expect("seeding the target store");
    store
}

/// Assembles a runnable job over memory stores from the canonical fixtures.
pub fn user_job(
    mapping: MappingConfig,
    source: &MemoryConnector,
    target: &MemoryConnector,
) -> SyncJob {
    SyncJob {
        mapping: Arc::new(mapping),
        groups: Arc::new(vec![user_group()]),
        source: ConnectorClient::Memory(source.clone()),
        target: ConnectorClient::Memory(target.clone()),
    }
}
