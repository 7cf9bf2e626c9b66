use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::commands::CommandSet;
use crate::connector::base::Connector;
use crate::connector::fallback::{self, SingleWriter};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::types::{EventOp, Field, Row, RowChangeEvent, Table, Value, WriteOutcome};
use crate::{bail, sync_error};

#[derive(Debug)]
struct MemoryTable {
    schema: Table,
    /// Rows keyed by the rendered primary key value; the map stays sorted so page
    /// reads are stable.
    rows: BTreeMap<String, Row>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, MemoryTable>,
    reads: u64,
}

/// In-memory store, used as a test double and as a sink for demos.
///
/// The store never parses the statements it receives; it addresses tables by name and
/// consumes the positional page binds directly. It therefore pairs with the `mysql`
/// dialect, whose page binds arrive as `[offset, limit]`. Filters in generated
/// statements are ignored.
///
/// Clones share the underlying store, so a seeded connector can be handed to a pipeline
/// while the test keeps a handle for assertions.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Creates a table with the given schema and initial rows.
    ///
    /// Rows are keyed by the schema's primary key when it has one; keyless relations
    /// fall back to insertion order.
    pub async fn seed_table(&self, schema: Table, rows: Vec<Row>) -> SyncResult<()> {
        schema.validate()?;
        let key_field = schema.primary_key().map(|field| field.name.clone());

        let mut keyed = BTreeMap::new();
        for (index, row) in rows.into_iter().enumerate() {
            let key = match &key_field {
                Some(name) => key_of(name, &row)?,
                None => format!("{index:08}"),
            };
            keyed.insert(key, row);
        }

        let mut inner = self.inner.lock().await;
        inner.tables.insert(
            schema.name.clone(),
            MemoryTable {
                schema,
                rows: keyed,
            },
        );

        Ok(())
    }

    /// Returns the stored rows of a table in key order. Empty for unknown tables.
    pub async fn snapshot(&self, table_name: &str) -> Vec<Row> {
        let inner = self.inner.lock().await;
        inner
            .tables
            .get(table_name)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of page reads served since the store was created.
    pub async fn read_calls(&self) -> u64 {
        self.inner.lock().await.reads
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for MemoryConnector {
    async fn is_alive(&self) -> bool {
        true
    }

    async fn introspect(&self, table_name: &str) -> SyncResult<Table> {
        let inner = self.inner.lock().await;
        match inner.tables.get(table_name) {
            Some(table) => Ok(table.schema.clone()),
            None => bail!(
                ErrorKind::MissingTable,
                "Table does not exist in the memory store",
                table_name.to_string()
            ),
        }
    }

    async fn read(&self, table_name: &str, _query: &str, page_args: [u64; 2]) -> SyncResult<Vec<Row>> {
        let [offset, limit] = page_args;
        let mut inner = self.inner.lock().await;
        inner.reads += 1;

        let Some(table) = inner.tables.get(table_name) else {
            bail!(
                ErrorKind::MissingTable,
                "Table does not exist in the memory store",
                table_name.to_string()
            );
        };

        Ok(table
            .rows
            .values()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, table_name: &str, _query: &str) -> SyncResult<u64> {
        let inner = self.inner.lock().await;
        match inner.tables.get(table_name) {
            Some(table) => Ok(table.rows.len() as u64),
            None => bail!(
                ErrorKind::MissingTable,
                "Table does not exist in the memory store",
                table_name.to_string()
            ),
        }
    }

    async fn write_batch(
        &self,
        table_name: &str,
        _insert: &str,
        fields: &[Field],
        rows: Vec<Row>,
    ) -> SyncResult<WriteOutcome> {
        if rows.is_empty() {
            return Ok(WriteOutcome::new());
        }
        let key_field = pk_field(fields)?;

        let mut inner = self.inner.lock().await;
        let Some(table) = inner.tables.get_mut(table_name) else {
            bail!(
                ErrorKind::MissingTable,
                "Table does not exist in the memory store",
                table_name.to_string()
            );
        };

        debug!("writing a batch of {} rows to {table_name}", rows.len());

        let mut outcome = WriteOutcome::new();
        for row in rows {
            let key = match key_of(&key_field.name, &row) {
                Ok(key) => key,
                Err(err) => {
                    outcome.record_failure(row, err);
                    continue;
                }
            };
            if table.rows.contains_key(&key) {
                let err = sync_error!(
                    ErrorKind::ValidationError,
                    "Duplicate key in the memory store",
                    key
                );
                outcome.record_failure(row, err);
                continue;
            }
            table.rows.insert(key, materialize(fields, &row));
            outcome.success += 1;
        }

        Ok(outcome)
    }

    async fn write_one(
        &self,
        table_name: &str,
        _commands: &CommandSet,
        fields: &[Field],
        event: &RowChangeEvent,
    ) -> SyncResult<WriteOutcome> {
        let mut writer = MemorySingleWriter {
            store: self,
            table_name,
            fields,
        };
        fallback::apply_with_fallback(&mut writer, event).await
    }
}

/// Statement-level adapter the fallback driver runs against the store.
struct MemorySingleWriter<'a> {
    store: &'a MemoryConnector,
    table_name: &'a str,
    fields: &'a [Field],
}

impl SingleWriter for MemorySingleWriter<'_> {
    async fn execute(&mut self, op: EventOp, row: &Row) -> SyncResult<u64> {
        let key_field = pk_field(self.fields)?;
        let key = key_of(&key_field.name, row)?;

        let mut inner = self.store.inner.lock().await;
        let Some(table) = inner.tables.get_mut(self.table_name) else {
            bail!(
                ErrorKind::MissingTable,
                "Table does not exist in the memory store",
                self.table_name.to_string()
            );
        };

        match op {
            EventOp::Insert => {
                if table.rows.contains_key(&key) {
                    bail!(
                        ErrorKind::ValidationError,
                        "Duplicate key in the memory store",
                        key
                    );
                }
                table.rows.insert(key, materialize(self.fields, row));
                Ok(1)
            }
            EventOp::Update => match table.rows.get_mut(&key) {
                Some(stored) => {
                    for field in self.fields.iter().filter(|field| !field.pk) {
                        stored.insert(
                            field.name.clone(),
                            row.get(field.name.as_str())
                                .cloned()
                                .unwrap_or(Value::Null),
                        );
                    }
                    Ok(1)
                }
                None => Ok(0),
            },
            EventOp::Delete => Ok(table.rows.remove(&key).map(|_| 1).unwrap_or(0)),
        }
    }

    async fn exists(&mut self, row: &Row) -> SyncResult<bool> {
        let key_field = pk_field(self.fields)?;
        let key = key_of(&key_field.name, row)?;

        let inner = self.store.inner.lock().await;
        Ok(inner
            .tables
            .get(self.table_name)
            .map(|table| table.rows.contains_key(&key))
            .unwrap_or(false))
    }
}

fn pk_field(fields: &[Field]) -> SyncResult<&Field> {
    fields.iter().find(|field| field.pk).ok_or_else(|| {
        sync_error!(
            ErrorKind::DialectError,
            "Memory writes need a primary key field"
        )
    })
}

/// Renders the row's key value. NULL and absent keys are rejected.
fn key_of(key_name: &str, row: &Row) -> SyncResult<String> {
    match row.get(key_name) {
        Some(value) if !value.is_null() => Ok(value.to_text()),
        _ => Err(sync_error!(
            ErrorKind::InvalidData,
            "Row is missing its primary key value",
            key_name.to_string()
        )),
    }
}

/// Projects the row onto the bound column list, filling absent columns with NULL.
fn materialize(fields: &[Field], row: &Row) -> Row {
    fields
        .iter()
        .map(|field| {
            (
                field.name.clone(),
                row.get(field.name.as_str())
                    .cloned()
                    .unwrap_or(Value::Null),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnType, TableKind, row_from};

    fn user_schema() -> Table {
        Table::new(
            "USER",
            TableKind::Table,
            vec![
                Field::primary_key("id", ColumnType::BigInt),
                Field::new("name", ColumnType::String),
            ],
        )
    }

    fn user_row(id: i64, name: &str) -> Row {
        row_from([("id", Value::from(id)), ("name", Value::from(name))])
    }

    async fn seeded(rows: Vec<Row>) -> MemoryConnector {
        let store = MemoryConnector::new();
        store.seed_table(user_schema(), rows).await.unwrap();
        store
    }

    fn empty_commands() -> CommandSet {
        CommandSet {
            query: String::new(),
            query_count: String::new(),
            exists_check: String::new(),
            insert: String::new(),
            update: String::new(),
            delete: String::new(),
        }
    }

    #[tokio::test]
    async fn test_read_pages_in_key_order() {
        let store = seeded(vec![
            user_row(3, "c"),
            user_row(1, "a"),
            user_row(2, "b"),
        ])
        .await;

        let first = store.read("USER", "", [0, 2]).await.unwrap();
        let second = store.read("USER", "", [2, 2]).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(first[0].get("id"), Some(&Value::I64(1)));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].get("id"), Some(&Value::I64(3)));
        assert_eq!(store.read_calls().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_table_is_rejected() {
        let store = MemoryConnector::new();

        let err = store.read("MISSING", "", [0, 10]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingTable);

        let err = store.introspect("MISSING").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingTable);
    }

    #[tokio::test]
    async fn test_count_and_introspect() {
        let store = seeded(vec![user_row(1, "a"), user_row(2, "b")]).await;

        assert_eq!(store.count("USER", "").await.unwrap(), 2);
        let schema = store.introspect("USER").await.unwrap();
        assert_eq!(schema.primary_key().map(|f| f.name.as_str()), Some("id"));
    }

    #[tokio::test]
    async fn test_write_batch_reports_duplicates() {
        let store = seeded(vec![user_row(2, "kept")]).await;
        let fields = user_schema().fields;
        let rows = vec![user_row(1, "a"), user_row(2, "dup"), user_row(3, "c")];

        let outcome = store
            .write_batch("USER", "", &fields, rows)
            .await
            .unwrap();

        assert_eq!(outcome.success, 2);
        assert_eq!(outcome.failed(), 1);
        assert!(outcome.error_trace.contains("Duplicate key"));

        let rows = store.snapshot("USER").await;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get("name"), Some(&Value::from("kept")));
    }

    #[tokio::test]
    async fn test_write_batch_fills_absent_columns_with_null() {
        let store = seeded(vec![]).await;
        let fields = user_schema().fields;

        let outcome = store
            .write_batch("USER", "", &fields, vec![row_from([("id", Value::I64(7))])])
            .await
            .unwrap();

        assert_eq!(outcome.success, 1);
        let rows = store.snapshot("USER").await;
        assert_eq!(rows[0].get("name"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_write_one_update_falls_back_to_insert() {
        let store = seeded(vec![]).await;
        let fields = user_schema().fields;
        let event = RowChangeEvent::update("USER", None, user_row(5, "new"));

        let outcome = store
            .write_one("USER", &empty_commands(), &fields, &event)
            .await
            .unwrap();

        assert_eq!(outcome.success, 1);
        let rows = store.snapshot("USER").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("new")));
    }

    #[tokio::test]
    async fn test_write_one_insert_conflict_updates_in_place() {
        let store = seeded(vec![user_row(5, "old")]).await;
        let fields = user_schema().fields;
        let event = RowChangeEvent::insert("USER", user_row(5, "new"));

        let outcome = store
            .write_one("USER", &empty_commands(), &fields, &event)
            .await
            .unwrap();

        assert_eq!(outcome.success, 1);
        let rows = store.snapshot("USER").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("new")));
    }

    #[tokio::test]
    async fn test_write_one_delete_is_replay_safe() {
        let store = seeded(vec![user_row(5, "a")]).await;
        let fields = user_schema().fields;
        let event = RowChangeEvent::delete("USER", user_row(5, "a"));

        let first = store
            .write_one("USER", &empty_commands(), &fields, &event)
            .await
            .unwrap();
        let second = store
            .write_one("USER", &empty_commands(), &fields, &event)
            .await
            .unwrap();

        assert_eq!(first.success, 1);
        assert_eq!(second.success, 1);
        assert!(store.snapshot("USER").await.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = seeded(vec![]).await;
        let handle = store.clone();
        let fields = user_schema().fields;

        store
            .write_batch("USER", "", &fields, vec![user_row(1, "a")])
            .await
            .unwrap();

        assert_eq!(handle.snapshot("USER").await.len(), 1);
    }
}
