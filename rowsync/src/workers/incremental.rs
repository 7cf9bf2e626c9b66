use std::sync::Arc;

use config::shared::MappingConfig;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::capture::{ChangeSource, EventRx, create_event_queue};
use crate::concurrency::stop::StopRx;
use crate::connector::Connector;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::flush::{FlushRecord, FlushSink};
use crate::mapping::TableGroup;
use crate::state::store::MetaStore;
use crate::types::{Row, RowChangeEvent};
use crate::workers::base::{Worker, WorkerHandle};

#[derive(Debug)]
pub struct IncrementalWorkerHandle {
    handle: Option<JoinHandle<SyncResult<()>>>,
}

impl WorkerHandle<()> for IncrementalWorkerHandle {
    fn state(&self) {}

    async fn wait(mut self) -> SyncResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            SyncError::from((
                ErrorKind::EventWorkerPanic,
                "Incremental worker task panicked",
                err.to_string(),
            ))
        })??;

        Ok(())
    }
}

/// Worker that drives one incremental run of a mapping.
///
/// The change source produces into a bounded event queue from its own task; this worker
/// consumes the queue and replays each event against the target in arrival order. A
/// stop request reaches the producer, and the consumer drains whatever the queue still
/// holds before winding down, so no accepted event is dropped.
#[derive(Debug)]
pub struct IncrementalWorker<S, T> {
    mapping: Arc<MappingConfig>,
    groups: Arc<Vec<TableGroup>>,
    source: Box<dyn ChangeSource>,
    target: T,
    meta_store: S,
    flush_sink: Arc<dyn FlushSink>,
    stop_rx: StopRx,
}

impl<S, T> IncrementalWorker<S, T> {
    pub fn new(
        mapping: Arc<MappingConfig>,
        groups: Arc<Vec<TableGroup>>,
        source: Box<dyn ChangeSource>,
        target: T,
        meta_store: S,
        flush_sink: Arc<dyn FlushSink>,
        stop_rx: StopRx,
    ) -> Self {
        Self {
            mapping,
            groups,
            source,
            target,
            meta_store,
            flush_sink,
            stop_rx,
        }
    }
}

impl<S, T> Worker<IncrementalWorkerHandle, ()> for IncrementalWorker<S, T>
where
    S: MetaStore + Clone + Send + Sync + 'static,
    T: Connector + Clone + Send + Sync + 'static,
{
    async fn start(self) -> SyncResult<IncrementalWorkerHandle> {
        info!("starting incremental worker for mapping {}", self.mapping.id);

        let incremental_worker_span =
            tracing::info_span!("incremental_worker", mapping_id = self.mapping.id);
        let handle =
            tokio::spawn(async move { self.run().await }.instrument(incremental_worker_span));

        Ok(IncrementalWorkerHandle {
            handle: Some(handle),
        })
    }
}

impl<S, T> IncrementalWorker<S, T>
where
    S: MetaStore + Clone + Send + Sync + 'static,
    T: Connector + Clone + Send + Sync + 'static,
{
    async fn run(self) -> SyncResult<()> {
        let Self {
            mapping,
            groups,
            source,
            target,
            meta_store,
            flush_sink,
            stop_rx,
        } = self;

        let (event_tx, event_rx) = create_event_queue(mapping.event_queue_capacity);

        let capture_span = tracing::info_span!("change_capture", mapping_id = mapping.id);
        let capture = tokio::spawn(source.run(event_tx, stop_rx).instrument(capture_span));

        let consumer = EventConsumer {
            mapping,
            groups,
            target,
            meta_store,
            flush_sink,
        };
        let replayed = consumer.replay(event_rx).await;

        if replayed.is_err() {
            // The producer only notices the dropped consumer at its next send; cancel
            // it instead of waiting out a capture interval.
            capture.abort();
        }

        match capture.await {
            Ok(captured) => {
                if let Err(err) = captured {
                    if replayed.is_ok() {
                        return Err(err);
                    }
                    warn!("change capture failed while the replay was failing: {err}");
                }
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                return Err(SyncError::from((
                    ErrorKind::EventWorkerPanic,
                    "Change capture task panicked",
                    join_err.to_string(),
                )));
            }
        }

        replayed
    }
}

/// Consuming half of the incremental run.
struct EventConsumer<S, T> {
    mapping: Arc<MappingConfig>,
    groups: Arc<Vec<TableGroup>>,
    target: T,
    meta_store: S,
    flush_sink: Arc<dyn FlushSink>,
}

impl<S, T> EventConsumer<S, T>
where
    S: MetaStore + Clone + Send + Sync + 'static,
    T: Connector + Clone + Send + Sync + 'static,
{
    /// Replays queued events until the producer side closes the queue.
    async fn replay(&self, mut events: EventRx) -> SyncResult<()> {
        let mapping_id = self.mapping.id;

        while let Some(event) = events.recv().await {
            self.apply_event(event).await?;
        }

        info!(
            "incremental worker for mapping {} drained its event queue",
            mapping_id
        );

        Ok(())
    }

    /// Routes one event to its table group and writes it through.
    async fn apply_event(&self, event: RowChangeEvent) -> SyncResult<()> {
        let Some(group) = self
            .groups
            .iter()
            .find(|group| group.source_table.name == event.table_name)
        else {
            debug!("dropping change event for unmapped table {}", event.table_name);
            return Ok(());
        };

        let operation = event.op.to_string();
        let projected = project_event(group, event, self.mapping.force_update);

        let outcome = self
            .target
            .write_one(
                &group.target_table.name,
                &group.commands,
                group.picker.target_fields(),
                &projected,
            )
            .await?;

        let success = outcome.success;
        let failed = outcome.failed();
        self.meta_store
            .mutate_meta(self.mapping.id, move |meta| {
                meta.success += success;
                meta.fail += failed;
            })
            .await?;

        if failed > 0 {
            warn!(
                "change event {} failed on {}: {}",
                projected, group.target_table.name, outcome.error_trace
            );
        }

        self.flush_sink
            .flush(FlushRecord::from_outcome(
                self.mapping.id,
                operation,
                &outcome,
            ))
            .await;

        Ok(())
    }
}

/// Projects a source-shaped event into target shape, preserving its operation.
///
/// `force_all` is the mapping-level force flag; it widens, never narrows, the event's
/// own replay-safety marker.
fn project_event(group: &TableGroup, event: RowChangeEvent, force_all: bool) -> RowChangeEvent {
    RowChangeEvent {
        table_name: group.target_table.name.clone(),
        op: event.op,
        before: event.before.as_ref().map(|row| project_row(group, row)),
        after: event.after.as_ref().map(|row| project_row(group, row)),
        force_update: event.force_update || force_all,
    }
}

fn project_row(group: &TableGroup, row: &Row) -> Row {
    group
        .project_rows(std::slice::from_ref(row))
        .pop()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::dialect_for;
    use crate::mapping::resolve_table_group;
    use crate::types::{ColumnType, Field, Table, TableKind, Value};
    use config::shared::{FieldMappingConfig, TableGroupConfig};

    fn group() -> TableGroup {
        let source = Table::new(
            "USER",
            TableKind::Table,
            vec![
                Field::primary_key("id", ColumnType::Int),
                Field::new("name", ColumnType::String),
            ],
        );
        let target = Table::new(
            "USER2",
            TableKind::Table,
            vec![
                Field::primary_key("uid", ColumnType::Int),
                Field::new("full_name", ColumnType::String),
            ],
        );
        let spec = TableGroupConfig {
            source_table: "USER".into(),
            target_table: "USER2".into(),
            field_mappings: vec![
                FieldMappingConfig {
                    source: Some("id".into()),
                    target: Some("uid".into()),
                    pk: true,
                },
                FieldMappingConfig {
                    source: Some("name".into()),
                    target: Some("full_name".into()),
                    pk: false,
                },
            ],
            filters: vec![],
            converters: vec![],
        };
        let dialect = dialect_for("mysql").unwrap();
        resolve_table_group(&spec, source, target, dialect, dialect, None).unwrap()
    }

    #[test]
    fn test_projection_rekeys_both_images() {
        let group = group();
        let event = RowChangeEvent::update(
            "USER",
            Some(crate::types::row_from([("id", 1)])),
            crate::types::row_from([("id", Value::from(1)), ("name", Value::from("ada"))]),
        );

        let projected = project_event(&group, event, false);

        assert_eq!(projected.table_name, "USER2");
        let after = projected.after.unwrap();
        assert!(after.contains_key("uid"));
        assert!(after.contains_key("full_name"));
        assert!(!after.contains_key("name"));
        assert!(projected.before.unwrap().contains_key("uid"));
    }

    #[test]
    fn test_mapping_force_flag_widens_the_event() {
        let group = group();
        let event = RowChangeEvent::insert("USER", crate::types::row_from([("id", 1)]));

        assert!(!project_event(&group, event.clone(), false).force_update);
        assert!(project_event(&group, event, true).force_update);
    }
}
