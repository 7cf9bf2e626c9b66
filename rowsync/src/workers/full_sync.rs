use std::sync::Arc;

use config::shared::MappingConfig;
use futures::StreamExt;
use futures::stream;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::concurrency::stop::{StopResult, StopRx};
use crate::connector::Connector;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::flush::{FlushRecord, FlushSink};
use crate::mapping::TableGroup;
use crate::state::PAGE_INDEX_KEY;
use crate::state::store::MetaStore;
use crate::types::{Row, WriteOutcome};
use crate::workers::base::{Worker, WorkerHandle};

/// Operation label under which full sync pages are flushed.
pub const FULL_OPERATION: &str = "full";

#[derive(Debug)]
pub struct FullSyncWorkerHandle {
    handle: Option<JoinHandle<SyncResult<()>>>,
}

impl WorkerHandle<()> for FullSyncWorkerHandle {
    fn state(&self) {}

    async fn wait(mut self) -> SyncResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        handle.await.map_err(|err| {
            SyncError::from((
                ErrorKind::FullSyncWorkerPanic,
                "Full sync worker task panicked",
                err.to_string(),
            ))
        })??;

        Ok(())
    }
}

/// Worker that drives one full run of a mapping.
///
/// Table groups are copied sequentially, one source page at a time. The page position
/// is persisted under [`PAGE_INDEX_KEY`] before the next read, so an interrupted run
/// resumes from the last written page instead of the start. Pages larger than the
/// configured batch size fan out across concurrent target writes.
///
/// The stop signal is observed between pages, never mid-page, so every page that
/// started writing is also accounted and flushed.
#[derive(Debug)]
pub struct FullSyncWorker<S, C, T> {
    mapping: Arc<MappingConfig>,
    groups: Arc<Vec<TableGroup>>,
    source: C,
    target: T,
    meta_store: S,
    flush_sink: Arc<dyn FlushSink>,
    stop_rx: StopRx,
}

impl<S, C, T> FullSyncWorker<S, C, T> {
    pub fn new(
        mapping: Arc<MappingConfig>,
        groups: Arc<Vec<TableGroup>>,
        source: C,
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

impl<S, C, T> Worker<FullSyncWorkerHandle, ()> for FullSyncWorker<S, C, T>
where
    S: MetaStore + Clone + Send + Sync + 'static,
    C: Connector + Clone + Send + Sync + 'static,
    T: Connector + Clone + Send + Sync + 'static,
{
    async fn start(self) -> SyncResult<FullSyncWorkerHandle> {
        info!("starting full sync worker for mapping {}", self.mapping.id);

        let full_sync_worker_span =
            tracing::info_span!("full_sync_worker", mapping_id = self.mapping.id);
        let handle = tokio::spawn(async move { self.run().await }.instrument(full_sync_worker_span));

        Ok(FullSyncWorkerHandle {
            handle: Some(handle),
        })
    }
}

impl<S, C, T> FullSyncWorker<S, C, T>
where
    S: MetaStore + Clone + Send + Sync + 'static,
    C: Connector + Clone + Send + Sync + 'static,
    T: Connector + Clone + Send + Sync + 'static,
{
    async fn run(self) -> SyncResult<()> {
        let mapping_id = self.mapping.id;

        let total = self.count_total().await?;
        self.meta_store
            .mutate_meta(mapping_id, move |meta| meta.total = total)
            .await?;

        info!(
            "full sync of mapping {} covers {} rows across {} table groups",
            self.mapping.name,
            total,
            self.groups.len()
        );

        for group in self.groups.iter() {
            if self.sync_group(group).await?.is_stopped() {
                info!(
                    "full sync worker for mapping {} stopping on request",
                    mapping_id
                );
                return Ok(());
            }
        }

        info!("full sync worker for mapping {} finished", mapping_id);

        Ok(())
    }

    /// Sums the source row counts of every table group.
    async fn count_total(&self) -> SyncResult<u64> {
        let mut total = 0;
        for group in self.groups.iter() {
            total += self
                .source
                .count(&group.source_table.name, &group.commands.query_count)
                .await?;
        }
        Ok(total)
    }

    /// Copies one table group page by page until the source is drained.
    async fn sync_group(&self, group: &TableGroup) -> SyncResult<StopResult<(), ()>> {
        let mapping_id = self.mapping.id;
        let page_size = self.mapping.page_size;
        let table = &group.source_table.name;

        info!(
            "syncing table group {} -> {}",
            table, group.target_table.name
        );

        loop {
            if self.stop_requested() {
                return Ok(StopResult::Stopped(()));
            }

            let meta = self.meta_store.get_or_create_meta(mapping_id).await?;
            let page_index = meta.page_index();

            let rows = self
                .source
                .read(
                    table,
                    &group.commands.query,
                    group.page_args(page_index, page_size),
                )
                .await?;
            if rows.is_empty() {
                self.meta_store
                    .mutate_meta(mapping_id, |meta| {
                        meta.checkpoint.remove(PAGE_INDEX_KEY);
                    })
                    .await?;
                debug!("table group {} drained after {} pages", table, page_index - 1);
                return Ok(StopResult::Ok(()));
            }

            debug!("read page {} of {} with {} rows", page_index, table, rows.len());

            let targets = group.project_rows(&rows);
            let outcome = self.write_page(group, targets).await?;

            let success = outcome.success;
            let failed = outcome.failed();
            self.meta_store
                .mutate_meta(mapping_id, move |meta| {
                    meta.success += success;
                    meta.fail += failed;
                    meta.checkpoint
                        .insert(PAGE_INDEX_KEY.to_string(), (page_index + 1).to_string());
                })
                .await?;

            if failed > 0 {
                warn!(
                    "page {} of {} wrote {} rows and failed {}",
                    page_index, table, success, failed
                );
            }

            self.flush_sink
                .flush(FlushRecord::from_outcome(mapping_id, FULL_OPERATION, &outcome))
                .await;
        }
    }

    /// Writes one projected page, fanning out across write workers when the page
    /// exceeds the batch size.
    async fn write_page(&self, group: &TableGroup, rows: Vec<Row>) -> SyncResult<WriteOutcome> {
        let batch_size = self.mapping.batch_size;
        let table = &group.target_table.name;
        let fields = group.picker.target_fields();

        if rows.len() <= batch_size {
            return self
                .target
                .write_batch(table, &group.commands.insert, fields, rows)
                .await;
        }

        let writes = stream::iter(chunk_rows(rows, batch_size))
            .map(|chunk| {
                self.target
                    .write_batch(table, &group.commands.insert, fields, chunk)
            })
            .buffer_unordered(self.mapping.max_write_workers as usize)
            .collect::<Vec<_>>()
            .await;

        let mut outcome = WriteOutcome::new();
        for write in writes {
            outcome.merge(write?);
        }

        Ok(outcome)
    }

    fn stop_requested(&self) -> bool {
        // A dropped sender reads as a stop request.
        self.stop_rx.has_changed().unwrap_or(true)
    }
}

/// Splits a page into write chunks of at most `batch_size` rows.
fn chunk_rows(mut rows: Vec<Row>, batch_size: usize) -> Vec<Vec<Row>> {
    let mut chunks = Vec::with_capacity(rows.len().div_ceil(batch_size));
    while rows.len() > batch_size {
        let tail = rows.split_off(batch_size);
        chunks.push(rows);
        rows = tail;
    }
    chunks.push(rows);
    chunks
}
