use std::collections::HashMap;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use config::shared::{MappingConfig, SyncModel};
use futures::future::BoxFuture;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info};

use crate::bail;
use crate::capture::PollingSource;
use crate::concurrency::stop::{StopRx, StopTx, create_stop_channel};
use crate::connector::ConnectorClient;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::flush::FlushSink;
use crate::mapping::TableGroup;
use crate::state::MetaState;
use crate::state::store::MetaStore;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::full_sync::FullSyncWorker;
use crate::workers::incremental::IncrementalWorker;

/// A registered synchronization job: the mapping, its resolved table groups, and the
/// two connected endpoints.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub mapping: Arc<MappingConfig>,
    pub groups: Arc<Vec<TableGroup>>,
    pub source: ConnectorClient,
    pub target: ConnectorClient,
}

#[derive(Debug)]
struct ManagerInner<S> {
    meta_store: S,
    flush_sink: Arc<dyn FlushSink>,
    jobs: Mutex<HashMap<u64, SyncJob>>,
    /// Stop handles of the live runs, keyed by mapping id.
    registry: Mutex<HashMap<u64, StopTx>>,
    run_update: Notify,
}

/// Owner of every run lifecycle.
///
/// The manager keeps the registered jobs and at most one live run per mapping id. A
/// start transitions the run record to running and spawns the model's worker; a stop
/// signals the run and returns without waiting. Completion, successful or not, removes
/// the run from the registry and returns the record to ready, so a mapping can always
/// be restarted after its previous run ended.
///
/// Clones share the same registry.
#[derive(Debug, Clone)]
pub struct SyncManager<S> {
    inner: Arc<ManagerInner<S>>,
}

impl<S> SyncManager<S>
where
    S: MetaStore + Clone + Send + Sync + 'static,
{
    pub fn new(meta_store: S, flush_sink: Arc<dyn FlushSink>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                meta_store,
                flush_sink,
                jobs: Mutex::new(HashMap::new()),
                registry: Mutex::new(HashMap::new()),
                run_update: Notify::new(),
            }),
        }
    }

    /// Registers a job, replacing any previous registration of the same mapping id.
    ///
    /// Fails with [`ErrorKind::InvalidState`] while the mapping has a live run. The
    /// registry lock is held across the edit so a concurrent start cannot slip between
    /// the liveness check and the replacement.
    pub async fn register(&self, job: SyncJob) -> SyncResult<()> {
        let registry = self.inner.registry.lock().await;
        if registry.contains_key(&job.mapping.id) {
            bail!(
                ErrorKind::InvalidState,
                "Mapping has a live run and cannot be edited",
                format!("mapping {}", job.mapping.id)
            );
        }

        let mut jobs = self.inner.jobs.lock().await;
        jobs.insert(job.mapping.id, job);

        Ok(())
    }

    /// Whether the mapping has a live run in this manager.
    pub async fn is_running(&self, mapping_id: u64) -> bool {
        self.inner.registry.lock().await.contains_key(&mapping_id)
    }

    /// Starts a run of the registered mapping.
    ///
    /// Clears the run record, transitions it to running, and spawns the worker for the
    /// mapping's model. Fails with [`ErrorKind::AlreadyRunning`] when a run is live.
    pub async fn start(&self, mapping_id: u64) -> SyncResult<()> {
        let job = {
            let jobs = self.inner.jobs.lock().await;
            match jobs.get(&mapping_id) {
                Some(job) => job.clone(),
                None => bail!(
                    ErrorKind::MetaNotFound,
                    "No job registered under this mapping id",
                    format!("mapping {mapping_id}")
                ),
            }
        };

        let mut registry = self.inner.registry.lock().await;
        if registry.contains_key(&mapping_id) {
            bail!(
                ErrorKind::AlreadyRunning,
                "Mapping already has a live run",
                format!("mapping {mapping_id}")
            );
        }

        self.inner
            .meta_store
            .mutate_meta(mapping_id, |meta| {
                meta.clear();
                meta.state = MetaState::Running;
                meta.begin_at = Some(Utc::now());
            })
            .await?;

        info!(
            "starting {} run of mapping {} ({})",
            model_name(job.mapping.model),
            mapping_id,
            job.mapping.name
        );

        let (stop_tx, stop_rx) = create_stop_channel();
        let completion = match self.spawn_worker(&job, stop_rx).await {
            Ok(completion) => completion,
            Err(err) => {
                // A worker that never started leaves no run to finalize.
                self.inner
                    .meta_store
                    .mutate_meta(mapping_id, |meta| meta.state = MetaState::Ready)
                    .await?;
                return Err(err);
            }
        };

        let manager = self.clone();
        tokio::spawn(async move {
            manager.watch_run(mapping_id, completion).await;
        });

        registry.insert(mapping_id, stop_tx);

        Ok(())
    }

    /// Requests a stop of the mapping's live run.
    ///
    /// The run record moves to stopping immediately; the run itself winds down at its
    /// next boundary and publishes completion like any other run end. Fails with
    /// [`ErrorKind::NotRunning`] when no run is live.
    pub async fn stop(&self, mapping_id: u64) -> SyncResult<()> {
        let registry = self.inner.registry.lock().await;
        let Some(stop_tx) = registry.get(&mapping_id) else {
            bail!(
                ErrorKind::NotRunning,
                "Mapping has no live run",
                format!("mapping {mapping_id}")
            );
        };

        self.inner
            .meta_store
            .mutate_meta(mapping_id, |meta| meta.state = MetaState::Stopping)
            .await?;

        info!("stop requested for mapping {}", mapping_id);

        // The run may complete on its own between lookup and signal.
        let _ = stop_tx.stop();

        Ok(())
    }

    /// Requests a stop of every live run.
    pub async fn stop_all(&self) {
        let mapping_ids: Vec<u64> = {
            let registry = self.inner.registry.lock().await;
            registry.keys().copied().collect()
        };

        for mapping_id in mapping_ids {
            if let Err(err) = self.stop(mapping_id).await {
                // A run that completed since the snapshot needs no stop.
                if err.kind() != ErrorKind::NotRunning {
                    error!("failed to stop mapping {}: {err}", mapping_id);
                }
            }
        }
    }

    /// Waits until the mapping's live run has fully completed and deregistered.
    ///
    /// Returns immediately when no run is live.
    pub async fn wait_for_completion(&self, mapping_id: u64) {
        self.wait_while(|registry| registry.contains_key(&mapping_id))
            .await;
    }

    /// Waits until no run is live in this manager.
    pub async fn wait_all(&self) {
        self.wait_while(|registry| !registry.is_empty()).await;
    }

    async fn wait_while<F>(&self, busy: F)
    where
        F: Fn(&HashMap<u64, StopTx>) -> bool,
    {
        loop {
            let mut notified = pin!(self.inner.run_update.notified());

            {
                let registry = self.inner.registry.lock().await;
                if !busy(&registry) {
                    return;
                }
                // Enabled under the lock so a completion between unlock and await is
                // not missed.
                notified.as_mut().enable();
            }

            notified.await;
        }
    }

    async fn spawn_worker(
        &self,
        job: &SyncJob,
        stop_rx: StopRx,
    ) -> SyncResult<BoxFuture<'static, SyncResult<()>>> {
        match job.mapping.model {
            SyncModel::Full => {
                let worker = FullSyncWorker::new(
                    job.mapping.clone(),
                    job.groups.clone(),
                    job.source.clone(),
                    job.target.clone(),
                    self.inner.meta_store.clone(),
                    self.inner.flush_sink.clone(),
                    stop_rx,
                );
                let handle = worker.start().await?;
                Ok(Box::pin(handle.wait()))
            }
            SyncModel::Increment => {
                let Some(polling) = job.mapping.polling.clone() else {
                    bail!(
                        ErrorKind::ConfigError,
                        "Increment mapping has no polling settings",
                        format!("mapping {}", job.mapping.id)
                    );
                };

                let source = PollingSource::new(
                    job.source.clone(),
                    self.inner.meta_store.clone(),
                    job.mapping.id,
                    job.groups.as_ref().clone(),
                    polling.event_field,
                    Duration::from_millis(polling.interval_ms),
                    job.mapping.page_size,
                );
                let worker = IncrementalWorker::new(
                    job.mapping.clone(),
                    job.groups.clone(),
                    Box::new(source),
                    job.target.clone(),
                    self.inner.meta_store.clone(),
                    self.inner.flush_sink.clone(),
                    stop_rx,
                );
                let handle = worker.start().await?;
                Ok(Box::pin(handle.wait()))
            }
        }
    }

    /// Drives one run to completion and publishes the completion transition.
    async fn watch_run(&self, mapping_id: u64, completion: BoxFuture<'static, SyncResult<()>>) {
        match completion.await {
            Ok(()) => info!("run of mapping {} completed", mapping_id),
            Err(err) => error!("run of mapping {} failed: {err}", mapping_id),
        }

        if let Err(err) = self.finalize_run(mapping_id).await {
            error!("failed to finalize run of mapping {}: {err}", mapping_id);
        }
    }

    /// Deregisters the run and returns its record to ready.
    async fn finalize_run(&self, mapping_id: u64) -> SyncResult<()> {
        let mut registry = self.inner.registry.lock().await;
        registry.remove(&mapping_id);

        self.inner
            .meta_store
            .mutate_meta(mapping_id, |meta| {
                meta.state = MetaState::Ready;
                meta.end_at = Some(Utc::now());
            })
            .await?;

        self.inner.run_update.notify_waiters();

        Ok(())
    }
}

fn model_name(model: SyncModel) -> &'static str {
    match model {
        SyncModel::Full => "full",
        SyncModel::Increment => "increment",
    }
}
