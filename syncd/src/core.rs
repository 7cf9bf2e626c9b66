use config::shared::{ConnectorConfig, MappingConfig, SyncdConfig};
use rowsync::commands::dialect_for;
use rowsync::connector::{Connector, ConnectorClient};
use rowsync::flush::LogFlushSink;
use rowsync::manager::{SyncJob, SyncManager};
use rowsync::mapping::{TableGroup, resolve_table_group};
use rowsync::state::store::{MemoryMetaStore, MetaStore};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info};

/// Starts the sync daemon with the provided configuration.
///
/// Connects both stores, resolves the configured table groups against their live
/// schemas, and runs the mapping until it drains or a shutdown signal arrives.
pub async fn start_syncd_with_config(syncd_config: SyncdConfig) -> anyhow::Result<()> {
    info!("starting syncd service");

    log_config(&syncd_config);

    let source = ConnectorClient::connect(&syncd_config.source).await?;
    let target = ConnectorClient::connect(&syncd_config.target).await?;

    let groups = resolve_groups(&syncd_config, &source, &target).await?;

    let job = SyncJob {
        mapping: Arc::new(syncd_config.mapping),
        groups: Arc::new(groups),
        source,
        target,
    };
    run_job(job).await?;

    info!("syncd service completed");

    Ok(())
}

fn log_config(config: &SyncdConfig) {
    log_connector_config("source", &config.source);
    log_connector_config("target", &config.target);
    log_mapping_config(&config.mapping);
}

fn log_connector_config(side: &'static str, config: &ConnectorConfig) {
    match config {
        ConnectorConfig::Memory => {
            debug!(side, "using memory connector config");
        }
        ConnectorConfig::Postgres(config) => {
            debug!(
                side,
                host = config.host,
                port = config.port,
                dbname = config.name,
                username = config.username,
                tls_enabled = config.tls.enabled,
                "using postgres connector config"
            );
        }
    }
}

fn log_mapping_config(config: &MappingConfig) {
    debug!(
        mapping_id = config.id,
        name = config.name,
        model = ?config.model,
        page_size = config.page_size,
        batch_size = config.batch_size,
        max_write_workers = config.max_write_workers,
        event_queue_capacity = config.event_queue_capacity,
        force_update = config.force_update,
        table_groups = config.groups.len(),
        "mapping config"
    );

    if let Some(polling) = &config.polling {
        debug!(
            interval_ms = polling.interval_ms,
            event_field = polling.event_field,
            "change polling config"
        );
    }
}

/// Resolves every configured table group against the live schemas.
///
/// Each side is introspected on its own store and renders identifiers in its own
/// dialect, so the generated commands bind to real columns on both ends.
async fn resolve_groups(
    config: &SyncdConfig,
    source: &ConnectorClient,
    target: &ConnectorClient,
) -> anyhow::Result<Vec<TableGroup>> {
    let source_dialect = dialect_for(config.source.dialect())?;
    let target_dialect = dialect_for(config.target.dialect())?;

    let mut groups = Vec::with_capacity(config.mapping.groups.len());
    for group_config in &config.mapping.groups {
        let source_table = source.introspect(&group_config.source_table).await?;
        let target_table = target.introspect(&group_config.target_table).await?;

        groups.push(resolve_table_group(
            group_config,
            source_table,
            target_table,
            source_dialect,
            target_dialect,
            None,
        )?);
    }

    Ok(groups)
}

/// Runs a registered job and handles graceful shutdown signals.
///
/// A full run finishes when its scan drains; an incremental run only finishes through
/// a stop request. SIGINT and SIGTERM both translate into a stop request, which parks
/// the run at the next page or event boundary.
#[tracing::instrument(skip(job), fields(mapping_id = job.mapping.id))]
async fn run_job(job: SyncJob) -> anyhow::Result<()> {
    let mapping_id = job.mapping.id;

    let meta_store = MemoryMetaStore::new();
    let manager = SyncManager::new(meta_store.clone(), Arc::new(LogFlushSink::new()));

    manager.register(job).await?;
    manager.start(mapping_id).await?;

    // Spawn a task to listen for shutdown signals and request a stop.
    let stop_manager = manager.clone();
    let shutdown_handle = tokio::spawn(async move {
        // Listen for SIGTERM, sent by Kubernetes before SIGKILL during pod termination.
        //
        // If the process is killed before the stop completes, rows already flushed
        // remain in the target; the next start runs a fresh scan.
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT (Ctrl+C) received, stopping run");
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, stopping run");
            }
        }

        stop_manager.stop_all().await;

        info!("run stopped successfully")
    });

    // Wait for the run to finish (either on its own or via a stop request).
    manager.wait_for_completion(mapping_id).await;

    // Ensure the shutdown task is finished before returning.
    // If the run drained before any signal, the task is still parked on the signals
    // and has to be aborted; if a signal arrived, it already requested the stop.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    if let Some(meta) = meta_store.get_meta(mapping_id).await? {
        info!(
            success = meta.success,
            fail = meta.fail,
            total = meta.total,
            "run finished"
        );
    }

    Ok(())
}
