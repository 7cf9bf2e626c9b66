#![cfg(feature = "test-utils")]

use std::sync::Arc;

use config::shared::SyncModel;
use telemetry::init_test_tracing;

use rowsync::concurrency::stop::create_stop_channel;
use rowsync::flush::MemoryFlushSink;
use rowsync::manager::SyncManager;
use rowsync::state::store::{MemoryMetaStore, MetaStore};
use rowsync::state::{MetaState, PAGE_INDEX_KEY};
use rowsync::test_utils::group::{
    empty_target, seeded_source, target_with, user2_row, user_group, user_job, user_mapping,
    user_rows,
};
use rowsync::test_utils::sink::NotifyingFlushSink;
use rowsync::workers::base::{Worker, WorkerHandle};
use rowsync::workers::full_sync::{FULL_OPERATION, FullSyncWorker};

#[tokio::test(flavor = "multi_thread")]
async fn full_run_copies_every_page_and_goes_back_to_ready() {
    init_test_tracing();

    let source = seeded_source(user_rows(5)).await;
    let target = empty_target().await;
    let meta_store = MemoryMetaStore::new();
    let sink = Arc::new(MemoryFlushSink::new());
    let manager = SyncManager::new(meta_store.clone(), sink.clone());

    manager
        .register(user_job(user_mapping(SyncModel::Full), &source, &target))
        .await
        .unwrap();
    manager.start(1).await.unwrap();
    manager.wait_for_completion(1).await;

    assert!(!manager.is_running(1).await);

    let rows = target.snapshot("USER2").await;
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], user2_row(1, "user_1"));
    assert_eq!(rows[4], user2_row(5, "user_5"));

    // Two full pages, the trailing short page, and the empty read that ends the scan.
    assert_eq!(source.read_calls().await, 4);

    let meta = meta_store.get_meta(1).await.unwrap().unwrap();
    assert_eq!(meta.state, MetaState::Ready);
    assert_eq!(meta.total, 5);
    assert_eq!(meta.success, 5);
    assert_eq!(meta.fail, 0);
    assert!(meta.checkpoint.is_empty());
    assert!(meta.begin_at.is_some());
    assert!(meta.end_at.is_some());

    let records = sink.records().await;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|record| record.operation == FULL_OPERATION));
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_target_rows_are_reported_not_overwritten() {
    init_test_tracing();

    let source = seeded_source(user_rows(3)).await;
    let target = target_with(vec![user2_row(2, "kept")]).await;
    let meta_store = MemoryMetaStore::new();
    let sink = Arc::new(MemoryFlushSink::new());
    let manager = SyncManager::new(meta_store.clone(), sink.clone());

    manager
        .register(user_job(user_mapping(SyncModel::Full), &source, &target))
        .await
        .unwrap();
    manager.start(1).await.unwrap();
    manager.wait_for_completion(1).await;

    let rows = target.snapshot("USER2").await;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], user2_row(2, "kept"));

    let meta = meta_store.get_meta(1).await.unwrap().unwrap();
    assert_eq!(meta.total, 3);
    assert_eq!(meta.success, 2);
    assert_eq!(meta.fail, 1);

    // The failed row comes back through the audit trail with its key intact.
    let records = sink.records().await;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].failed(), 1);
    assert!(records[0].error_trace.contains("Duplicate key"));
    assert_eq!(
        records[0].failed_rows[0],
        user2_row(2, "user_2")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_request_parks_the_run_mid_scan() {
    init_test_tracing();

    let source = seeded_source(user_rows(10_000)).await;
    let target = empty_target().await;
    let meta_store = MemoryMetaStore::new();
    let sink = NotifyingFlushSink::new();
    let manager = SyncManager::new(meta_store.clone(), Arc::new(sink.clone()));

    manager
        .register(user_job(user_mapping(SyncModel::Full), &source, &target))
        .await
        .unwrap();

    let first_page_written = sink.wait_for_records(FULL_OPERATION, 1).await;
    manager.start(1).await.unwrap();
    first_page_written.notified().await;

    manager.stop(1).await.unwrap();
    manager.wait_for_completion(1).await;

    assert!(!manager.is_running(1).await);

    let copied = target.snapshot("USER2").await.len();
    assert!(copied >= 2);
    assert!(copied < 10_000);

    let meta = meta_store.get_meta(1).await.unwrap().unwrap();
    assert_eq!(meta.state, MetaState::Ready);
    assert!(meta.end_at.is_some());
    // A parked scan keeps its page marker; only a drained table group clears it.
    assert!(meta.checkpoint.contains_key(PAGE_INDEX_KEY));
}

#[tokio::test(flavor = "multi_thread")]
async fn scan_resumes_from_a_persisted_page_marker() {
    init_test_tracing();

    let source = seeded_source(user_rows(5)).await;
    let target = empty_target().await;
    let meta_store = MemoryMetaStore::new();
    meta_store
        .mutate_meta(1, |meta| {
            meta.checkpoint
                .insert(PAGE_INDEX_KEY.to_string(), "2".to_string());
        })
        .await
        .unwrap();

    let (stop_tx, stop_rx) = create_stop_channel();
    let worker = FullSyncWorker::new(
        Arc::new(user_mapping(SyncModel::Full)),
        Arc::new(vec![user_group()]),
        source.clone(),
        target.clone(),
        meta_store.clone(),
        Arc::new(MemoryFlushSink::new()),
        stop_rx,
    );

    let handle = worker.start().await.unwrap();
    handle.wait().await.unwrap();
    drop(stop_tx);

    // Page one was accounted for by the interrupted run; the scan picks up at page two.
    let rows = target.snapshot("USER2").await;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0], user2_row(3, "user_3"));
    assert_eq!(rows[2], user2_row(5, "user_5"));
}
