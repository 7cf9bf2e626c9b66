#![cfg(feature = "test-utils")]

use std::sync::Arc;

use config::shared::SyncModel;
use telemetry::init_test_tracing;

use rowsync::error::ErrorKind;
use rowsync::flush::MemoryFlushSink;
use rowsync::manager::SyncManager;
use rowsync::state::MetaState;
use rowsync::state::store::{MemoryMetaStore, MetaStore};
use rowsync::test_utils::group::{empty_target, seeded_source, user_job, user_mapping, user_rows};

fn manager() -> SyncManager<MemoryMetaStore> {
    SyncManager::new(MemoryMetaStore::new(), Arc::new(MemoryFlushSink::new()))
}

#[tokio::test(flavor = "multi_thread")]
async fn second_start_of_a_live_mapping_is_rejected() {
    init_test_tracing();

    let source = seeded_source(user_rows(10_000)).await;
    let target = empty_target().await;
    let manager = manager();

    manager
        .register(user_job(user_mapping(SyncModel::Full), &source, &target))
        .await
        .unwrap();
    manager.start(1).await.unwrap();

    let err = manager.start(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyRunning);

    manager.stop(1).await.unwrap();
    manager.wait_for_completion(1).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_without_a_live_run_is_rejected() {
    init_test_tracing();

    let source = seeded_source(user_rows(2)).await;
    let target = empty_target().await;
    let manager = manager();

    manager
        .register(user_job(user_mapping(SyncModel::Full), &source, &target))
        .await
        .unwrap();

    let err = manager.stop(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotRunning);
}

#[tokio::test(flavor = "multi_thread")]
async fn start_of_an_unregistered_mapping_is_rejected() {
    init_test_tracing();

    let manager = manager();

    let err = manager.start(9).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MetaNotFound);
}

#[tokio::test(flavor = "multi_thread")]
async fn registration_is_blocked_while_a_run_is_live() {
    init_test_tracing();

    let source = seeded_source(user_rows(10_000)).await;
    let target = empty_target().await;
    let manager = manager();

    let job = user_job(user_mapping(SyncModel::Full), &source, &target);
    manager.register(job.clone()).await.unwrap();
    manager.start(1).await.unwrap();

    let err = manager.register(job.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    manager.stop(1).await.unwrap();
    manager.wait_for_completion(1).await;

    // A parked mapping is editable again.
    manager.register(job).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn increment_mapping_without_polling_settings_fails_cleanly() {
    init_test_tracing();

    let source = seeded_source(user_rows(2)).await;
    let target = empty_target().await;
    let meta_store = MemoryMetaStore::new();
    let manager = SyncManager::new(meta_store.clone(), Arc::new(MemoryFlushSink::new()));

    let mut mapping = user_mapping(SyncModel::Increment);
    mapping.polling = None;
    manager
        .register(user_job(mapping, &source, &target))
        .await
        .unwrap();

    let err = manager.start(1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigError);

    // The failed start leaves no live run behind.
    assert!(!manager.is_running(1).await);
    let meta = meta_store.get_meta(1).await.unwrap().unwrap();
    assert_eq!(meta.state, MetaState::Ready);
}

#[tokio::test(flavor = "multi_thread")]
async fn counters_reset_when_a_mapping_restarts() {
    init_test_tracing();

    let source = seeded_source(user_rows(3)).await;
    let target = empty_target().await;
    let meta_store = MemoryMetaStore::new();
    let manager = SyncManager::new(meta_store.clone(), Arc::new(MemoryFlushSink::new()));

    manager
        .register(user_job(user_mapping(SyncModel::Full), &source, &target))
        .await
        .unwrap();
    manager.start(1).await.unwrap();
    manager.wait_for_completion(1).await;

    let meta = meta_store.get_meta(1).await.unwrap().unwrap();
    assert_eq!(meta.success, 3);

    // The second scan runs against the rows the first one wrote.
    manager.start(1).await.unwrap();
    manager.wait_for_completion(1).await;

    let meta = meta_store.get_meta(1).await.unwrap().unwrap();
    assert_eq!(meta.state, MetaState::Ready);
    assert_eq!(meta.total, 3);
    assert_eq!(meta.success, 0);
    assert_eq!(meta.fail, 3);

    manager.wait_all().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_all_parks_every_live_run() {
    init_test_tracing();

    let source_one = seeded_source(user_rows(10_000)).await;
    let target_one = empty_target().await;
    let source_two = seeded_source(user_rows(10_000)).await;
    let target_two = empty_target().await;
    let meta_store = MemoryMetaStore::new();
    let manager = SyncManager::new(meta_store.clone(), Arc::new(MemoryFlushSink::new()));

    let mut second = user_mapping(SyncModel::Full);
    second.id = 2;

    manager
        .register(user_job(
            user_mapping(SyncModel::Full),
            &source_one,
            &target_one,
        ))
        .await
        .unwrap();
    manager
        .register(user_job(second, &source_two, &target_two))
        .await
        .unwrap();
    manager.start(1).await.unwrap();
    manager.start(2).await.unwrap();

    manager.stop_all().await;
    manager.wait_all().await;

    assert!(!manager.is_running(1).await);
    assert!(!manager.is_running(2).await);
    for mapping_id in [1, 2] {
        let meta = meta_store.get_meta(mapping_id).await.unwrap().unwrap();
        assert_eq!(meta.state, MetaState::Ready);
    }
}
