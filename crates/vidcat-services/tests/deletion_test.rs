use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vidcat_core::models::{FinalizedEvent, RegisteredEvent, Video};
use vidcat_core::{AppError, GatewayConfig};
use vidcat_db::{CatalogStore, InMemoryCatalogStore};
use vidcat_services::{CatalogService, DeletionOrchestrator, DeletionOutcome, StorageGateway};
use vidcat_storage::{InMemoryStorage, StorageCall};

const RAW: &str = "raw/user123/u1.mp4";
const THUMBNAIL: &str = "thumbnails/user123/u1.jpg";
const MANIFEST: &str = "hls/user123/u1/master.m3u8";
const SEGMENT: &str = "hls/user123/u1/720p/seg0.ts";
const PREVIEW: &str = "videos/user123/u1/preview.gif";
const NEIGHBOUR: &str = "hls/user123/u10/master.m3u8";

struct Harness {
    service: CatalogService,
    store: Arc<InMemoryCatalogStore>,
    storage: Arc<InMemoryStorage>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryCatalogStore::new());
    let storage = Arc::new(InMemoryStorage::with_objects([
        RAW, THUMBNAIL, MANIFEST, SEGMENT, PREVIEW, NEIGHBOUR,
    ]));
    let gateway = StorageGateway::new(storage.clone(), &GatewayConfig::default());
    let deletion = DeletionOrchestrator::new(store.clone(), gateway);
    Harness {
        service: CatalogService::new(store.clone(), deletion, Duration::from_secs(30)),
        store,
        storage,
    }
}

async fn seed(service: &CatalogService) -> Video {
    let registered: RegisteredEvent = serde_json::from_value(json!({
        "externalId": "u1",
        "ownerId": "user123",
        "title": "My Clip",
        "rawObjectPath": RAW
    }))
    .unwrap();
    let finalized: FinalizedEvent = serde_json::from_value(json!({
        "externalId": "u1",
        "ownerId": "user123",
        "manifestUrl": "https://cdn.example.com/hls/user123/u1/master.m3u8"
    }))
    .unwrap();
    service.register_asset(&registered).await.unwrap();
    service.finalize_asset(&finalized).await.unwrap()
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

#[tokio::test(start_paused = true)]
async fn test_delete_completely_removes_objects_then_row() {
    let h = harness();
    let video = seed(&h.service).await;

    let report = h
        .service
        .delete_asset_completely(video.id, far_deadline())
        .await
        .unwrap();

    assert_eq!(report.outcome, DeletionOutcome::Complete);
    assert_eq!(report.objects_deleted, 2);
    assert_eq!(report.objects_skipped, 0);
    assert_eq!(report.objects_deleted_under_prefixes(), 3);
    assert!(report.failures.is_empty());
    assert!(!report.storage_bypassed);
    assert_eq!(h.storage.keys(), vec![NEIGHBOUR]);
    assert!(h.store.find_by_id(video.id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_delete_is_not_found_without_storage_calls() {
    let h = harness();
    let video = seed(&h.service).await;
    h.service
        .delete_asset_completely(video.id, far_deadline())
        .await
        .unwrap();

    h.storage.clear_calls();
    let result = h
        .service
        .delete_asset_completely(video.id, far_deadline())
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(h.storage.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_thumbnail_failure_still_removes_row() {
    let h = harness();
    let video = seed(&h.service).await;
    h.storage.fail_key(THUMBNAIL);

    let report = h
        .service
        .delete_asset_completely(video.id, far_deadline())
        .await
        .unwrap();

    assert_eq!(report.outcome, DeletionOutcome::PartialStorageFailure);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].location, THUMBNAIL);
    assert_eq!(report.objects_deleted_under_prefixes(), 3);
    assert!(h.storage.contains(THUMBNAIL));
    assert!(!h.storage.contains(SEGMENT));
    assert!(h.store.find_by_id(video.id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_storage_trips_breaker_and_continues() {
    let h = harness();
    let video = seed(&h.service).await;
    h.storage.set_unavailable(true);

    let report = h
        .service
        .delete_asset_completely(video.id, far_deadline())
        .await
        .unwrap();

    assert_eq!(report.outcome, DeletionOutcome::PartialStorageFailure);
    // two objects and two prefixes
    assert_eq!(report.failures.len(), 4);
    // the breaker opened on the fifth failure; nothing reached the backend afterwards
    assert_eq!(h.storage.call_count(), 5);
    assert!(h.store.find_by_id(video.id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_row_delete_failure_keeps_row_and_retry_skips_removed_objects() {
    let h = harness();
    let video = seed(&h.service).await;
    h.store.set_fail_deletes(true).await;

    let result = h
        .service
        .delete_asset_completely(video.id, far_deadline())
        .await;
    assert!(matches!(result, Err(AppError::Database(_))));
    assert!(h.store.find_by_id(video.id).await.unwrap().is_some());
    assert_eq!(h.storage.keys(), vec![NEIGHBOUR]);

    h.store.set_fail_deletes(false).await;
    h.storage.clear_calls();
    let report = h
        .service
        .delete_asset_completely(video.id, far_deadline())
        .await
        .unwrap();

    assert_eq!(report.outcome, DeletionOutcome::Complete);
    assert_eq!(report.objects_deleted, 0);
    assert_eq!(report.objects_skipped, 2);
    assert!(!h
        .storage
        .calls()
        .iter()
        .any(|c| matches!(c, StorageCall::Delete(_))));
    assert!(h.store.find_by_id(video.id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_storage_pass_and_keeps_row() {
    let h = harness();
    let video = seed(&h.service).await;
    h.storage.set_latency(Some(Duration::from_secs(1)));

    let deadline = Instant::now() + Duration::from_millis(2500);
    let result = h.service.delete_asset_completely(video.id, deadline).await;

    assert!(matches!(result, Err(AppError::DeadlineExceeded(_))));
    assert!(!h.storage.contains(RAW));
    assert!(h.storage.contains(THUMBNAIL));
    assert!(h.store.find_by_id(video.id).await.unwrap().is_some());

    h.storage.set_latency(None);
    let report = h
        .service
        .delete_asset_completely(video.id, far_deadline())
        .await
        .unwrap();
    assert_eq!(report.outcome, DeletionOutcome::Complete);
    assert_eq!(report.objects_skipped, 1);
    assert_eq!(report.objects_deleted, 1);
    assert_eq!(h.storage.keys(), vec![NEIGHBOUR]);
}

#[tokio::test(start_paused = true)]
async fn test_failure_without_time_to_retry_is_partial_not_fatal() {
    let h = harness();
    let video = seed(&h.service).await;
    h.storage.fail_key(THUMBNAIL);

    // shorter than the first backoff, so the thumbnail gets a single attempt
    let deadline = Instant::now() + Duration::from_millis(150);
    let report = h
        .service
        .delete_asset_completely(video.id, deadline)
        .await
        .unwrap();

    assert_eq!(report.outcome, DeletionOutcome::PartialStorageFailure);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].location, THUMBNAIL);
    assert_eq!(report.objects_deleted_under_prefixes(), 3);
    assert_eq!(h.storage.keys(), vec![NEIGHBOUR, THUMBNAIL]);
    assert!(h.store.find_by_id(video.id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_database_only_mode_leaves_storage_untouched() {
    let h = harness();
    let video = seed(&h.service).await;

    let service = CatalogService::new(
        h.store.clone(),
        DeletionOrchestrator::database_only(h.store.clone()),
        Duration::from_secs(30),
    );
    let report = service
        .delete_asset_completely(video.id, service.default_deadline())
        .await
        .unwrap();

    assert!(report.storage_bypassed);
    assert_eq!(report.outcome, DeletionOutcome::Complete);
    assert_eq!(h.storage.call_count(), 0);
    assert_eq!(h.storage.keys().len(), 6);
    assert!(h.store.find_by_id(video.id).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missing_record_is_not_found() {
    let h = harness();
    let result = h.service.delete_asset_completely(42, far_deadline()).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(h.storage.call_count(), 0);
}
