use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vidcat_core::models::VideoStatus;
use vidcat_core::{AppError, GatewayConfig};
use vidcat_db::{CatalogStore, InMemoryCatalogStore};
use vidcat_services::{CatalogService, DeletionOrchestrator, StorageGateway};
use vidcat_storage::InMemoryStorage;
use vidcat_worker::{
    process_event, ConsumerConfig, EventConsumerPool, EventStream, InMemoryChannel,
};

struct Harness {
    service: CatalogService,
    store: Arc<InMemoryCatalogStore>,
    registered: Arc<InMemoryChannel>,
    finalized: Arc<InMemoryChannel>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryCatalogStore::new());
    let gateway = StorageGateway::new(
        Arc::new(InMemoryStorage::new()),
        &GatewayConfig::default(),
    );
    let deletion = DeletionOrchestrator::new(store.clone(), gateway);
    Harness {
        service: CatalogService::new(store.clone(), deletion, Duration::from_secs(30)),
        store,
        registered: Arc::new(
            InMemoryChannel::new("registered").with_wait(Duration::from_millis(20)),
        ),
        finalized: Arc::new(InMemoryChannel::new("finalized").with_wait(Duration::from_millis(20))),
    }
}

impl Harness {
    fn start(&self, config: ConsumerConfig) -> EventConsumerPool {
        EventConsumerPool::start(
            self.service.clone(),
            self.registered.clone(),
            self.finalized.clone(),
            config,
        )
    }
}

async fn eventually<F>(check: F)
where
    F: Fn() -> bool,
{
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn registration() -> String {
    json!({
        "externalId": "u1",
        "ownerId": "user123",
        "title": "My Clip",
        "rawObjectPath": "raw/user123/u1.mp4"
    })
    .to_string()
}

fn finalization() -> String {
    json!({
        "externalId": "u1",
        "ownerId": "user123",
        "manifestUrl": "https://cdn.example.com/hls/user123/u1/master.m3u8"
    })
    .to_string()
}

#[tokio::test]
async fn test_process_event_decodes_and_merges() {
    let h = harness();

    process_event(&h.service, EventStream::Finalized, &finalization())
        .await
        .unwrap();
    process_event(&h.service, EventStream::Registered, &registration())
        .await
        .unwrap();

    let video = h.service.get_video_by_external_id("u1").await.unwrap();
    assert_eq!(video.fields.status, VideoStatus::Ready);
    assert_eq!(video.fields.title, "My Clip");
}

#[tokio::test]
async fn test_process_event_rejects_malformed_body() {
    let h = harness();

    let result = process_event(&h.service, EventStream::Registered, "{not json").await;
    assert!(matches!(result, Err(AppError::InvalidEvent(_))));

    let result = process_event(
        &h.service,
        EventStream::Finalized,
        &json!({ "ownerId": "user123" }).to_string(),
    )
    .await;
    assert!(matches!(result, Err(AppError::InvalidEvent(_))));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_consumers_ack_valid_events_from_both_streams() {
    let h = harness();
    let pool = h.start(ConsumerConfig::default());

    h.finalized.publish(finalization());
    h.registered.publish(registration());

    eventually(|| h.registered.acked().len() == 1 && h.finalized.acked().len() == 1)
        .await;
    pool.shutdown().await;

    let video = h.service.get_video_by_external_id("u1").await.unwrap();
    assert_eq!(video.fields.status, VideoStatus::Ready);
    assert_eq!(h.store.len().await, 1);
    assert!(h.registered.is_drained());
    assert!(h.finalized.is_drained());
}

#[tokio::test]
async fn test_poison_messages_are_dropped_and_consumption_continues() {
    let h = harness();
    let pool = h.start(ConsumerConfig {
        requeue_on_store_failure: true,
        ..ConsumerConfig::default()
    });

    h.registered.publish("{not json");
    h.registered.publish(json!({ "title": "no ids" }).to_string());
    h.registered.publish(registration());

    eventually(|| h.registered.acked().len() == 1).await;
    pool.shutdown().await;

    assert_eq!(h.registered.dropped().len(), 2);
    assert_eq!(h.registered.deliveries(), 3);
    assert_eq!(h.store.len().await, 1);
}

#[tokio::test]
async fn test_store_failure_is_dropped_by_default() {
    let h = harness();
    h.store.set_fail_merges(true).await;
    let pool = h.start(ConsumerConfig::default());

    h.registered.publish(registration());

    eventually(|| h.registered.dropped().len() == 1).await;
    pool.shutdown().await;

    assert_eq!(h.registered.deliveries(), 1);
    assert!(h.registered.is_drained());
    assert!(h.store.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_store_failure_is_requeued_when_configured() {
    let h = harness();
    h.store.set_fail_merges(true).await;
    let pool = h.start(ConsumerConfig {
        requeue_on_store_failure: true,
        ..ConsumerConfig::default()
    });

    h.registered.publish(registration());
    eventually(|| h.registered.deliveries() >= 2).await;
    assert!(h.registered.dropped().is_empty());

    h.store.set_fail_merges(false).await;
    eventually(|| h.registered.acked().len() == 1).await;
    pool.shutdown().await;

    assert!(h.registered.is_drained());
    let video = h.store.find_by_external_id("u1").await.unwrap().unwrap();
    assert_eq!(video.fields.status, VideoStatus::Processing);
}

#[tokio::test(start_paused = true)]
async fn test_closed_channel_stops_its_consumer() {
    let h = harness();
    let pool = h.start(ConsumerConfig::default());

    h.registered.close();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let receives = h.registered.receives();

    // many receive error backoffs later, nothing has polled the closed channel
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.registered.receives(), receives);

    // the finalized loop is unaffected
    h.finalized.publish(finalization());
    eventually(|| h.finalized.acked().len() == 1).await;
    pool.shutdown().await;

    assert_eq!(h.registered.deliveries(), 0);
}

#[tokio::test]
async fn test_shutdown_leaves_unconsumed_messages_queued() {
    let h = harness();
    let pool = h.start(ConsumerConfig::default());
    pool.shutdown().await;

    h.registered.publish(registration());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.registered.pending(), 1);
    assert_eq!(h.registered.deliveries(), 0);
    assert!(h.store.is_empty().await);
}
