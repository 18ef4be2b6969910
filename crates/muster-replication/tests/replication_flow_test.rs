//! End-to-end replication: snapshot over HTTP, then events over the bus

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use muster_api::ReplicatedEntity;
use muster_bus::{BusOptions, MemoryBus, MessageBus};
use muster_replication::{
    BootstrapStatus, EntityPublisher, ReplicationOptions, ReplicationRuntime,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const U1: &str = "6f1c1f8e-5f39-4d7a-9d6c-3c8e6f0f6b11";

fn options(server: &MockServer) -> ReplicationOptions {
    ReplicationOptions {
        fallback_base_url: Some(server.uri()),
        retry_delay_ms: 10,
        ..Default::default()
    }
}

async fn wait_until<F: Fn() -> bool>(check: F) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_snapshot_then_deactivation_preserves_roles() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entities/snapshot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": U1, "username": "alice", "email": "alice@example.com", "isActive": true,
             "roles": ["recruiter"], "lastUpdatedAt": "2025-01-01T00:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let memory = MemoryBus::new(BusOptions::memory().with_client_id("candidate-svc-1"));
    let bus: Arc<dyn MessageBus> = Arc::new(memory.clone());
    let runtime = ReplicationRuntime::new(options(&server), bus.clone(), None).unwrap();

    let status = runtime.start().await.unwrap();
    assert_eq!(
        status,
        BootstrapStatus::Loaded {
            source: server.uri(),
            entities: 1
        }
    );
    assert!(runtime.is_ready().await);

    let id: Uuid = U1.parse().unwrap();
    let cache = runtime.cache();
    assert!(cache.get(&id).unwrap().is_active);

    // The owner deactivates u1; its event carries a thin payload.
    let owner = EntityPublisher::new(bus.clone());
    let deactivated = ReplicatedEntity::deactivated_placeholder(id, Utc::now());
    owner.deactivated(&deactivated).await.unwrap();

    wait_until(|| cache.get(&id).is_some_and(|e| !e.is_active)).await;
    let entity = cache.get(&id).unwrap();
    assert!(entity.has_role("recruiter"));
    assert_eq!(entity.display_name, "alice");

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_failed_snapshot_degrades_to_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new(BusOptions::memory()));
    let runtime = ReplicationRuntime::new(options(&server), bus.clone(), None).unwrap();

    let status = runtime.start().await.unwrap();
    assert!(matches!(status, BootstrapStatus::Degraded { .. }));
    assert!(runtime.is_ready().await);

    let bob = ReplicatedEntity::new(Uuid::new_v4(), "bob", "bob@example.com");
    EntityPublisher::new(bus.clone()).created(&bob).await.unwrap();

    let cache = runtime.cache();
    wait_until(|| cache.get(&bob.id).is_some()).await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_poison_message_does_not_block_queue() {
    let memory = MemoryBus::new(BusOptions::memory());
    let bus: Arc<dyn MessageBus> = Arc::new(memory.clone());
    let runtime = ReplicationRuntime::new(ReplicationOptions::default(), bus.clone(), None).unwrap();
    runtime.start().await.unwrap();

    bus.publish_bytes("entity.created", b"garbage".to_vec())
        .await
        .unwrap();
    let carol = ReplicatedEntity::new(Uuid::new_v4(), "carol", "carol@example.com");
    EntityPublisher::new(bus.clone()).created(&carol).await.unwrap();

    let cache = runtime.cache();
    wait_until(|| cache.get(&carol.id).is_some()).await;
    wait_until(|| memory.rejected().len() == 1).await;
    runtime.shutdown().await;
}

#[tokio::test]
async fn test_catch_up_merges_incremental_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/entities/snapshot"))
        .and(query_param("since", "2025-01-01T00:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": U1, "username": "alice", "isActive": true, "lastUpdatedAt": "2025-01-02T00:00:00Z"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let bus: Arc<dyn MessageBus> = Arc::new(MemoryBus::new(BusOptions::memory()));
    let runtime = ReplicationRuntime::new(options(&server), bus, None).unwrap();
    let existing = ReplicatedEntity::new(Uuid::new_v4(), "dave", "dave@example.com");
    runtime.cache().upsert(existing.clone());

    let since: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
    assert_eq!(runtime.catch_up(since).await.unwrap(), 1);

    let cache = runtime.cache();
    assert_eq!(cache.len(), 2);
    assert!(cache.get(&existing.id).is_some());
}
