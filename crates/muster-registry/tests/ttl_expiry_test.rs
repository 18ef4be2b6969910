//! Lease lifetime behavior of the in-memory registry store

use std::sync::Arc;
use std::time::Duration;

use muster_api::ServiceInstance;
use muster_registry::{MemoryRegistryStore, RegistryStore};

fn candidate() -> ServiceInstance {
    ServiceInstance::new("candidate-svc", "10.0.0.5", 8080)
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_then_silence_expires_instance() {
    let store = MemoryRegistryStore::new(Duration::from_secs(60));

    // t=0
    assert!(store.register(candidate()).await.unwrap());

    // t=10
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(!store.register(candidate()).await.unwrap());

    // t=69, still inside the window opened at t=10
    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(store.list_by_name("candidate-svc").await.unwrap().len(), 1);

    // t=71
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(store.list_by_name("candidate-svc").await.unwrap().is_empty());
    assert!(store.list_all().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_store_usable_as_trait_object() {
    let store: Arc<dyn RegistryStore> = Arc::new(MemoryRegistryStore::new(Duration::from_secs(5)));

    let mut instance = candidate();
    instance.health_check = Some("http://10.0.0.5:8080/health".to_string());
    assert!(store.register(instance).await.unwrap());

    let listed = store.list_all().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(
        listed[0].health_check.as_deref(),
        Some("http://10.0.0.5:8080/health")
    );

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(store.list_all().await.unwrap().is_empty());
}
