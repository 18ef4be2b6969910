//! Registry API over HTTP with in-process store and bus

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use async_trait::async_trait;
use muster_api::{RegisterResponse, ServiceEvent, ServiceInstance};
use muster_bus::{BusOptions, MemoryBus, MessageBus};
use muster_registry::{MemoryRegistryStore, RegistryStore, StoreError};
use muster_server::api::registry_routes;
use muster_server::model::response;
use muster_server::service::RegistryService;
use serde_json::json;

struct UnreachableStore;

#[async_trait]
impl RegistryStore for UnreachableStore {
    async fn register(&self, _instance: ServiceInstance) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn list_all(&self) -> Result<Vec<ServiceInstance>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn list_by_name(&self, _name: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(60)
    }
}

fn registry(store: Arc<dyn RegistryStore>, bus: &MemoryBus) -> web::Data<Arc<RegistryService>> {
    let bus: Arc<dyn MessageBus> = Arc::new(bus.clone());
    web::Data::new(Arc::new(RegistryService::new(store, bus)))
}

async fn wait_for_events(bus: &MemoryBus, count: usize) {
    for _ in 0..200 {
        if bus.published_on("service.register").len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn register_body(name: &str, port: u16) -> serde_json::Value {
    json!({"name": name, "host": "10.0.0.5", "port": port})
}

#[actix_web::test]
async fn test_heartbeat_publishes_one_event() {
    let bus = MemoryBus::new(BusOptions::memory());
    let app = test::init_service(
        App::new()
            .app_data(registry(Arc::new(MemoryRegistryStore::default()), &bus))
            .service(registry_routes()),
    )
    .await;

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(register_body("candidate-svc", 8080))
            .to_request();
        let resp: RegisterResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp, RegisterResponse::registered(60));
    }

    wait_for_events(&bus, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let events = bus.published_on("service.register");
    assert_eq!(events.len(), 1);
    let event: ServiceEvent = serde_json::from_slice(&events[0]).unwrap();
    assert_eq!(event.service, "candidate-svc");
    assert_eq!(event.port, 8080);

    let req = test::TestRequest::get().uri("/services").to_request();
    let instances: Vec<ServiceInstance> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(instances.len(), 1);
}

#[actix_web::test]
async fn test_publish_failure_does_not_fail_registration() {
    let bus = MemoryBus::new(BusOptions::memory());
    bus.set_unavailable(true);
    let app = test::init_service(
        App::new()
            .app_data(registry(Arc::new(MemoryRegistryStore::default()), &bus))
            .service(registry_routes()),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(register_body("candidate-svc", 8080))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_list_by_name() {
    let bus = MemoryBus::new(BusOptions::memory());
    let app = test::init_service(
        App::new()
            .app_data(registry(Arc::new(MemoryRegistryStore::default()), &bus))
            .service(registry_routes()),
    )
    .await;

    for (name, port) in [("candidate-svc", 8080), ("candidate-svc", 8081), ("interview-svc", 9090)] {
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(register_body(name, port))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::get()
        .uri("/services/candidate-svc")
        .to_request();
    let instances: Vec<ServiceInstance> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(instances.len(), 2);
    assert!(instances.iter().all(|i| i.name == "candidate-svc"));
}

#[actix_web::test]
async fn test_unknown_service_is_not_found() {
    let bus = MemoryBus::new(BusOptions::memory());
    let app = test::init_service(
        App::new()
            .app_data(registry(Arc::new(MemoryRegistryStore::default()), &bus))
            .service(registry_routes()),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/services/interview-svc")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: response::Result<String> = test::read_body_json(resp).await;
    assert_eq!(body.code, 21008);
}

#[actix_web::test]
async fn test_unreachable_store_is_not_empty() {
    let bus = MemoryBus::new(BusOptions::memory());
    let app = test::init_service(
        App::new()
            .app_data(registry(Arc::new(UnreachableStore), &bus))
            .service(registry_routes()),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/services/candidate-svc")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let req = test::TestRequest::get().uri("/services").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(register_body("candidate-svc", 8080))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(bus.published().is_empty());
}

#[actix_web::test]
async fn test_invalid_registration_is_bad_request() {
    let bus = MemoryBus::new(BusOptions::memory());
    let app = test::init_service(
        App::new()
            .app_data(registry(Arc::new(MemoryRegistryStore::default()), &bus))
            .service(registry_routes()),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(json!({"name": "", "host": "10.0.0.5", "port": 8080}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/register")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: response::Result<String> = test::read_body_json(resp).await;
    assert_eq!(body.code, 10000);
}
