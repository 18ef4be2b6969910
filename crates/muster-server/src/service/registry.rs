//! Registry service: store access plus the new-member announcement

use std::sync::Arc;

use muster_api::{
    RegisterRequest, RegisterResponse, SERVICE_REGISTER, ServiceEvent, ServiceInstance,
};
use muster_bus::{MessageBus, MessageBusExt};
use muster_common::MusterError;
use muster_registry::{RegistryStore, StoreError};
use tracing::{debug, info, warn};

pub struct RegistryService {
    store: Arc<dyn RegistryStore>,
    bus: Arc<dyn MessageBus>,
}

impl RegistryService {
    pub fn new(store: Arc<dyn RegistryStore>, bus: Arc<dyn MessageBus>) -> Self {
        Self { store, bus }
    }

    /// Upsert the instance and refresh its TTL. A first-time registration
    /// is announced on `service.register` in the background; a failed
    /// announcement never fails the registration.
    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterResponse, MusterError> {
        let instance = request.into_instance()?;
        let is_new = self.store.register(instance.clone()).await.map_err(store_error)?;

        if is_new {
            info!(
                service = %instance.name,
                host = %instance.host,
                port = instance.port,
                "New instance registered"
            );
            self.announce(&instance);
        } else {
            debug!(service = %instance.name, host = %instance.host, port = instance.port, "Heartbeat");
        }

        Ok(RegisterResponse::registered(self.store.ttl().as_secs()))
    }

    pub async fn list_all(&self) -> Result<Vec<ServiceInstance>, MusterError> {
        self.store.list_all().await.map_err(store_error)
    }

    /// Live instances of `name`. No instances is `NotFound`; an unreachable
    /// store is `Unavailable`.
    pub async fn list_by_name(&self, name: &str) -> Result<Vec<ServiceInstance>, MusterError> {
        let instances = self.store.list_by_name(name).await.map_err(store_error)?;
        if instances.is_empty() {
            return Err(MusterError::NotFound(name.to_string()));
        }
        Ok(instances)
    }

    fn announce(&self, instance: &ServiceInstance) {
        let bus = self.bus.clone();
        let event = ServiceEvent::register(instance);
        tokio::spawn(async move {
            if let Err(e) = bus.publish(&event, SERVICE_REGISTER).await {
                warn!(
                    service = %event.service,
                    host = %event.host,
                    port = event.port,
                    "Failed to publish {}: {}",
                    SERVICE_REGISTER,
                    e
                );
            }
        });
    }
}

fn store_error(e: StoreError) -> MusterError {
    if e.is_unavailable() {
        MusterError::Unavailable(e.to_string())
    } else {
        MusterError::InternalError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muster_bus::{BusOptions, MemoryBus};
    use muster_registry::MemoryRegistryStore;

    fn service() -> (RegistryService, MemoryBus) {
        let bus = MemoryBus::new(BusOptions::memory());
        let store = Arc::new(MemoryRegistryStore::default());
        (RegistryService::new(store, Arc::new(bus.clone())), bus)
    }

    #[tokio::test]
    async fn test_register_returns_ttl_window() {
        let (service, _) = service();
        let response = service
            .register(RegisterRequest::new("candidate-svc", "10.0.0.5", 8080))
            .await
            .unwrap();
        assert_eq!(response.status, "registered");
        assert_eq!(response.expires_in, 60);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let (service, _) = service();
        let err = service
            .register(RegisterRequest::new("", "10.0.0.5", 8080))
            .await
            .unwrap_err();
        assert!(matches!(err, MusterError::IllegalArgument(_)));
    }

    #[tokio::test]
    async fn test_unknown_name_is_not_found() {
        let (service, _) = service();
        assert!(matches!(
            service.list_by_name("interview-svc").await,
            Err(MusterError::NotFound(_))
        ));
    }

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            store_error(StoreError::Unavailable("down".to_string())),
            MusterError::Unavailable(_)
        ));
        let decode = serde_json::from_str::<ServiceInstance>("{").unwrap_err();
        assert!(matches!(
            store_error(StoreError::Serialization(decode)),
            MusterError::InternalError(_)
        ));
    }
}
