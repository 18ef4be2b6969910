//! Owner-side publisher of entity change events

use std::sync::Arc;

use muster_api::{DomainEvent, EntityEventKind, ReplicatedEntity};
use muster_bus::{BusError, MessageBus, MessageBusExt};
use tracing::{info, warn};

#[derive(Clone)]
pub struct EntityPublisher {
    bus: Arc<dyn MessageBus>,
}

impl EntityPublisher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    pub async fn publish(&self, kind: EntityEventKind, entity: &ReplicatedEntity) -> Result<(), BusError> {
        let event = DomainEvent::entity(kind, entity.clone());
        self.bus.publish(&event, kind.routing_key()).await
    }

    pub async fn created(&self, entity: &ReplicatedEntity) -> Result<(), BusError> {
        self.publish(EntityEventKind::Created, entity).await
    }

    pub async fn updated(&self, entity: &ReplicatedEntity) -> Result<(), BusError> {
        self.publish(EntityEventKind::Updated, entity).await
    }

    pub async fn deactivated(&self, entity: &ReplicatedEntity) -> Result<(), BusError> {
        self.publish(EntityEventKind::Deactivated, entity).await
    }

    /// Re-broadcast every entity as `entity.updated` so consumers converge
    /// without a snapshot. Stops at the first failure; returns how many were
    /// published.
    pub async fn publish_all(&self, entities: &[ReplicatedEntity]) -> Result<usize, BusError> {
        let mut published = 0;
        for entity in entities {
            if let Err(e) = self.updated(entity).await {
                warn!(entity_id = %entity.id, published, "Re-broadcast interrupted: {}", e);
                return Err(e);
            }
            published += 1;
        }
        info!(published, "Re-broadcast entities");
        Ok(published)
    }
}
