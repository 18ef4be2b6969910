//! Entity event subscriber
//!
//! Handles `entity.created`, `entity.updated` and `entity.deactivated`. The
//! envelope `type` must equal the routing key it arrived on; unknown types
//! are acknowledged and ignored.

use std::sync::Arc;

use async_trait::async_trait;
use muster_api::{EntityEventKind, RawDomainEvent, ReplicatedEntity};
use muster_bus::{Delivery, DeliveryHandler, HandlerError, MessageBus, Subscription};
use tracing::{debug, info};

use crate::cache::{Applied, LocalEntityCache};
use crate::error::ReplicationError;

pub struct EntityEventSubscriber {
    cache: Arc<LocalEntityCache>,
}

impl EntityEventSubscriber {
    pub fn new(cache: Arc<LocalEntityCache>) -> Self {
        Self { cache }
    }

    /// Routing keys this subscriber is bound to.
    pub fn bindings() -> [EntityEventKind; 3] {
        EntityEventKind::ALL
    }

    /// Subscribe `self` to every binding, one durable queue per routing key
    /// named after `client_id` (or the bus client id).
    pub async fn subscribe_all(
        self: Arc<Self>,
        bus: &dyn MessageBus,
        client_id: Option<&str>,
    ) -> Result<Vec<Subscription>, ReplicationError> {
        let mut subscriptions = Vec::new();
        for kind in Self::bindings() {
            let routing_key = kind.routing_key();
            let queue = match client_id {
                Some(client_id) => muster_bus::queue_name(client_id, routing_key),
                None => bus.queue_for(routing_key),
            };
            let subscription = bus.subscribe(&queue, routing_key, self.clone()).await?;
            info!(queue = %queue, routing_key, "Entity events subscribed");
            subscriptions.push(subscription);
        }
        Ok(subscriptions)
    }
}

#[async_trait]
impl DeliveryHandler for EntityEventSubscriber {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        let event: RawDomainEvent = delivery.json()?;

        if event.event_type != delivery.routing_key {
            return Err(HandlerError::permanent(format!(
                "event type '{}' arrived on routing key '{}'",
                event.event_type, delivery.routing_key
            )));
        }

        let Some(kind) = EntityEventKind::from_routing_key(&event.event_type) else {
            debug!(event_type = %event.event_type, "Ignoring unknown event type");
            return Ok(());
        };

        let entity: ReplicatedEntity = serde_json::from_value(event.payload).map_err(|e| {
            HandlerError::permanent(format!("payload of '{}' is not an entity: {}", kind, e))
        })?;

        let entity_id = entity.id;
        let applied = self.cache.apply_event(kind, entity);
        match applied {
            Applied::Stale => debug!(entity_id = %entity_id, event_type = %kind, "Discarded stale event"),
            _ => debug!(entity_id = %entity_id, event_type = %kind, ?applied, "Applied event"),
        }
        Ok(())
    }
}
