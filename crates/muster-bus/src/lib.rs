//! Muster Bus - durable topic publish/subscribe
//!
//! This crate provides:
//! - `MessageBus`: publish to a shared topic exchange, subscribe durable queues
//! - `AmqpBus`: AMQP 0-9-1 implementation with lazy channels and auto-reconnect
//! - `MemoryBus`: in-process broker with the same delivery semantics
//! - Delivery classification: ack, requeue (transient) or reject (permanent)

pub mod amqp;
pub mod bus;
pub mod delivery;
pub mod error;
pub mod memory;
pub mod options;
pub mod topic;

use std::sync::Arc;

pub use amqp::AmqpBus;
pub use bus::{MessageBus, MessageBusExt, Readiness, Subscription};
pub use delivery::{Delivery, DeliveryHandler, Disposition, HandlerError, handler_fn};
pub use error::BusError;
pub use memory::MemoryBus;
pub use options::{BusKind, BusOptions};
pub use topic::{queue_name, topic_matches};

/// Build the bus selected by `options.kind`. Neither kind connects eagerly.
pub fn build_bus(options: BusOptions) -> Arc<dyn MessageBus> {
    match options.kind {
        BusKind::Amqp => Arc::new(AmqpBus::new(options)),
        BusKind::Memory => Arc::new(MemoryBus::new(options)),
    }
}
