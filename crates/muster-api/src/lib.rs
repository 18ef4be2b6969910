//! Muster API - wire models
//!
//! JSON shapes exchanged over the registry HTTP API, the snapshot endpoint and
//! the message bus.

pub mod entity;
pub mod model;
pub mod registry;

pub use entity::{DomainEvent, EntityEventKind, RawDomainEvent, ReplicatedEntity};
pub use model::*;
pub use registry::{
    RegisterRequest, RegisterResponse, ServiceEvent, ServiceEventKind, ServiceInstance,
    build_instance_key,
};
