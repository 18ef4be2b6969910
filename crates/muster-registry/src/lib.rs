//! Muster Registry - self-expiring membership table
//!
//! This crate provides:
//! - `RegistryStore`: the store abstraction (register / list / list by name)
//! - `MemoryRegistryStore`: single-node store backed by `DashMap` with TTL expiry
//! - `RedisRegistryStore`: shared store backed by Redis key expiry
//! - `ExpiryReaper`: background purge of expired in-memory records

pub mod memory;
pub mod reaper;
pub mod redis_store;
pub mod store;

pub use memory::MemoryRegistryStore;
pub use reaper::ExpiryReaper;
pub use redis_store::RedisRegistryStore;
pub use store::{RegistryStore, StoreError, StoreKind};
