//! Muster Discovery - embedded membership agent
//!
//! A `DiscoveryClient` keeps its own process registered with the registry
//! (heartbeat loop) and pulls the full membership into a local cache
//! (refresh loop). Lookups only read the cache.

pub mod cache;
pub mod client;
pub mod error;
pub mod http;
pub mod options;

pub use cache::{InstanceCache, InstanceResolver};
pub use client::{CacheState, ClientState, DiscoveryClient, ServiceIdentity};
pub use error::DiscoveryError;
pub use http::RegistryHttpClient;
pub use options::DiscoveryOptions;
