//! Registry store abstraction

use std::time::Duration;

use async_trait::async_trait;
use muster_api::ServiceInstance;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("registry store unavailable: {0}")]
    Unavailable(String),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the store could not be reached. Callers must treat this as
    /// "membership unknown", never as "no members".
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
            }
            StoreError::Serialization(_) => false,
        }
    }
}

/// Which backend a registry runs on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Redis,
}

impl std::str::FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            _ => Err(format!("Invalid store kind: {}", s)),
        }
    }
}

/// Authoritative, self-expiring membership table.
///
/// One record per `(name, host, port)`. Records live for [`ttl`](Self::ttl)
/// after their last registration and disappear on their own; there is no
/// delete.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Upsert the record and extend its lifetime. Returns `true` when no live
    /// record existed for the key. The existence check and the write are a
    /// single atomic step.
    async fn register(&self, instance: ServiceInstance) -> Result<bool, StoreError>;

    /// All live records. Not a consistent snapshot across keys.
    async fn list_all(&self) -> Result<Vec<ServiceInstance>, StoreError>;

    /// Live records for one service name.
    async fn list_by_name(&self, name: &str) -> Result<Vec<ServiceInstance>, StoreError>;

    /// Lifetime granted by each registration
    fn ttl(&self) -> Duration;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Unavailable("connection refused".to_string());
        assert_eq!(
            err.to_string(),
            "registry store unavailable: connection refused"
        );
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_store_error_from_redis_error() {
        let redis_err = redis::RedisError::from((redis::ErrorKind::IoError, "connection refused"));
        let store_err: StoreError = redis_err.into();
        assert!(matches!(store_err, StoreError::Redis(_)));
        assert!(store_err.to_string().starts_with("Redis error:"));
        assert!(store_err.is_unavailable());
    }

    #[test]
    fn test_serialization_error_is_not_unavailable() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let store_err: StoreError = json_err.into();
        assert!(!store_err.is_unavailable());
    }

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!("Redis".parse::<StoreKind>().unwrap(), StoreKind::Redis);
        assert!("etcd".parse::<StoreKind>().is_err());
    }
}
