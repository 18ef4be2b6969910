//! Redis-backed registry store
//!
//! Keys are `{prefix}:{name}:{host}:{port}` holding the instance as JSON with a
//! Redis expiry equal to the TTL. Registration is a single
//! `SET key value EX ttl GET`; a nil reply means the key did not exist.

use std::time::Duration;

use async_trait::async_trait;
use muster_api::{ServiceInstance, build_instance_key};
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::store::{RegistryStore, StoreError};

const SCAN_BATCH: usize = 200;

#[derive(Clone)]
pub struct RedisRegistryStore {
    conn: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
}

impl RedisRegistryStore {
    pub fn new(conn: ConnectionManager, key_prefix: &str, ttl: Duration) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.to_string(),
            ttl,
        }
    }

    /// Open a managed connection to `url`. Fails when the server cannot be
    /// reached.
    pub async fn connect(url: &str, key_prefix: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn, key_prefix, ttl))
    }

    fn instance_key(&self, instance: &ServiceInstance) -> String {
        instance_key(&self.key_prefix, instance)
    }

    async fn scan_instances(&self, pattern: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        let mut conn = self.conn.clone();

        let mut keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        keys.sort();
        keys.dedup();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        // Keys that expired between SCAN and MGET come back as nil.
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| {
                let json = value?;
                match serde_json::from_str::<ServiceInstance>(&json) {
                    Ok(instance) => Some(instance),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Skipping undecodable registry record");
                        None
                    }
                }
            })
            .collect())
    }
}

#[async_trait]
impl RegistryStore for RedisRegistryStore {
    async fn register(&self, instance: ServiceInstance) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let key = self.instance_key(&instance);
        let json = serde_json::to_string(&instance)?;

        let previous: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&json)
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .arg("GET")
            .query_async(&mut conn)
            .await?;

        let is_new = previous.is_none();
        debug!(key = %key, is_new, "registry lease refreshed");
        Ok(is_new)
    }

    async fn list_all(&self) -> Result<Vec<ServiceInstance>, StoreError> {
        let pattern = format!("{}:*", escape_glob(&self.key_prefix));
        self.scan_instances(&pattern).await
    }

    async fn list_by_name(&self, name: &str) -> Result<Vec<ServiceInstance>, StoreError> {
        let pattern = name_pattern(&self.key_prefix, name);
        let mut instances = self.scan_instances(&pattern).await?;
        instances.retain(|instance| instance.name == name);
        Ok(instances)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn instance_key(prefix: &str, instance: &ServiceInstance) -> String {
    format!(
        "{}:{}",
        prefix,
        build_instance_key(&instance.name, &instance.host, instance.port)
    )
}

fn name_pattern(prefix: &str, name: &str) -> String {
    format!("{}:{}:*", escape_glob(prefix), escape_glob(name))
}

/// Escape Redis glob metacharacters so a literal matches only itself.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
