//! Replication configuration, read from the `replication` settings section.

use std::time::Duration;

use muster_api::SNAPSHOT_PATH;
use muster_common::section_or_default;
use serde::{Deserialize, Serialize};

use crate::cache::MergePolicy;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationOptions {
    /// Registry name of the service that owns the entities
    pub owner_service: String,
    /// Used when discovery has no instance of `owner_service`
    pub fallback_base_url: Option<String>,
    pub snapshot_path: String,
    /// Extra attempts after the first failed snapshot fetch
    pub snapshot_retries: u32,
    pub retry_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub merge_policy: MergePolicy,
    /// Queue name prefix; the bus client id when unset
    pub client_id: Option<String>,
}

impl Default for ReplicationOptions {
    fn default() -> Self {
        Self {
            owner_service: "ats-authorization-service".to_string(),
            fallback_base_url: None,
            snapshot_path: SNAPSHOT_PATH.to_string(),
            snapshot_retries: 1,
            retry_delay_ms: 2000,
            request_timeout_ms: 10_000,
            merge_policy: MergePolicy::default(),
            client_id: None,
        }
    }
}

impl ReplicationOptions {
    pub fn from_config(config: &config::Config) -> Result<Self, config::ConfigError> {
        section_or_default(config, "replication")
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
