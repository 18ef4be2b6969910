//! Discovery client configuration, read from the `discovery` settings section.

use std::time::Duration;

use muster_common::section_or_default;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// Base URL of the registry API
    pub registry_url: String,
    /// Name this process registers under; empty disables registration
    pub service_name: String,
    /// Advertised host; falls back to `localhost` or the machine hostname
    pub host: Option<String>,
    /// Advertised port; falls back to the port handed to `start`
    pub port: Option<u16>,
    pub heartbeat_interval_seconds: u64,
    pub refresh_interval_seconds: u64,
    pub use_localhost_as_host: bool,
    pub request_timeout_ms: u64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            registry_url: "http://localhost:8500".to_string(),
            service_name: String::new(),
            host: None,
            port: None,
            heartbeat_interval_seconds: 30,
            refresh_interval_seconds: 15,
            use_localhost_as_host: false,
            request_timeout_ms: 5000,
        }
    }
}

impl DiscoveryOptions {
    pub fn new(registry_url: &str, service_name: &str) -> Self {
        Self {
            registry_url: registry_url.to_string(),
            service_name: service_name.to_string(),
            ..Default::default()
        }
    }

    pub fn from_config(config: &config::Config) -> Result<Self, config::ConfigError> {
        section_or_default(config, "discovery")
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds.max(1))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DiscoveryOptions::default();
        assert_eq!(options.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(options.refresh_interval(), Duration::from_secs(15));
        assert!(!options.use_localhost_as_host);
    }

    #[test]
    fn test_from_config() {
        let config = config::Config::builder()
            .set_override("discovery.registry_url", "http://registry:8500")
            .unwrap()
            .set_override("discovery.service_name", "candidate-svc")
            .unwrap()
            .set_override("discovery.heartbeat_interval_seconds", 10)
            .unwrap()
            .build()
            .unwrap();
        let options = DiscoveryOptions::from_config(&config).unwrap();
        assert_eq!(options.registry_url, "http://registry:8500");
        assert_eq!(options.service_name, "candidate-svc");
        assert_eq!(options.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(options.refresh_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let options = DiscoveryOptions {
            heartbeat_interval_seconds: 0,
            refresh_interval_seconds: 0,
            ..Default::default()
        };
        assert_eq!(options.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(options.refresh_interval(), Duration::from_secs(1));
    }
}
