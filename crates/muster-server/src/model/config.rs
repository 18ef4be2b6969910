//! Server configuration
//!
//! Layers, lowest precedence first: `conf/application.{yml,toml,json}`,
//! `MUSTER_*` environment variables, then command-line flags.

use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError};
use muster_api::DEFAULT_TTL_SECONDS;
use muster_common::{SettingsSource, section_or_default};
use muster_registry::StoreKind;
use serde::Deserialize;

use crate::startup::LoggingConfig;

pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 8500;
pub const DEFAULT_KEY_PREFIX: &str = "service";
pub const DEFAULT_REAP_INTERVAL_SECONDS: u64 = 5;

#[derive(Debug, Default, Parser)]
#[command(name = "muster-server", about = "Self-expiring service registry")]
pub struct Cli {
    /// Settings file without extension
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,
    /// Registry store backend: memory or redis
    #[arg(long = "store")]
    pub store: Option<String>,
    #[arg(long = "redis-url", env = "REDIS_URL")]
    pub redis_url: Option<String>,
    #[arg(long = "amqp-url", env = "AMQP_URL")]
    pub amqp_url: Option<String>,
}

/// `registry` section
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RegistryOptions {
    pub ttl_seconds: u64,
    pub store: StoreKind,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub reap_interval_seconds: u64,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
            store: StoreKind::Memory,
            redis_url: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            reap_interval_seconds: DEFAULT_REAP_INTERVAL_SECONDS,
        }
    }
}

impl RegistryOptions {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.max(1))
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_seconds.max(1))
    }
}

#[derive(Clone, Debug)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Parse the process arguments and load every layer.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> Result<Self, ConfigError> {
        let mut source = SettingsSource::default();
        if let Some(file) = &args.config {
            source = source.file(file);
        }

        let mut builder = source.builder();
        if let Some(v) = args.port {
            builder = builder.set_override("server.port", i64::from(v))?;
        }
        if let Some(v) = args.store {
            builder = builder.set_override("registry.store", v)?;
        }
        if let Some(v) = args.redis_url {
            builder = builder.set_override("registry.redis_url", v)?;
        }
        if let Some(v) = args.amqp_url {
            builder = builder.set_override("bus.url", v)?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Server Configuration
    // ========================================================================

    pub fn server_address(&self) -> String {
        self.config
            .get_string("server.address")
            .unwrap_or(DEFAULT_SERVER_ADDRESS.to_string())
    }

    pub fn server_port(&self) -> u16 {
        self.config
            .get_int("server.port")
            .ok()
            .and_then(|port| u16::try_from(port).ok())
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn registry_options(&self) -> Result<RegistryOptions, ConfigError> {
        section_or_default(&self.config, "registry")
    }

    pub fn bus_options(&self) -> Result<muster_bus::BusOptions, ConfigError> {
        muster_bus::BusOptions::from_config(&self.config)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    /// `logging.*` settings, then `MUSTER_LOG_*` variables on top.
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config.get_bool("logging.console").unwrap_or(true),
            self.config.get_bool("logging.file").unwrap_or(false),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
        )
        .with_env_overrides()
    }
}
