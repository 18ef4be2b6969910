//! Layered settings loading
//!
//! Sources, lowest precedence first:
//! 1. optional settings file (`conf/application.{yml,toml,json}`)
//! 2. environment variables prefixed with `MUSTER_`, nested keys separated by `__`
//!    (for example `MUSTER_DISCOVERY__REGISTRY_URL`)
//!
//! Callers deserialize typed sections from the resulting [`config::Config`].

use config::{Config, ConfigError, Environment, File};

use crate::{DEFAULT_SETTINGS_FILE, ENV_PREFIX};

/// Where settings are read from.
#[derive(Clone, Debug)]
pub struct SettingsSource {
    /// Settings file name without extension; `None` skips the file layer
    pub file: Option<String>,
    /// Environment variable prefix; `None` skips the environment layer
    pub env_prefix: Option<String>,
}

impl Default for SettingsSource {
    fn default() -> Self {
        Self {
            file: Some(DEFAULT_SETTINGS_FILE.to_string()),
            env_prefix: Some(ENV_PREFIX.to_string()),
        }
    }
}

impl SettingsSource {
    pub fn file(mut self, file: &str) -> Self {
        self.file = Some(file.to_string());
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Builder with all configured layers added, ready for overrides.
    pub fn builder(&self) -> config::ConfigBuilder<config::builder::DefaultState> {
        let mut builder = Config::builder();

        if let Some(file) = &self.file {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        builder
    }
}

/// Load settings from the default file and environment layers.
pub fn load_settings(source: &SettingsSource) -> Result<Config, ConfigError> {
    source.builder().build()
}

/// Deserialize `key` from `config`, falling back to `T::default()` when the
/// section is absent. A present but malformed section is an error.
pub fn section_or_default<T>(config: &Config, key: &str) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match config.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e),
    }
}
