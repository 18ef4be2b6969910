//! Muster Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across all muster components:
//! - Error types and error codes
//! - Layered settings loading (file + environment)
//! - Host/address utilities

pub mod error;
pub mod settings;
pub mod utils;

// Re-exports for convenience
pub use error::{ErrorCode, MusterError};
pub use settings::{SettingsSource, load_settings, section_or_default};
pub use utils::{base_url, is_valid_service_name, local_hostname, local_ip};

/// Environment variable prefix for all muster settings
pub const ENV_PREFIX: &str = "MUSTER";

/// Default settings file, relative to the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "conf/application";
