//! Shared constants for routing keys, paths and content types

// Routing keys on the shared topic exchange
pub const ENTITY_CREATED: &str = "entity.created";
pub const ENTITY_UPDATED: &str = "entity.updated";
pub const ENTITY_DEACTIVATED: &str = "entity.deactivated";
pub const SERVICE_REGISTER: &str = "service.register";

// Registry API paths
pub const REGISTER_PATH: &str = "/register";
pub const SERVICES_PATH: &str = "/services";

// Snapshot endpoint served by entity owners
pub const SNAPSHOT_PATH: &str = "/entities/snapshot";
pub const SINCE_PARAM: &str = "since";

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Status string returned by a successful registration
pub const STATUS_REGISTERED: &str = "registered";

/// Default registry TTL in seconds
pub const DEFAULT_TTL_SECONDS: u64 = 60;
