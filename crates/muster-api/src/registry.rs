// Registry models: instance records, registration request/response and the
// membership event published on first-time registration.

use chrono::{DateTime, Utc};
use muster_common::{MusterError, is_valid_service_name};
use serde::{Deserialize, Serialize};

use crate::model::{DEFAULT_TTL_SECONDS, STATUS_REGISTERED};

/// A live service instance. Identity is `(name, host, port)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<String>,
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            health_check: None,
            registered_at: Utc::now(),
        }
    }

    /// Identity key `name:host:port`
    pub fn key(&self) -> String {
        build_instance_key(&self.name, &self.host, self.port)
    }

    /// `http://host:port`
    pub fn base_url(&self) -> String {
        muster_common::base_url(&self.host, self.port)
    }

    /// True when both records describe the same `(name, host, port)`.
    pub fn same_identity(&self, other: &ServiceInstance) -> bool {
        self.name == other.name && self.host == other.host && self.port == other.port
    }
}

/// Build the identity key for an instance: `name:host:port`
pub fn build_instance_key(name: &str, host: &str, port: u16) -> String {
    format!("{}:{}:{}", name, host, port)
}

/// Body of `POST /register`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    pub name: String,
    pub host: String,
    pub port: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check: Option<String>,
}

impl RegisterRequest {
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port: port as i32,
            health_check: None,
        }
    }

    /// Validate and convert into an instance stamped with the current time.
    pub fn into_instance(self) -> Result<ServiceInstance, MusterError> {
        if !is_valid_service_name(&self.name) {
            return Err(MusterError::IllegalArgument(format!(
                "invalid service name '{}'",
                self.name
            )));
        }
        if self.host.trim().is_empty() {
            return Err(MusterError::IllegalArgument(
                "host must not be empty".to_string(),
            ));
        }
        let port = u16::try_from(self.port)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| {
                MusterError::IllegalArgument(format!("port {} out of range 1..=65535", self.port))
            })?;

        Ok(ServiceInstance {
            name: self.name,
            host: self.host,
            port,
            health_check: self.health_check,
            registered_at: Utc::now(),
        })
    }
}

/// Response of `POST /register`. `expires_in` is the TTL window in seconds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub status: String,
    pub expires_in: u64,
}

impl RegisterResponse {
    pub fn registered(expires_in: u64) -> Self {
        Self {
            status: STATUS_REGISTERED.to_string(),
            expires_in,
        }
    }
}

impl Default for RegisterResponse {
    fn default() -> Self {
        Self::registered(DEFAULT_TTL_SECONDS)
    }
}

/// Kind of membership event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceEventKind {
    Register,
}

impl std::fmt::Display for ServiceEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceEventKind::Register => write!(f, "register"),
        }
    }
}

/// Published once per new instance on `service.register`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEvent {
    pub event: ServiceEventKind,
    pub service: String,
    pub host: String,
    pub port: u16,
}

impl ServiceEvent {
    pub fn register(instance: &ServiceInstance) -> Self {
        Self {
            event: ServiceEventKind::Register,
            service: instance.name.clone(),
            host: instance.host.clone(),
            port: instance.port,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_key() {
        let instance = ServiceInstance::new("candidate-svc", "10.0.0.5", 8080);
        assert_eq!(instance.key(), "candidate-svc:10.0.0.5:8080");
        assert_eq!(instance.base_url(), "http://10.0.0.5:8080");
    }

    #[test]
    fn test_instance_wire_format() {
        let json = r#"{"name":"candidate-svc","host":"10.0.0.5","port":8080,"registeredAt":"2025-01-01T00:00:00Z"}"#;
        let instance: ServiceInstance = serde_json::from_str(json).unwrap();
        assert_eq!(instance.port, 8080);
        assert!(instance.health_check.is_none());

        let value = serde_json::to_value(&instance).unwrap();
        assert!(value.get("registeredAt").is_some());
        assert!(value.get("healthCheck").is_none());
    }

    #[test]
    fn test_register_request_validation() {
        let ok = RegisterRequest::new("candidate-svc", "10.0.0.5", 8080)
            .into_instance()
            .unwrap();
        assert_eq!(ok.key(), "candidate-svc:10.0.0.5:8080");

        let blank = RegisterRequest::new("  ", "10.0.0.5", 8080).into_instance();
        assert!(matches!(blank, Err(MusterError::IllegalArgument(_))));

        let mut bad_port = RegisterRequest::new("svc", "h", 1);
        bad_port.port = 70000;
        assert!(bad_port.into_instance().is_err());

        let mut zero_port = RegisterRequest::new("svc", "h", 1);
        zero_port.port = 0;
        assert!(zero_port.into_instance().is_err());
    }

    #[test]
    fn test_register_response_wire_format() {
        let value = serde_json::to_value(RegisterResponse::registered(60)).unwrap();
        assert_eq!(value["status"], "registered");
        assert_eq!(value["expiresIn"], 60);
    }

    #[test]
    fn test_service_event_wire_format() {
        let instance = ServiceInstance::new("candidate-svc", "10.0.0.5", 8080);
        let value = serde_json::to_value(ServiceEvent::register(&instance)).unwrap();
        assert_eq!(value["event"], "register");
        assert_eq!(value["service"], "candidate-svc");
        assert_eq!(value["port"], 8080);
    }
}
