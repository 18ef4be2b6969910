use muster_bus::BusError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("snapshot source responded {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no snapshot source: '{0}' not discovered and no fallback base URL configured")]
    NoSource(String),
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl ReplicationError {
    /// Worth another attempt: network failures, timeouts and 5xx/408/429.
    pub fn is_transient(&self) -> bool {
        match self {
            ReplicationError::Http(e) => !e.is_decode() && !e.is_builder(),
            ReplicationError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ReplicationError::NoSource(_) => false,
            ReplicationError::Bus(_) => true,
        }
    }
}
