use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry responded {status}: {body}")]
    Status { status: u16, body: String },
    #[error("service identity incomplete: {0}")]
    IncompleteIdentity(String),
    #[error("discovery client stopped")]
    Stopped,
}
