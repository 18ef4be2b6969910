use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("broker connection failed: {0}")]
    Connection(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("bus is closed")]
    Closed,
    #[error("broker unavailable")]
    Unavailable,
}
