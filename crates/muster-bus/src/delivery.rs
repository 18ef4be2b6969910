//! Deliveries, handler contract and settlement
//!
//! A handler reports success, a transient failure (retry by requeue) or a
//! permanent failure (the message can never succeed). Settlement turns that
//! outcome plus the attempt count into ack, requeue or reject.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, warn};

/// One message handed to a subscriber.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub queue: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub redelivered: bool,
    /// 1 on first delivery
    pub attempt: u32,
}

impl Delivery {
    /// Decode the JSON body. A body that does not decode is a permanent failure.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            HandlerError::Permanent(format!(
                "undecodable payload on '{}': {}",
                self.routing_key, e
            ))
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Worth retrying: infrastructure hiccup, timeout, lock contention
    #[error("transient failure: {0}")]
    Transient(String),
    /// Never succeeds no matter how often it is retried
    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn transient(msg: impl std::fmt::Display) -> Self {
        HandlerError::Transient(msg.to_string())
    }

    pub fn permanent(msg: impl std::fmt::Display) -> Self {
        HandlerError::Permanent(msg.to_string())
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, HandlerError::Permanent(_))
    }
}

#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError>;
}

/// Handler built from an async closure.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap `f` as a [`DeliveryHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> DeliveryHandler for FnHandler<F>
where
    F: Fn(Delivery) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        (self.f)(delivery.clone()).await
    }
}

/// What to tell the broker about a delivery
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    /// Nack with requeue
    Requeue,
    /// Nack without requeue: dead-lettered when the queue has a DLX, else dropped
    Reject,
}

/// Map a handler outcome to a disposition. `max_attempts == 0` never gives up
/// on transient failures.
pub fn settle(outcome: &Result<(), HandlerError>, attempt: u32, max_attempts: u32) -> Disposition {
    match outcome {
        Ok(()) => Disposition::Ack,
        Err(HandlerError::Permanent(_)) => Disposition::Reject,
        Err(HandlerError::Transient(_)) if max_attempts > 0 && attempt >= max_attempts => {
            Disposition::Reject
        }
        Err(HandlerError::Transient(_)) => Disposition::Requeue,
    }
}

/// Run `handler` on `delivery` bounded by `timeout` and settle the outcome.
/// A timeout counts as a transient failure.
pub async fn dispatch(
    handler: &dyn DeliveryHandler,
    delivery: &Delivery,
    timeout: Duration,
    max_attempts: u32,
) -> Disposition {
    let outcome = match tokio::time::timeout(timeout, handler.handle(delivery)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(HandlerError::transient(format!(
            "handler exceeded {}ms",
            timeout.as_millis()
        ))),
    };

    let disposition = settle(&outcome, delivery.attempt, max_attempts);
    match (&outcome, disposition) {
        (Ok(()), _) => {
            debug!(queue = %delivery.queue, routing_key = %delivery.routing_key, "Delivery handled");
        }
        (Err(e), Disposition::Requeue) => {
            warn!(
                queue = %delivery.queue,
                routing_key = %delivery.routing_key,
                attempt = delivery.attempt,
                "Requeueing delivery: {}", e
            );
        }
        (Err(e), _) => {
            error!(
                queue = %delivery.queue,
                routing_key = %delivery.routing_key,
                attempt = delivery.attempt,
                "Dropping delivery: {}", e
            );
        }
    }
    disposition
}
