//! Message bus abstraction

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::delivery::DeliveryHandler;
use crate::error::BusError;

/// Durable topic exchange shared by every service.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a persistent message under `routing_key`. Establishes the
    /// channel and declares the exchange on first use.
    async fn publish_bytes(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Bind the durable queue `queue` to `routing_key` and consume it with
    /// `handler`, at most `prefetch` deliveries in flight. Returns once the
    /// consumer task is running; await [`Subscription::ready`] for the
    /// binding itself.
    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<Subscription, BusError>;

    /// Consumer queue name for `routing_key` under this bus's client id.
    fn queue_for(&self, routing_key: &str) -> String;

    /// Stop publishing and drop broker connections.
    async fn close(&self) -> Result<(), BusError>;
}

#[async_trait]
pub trait MessageBusExt: MessageBus {
    /// Serialize `event` as JSON and publish it under `routing_key`.
    async fn publish<T: Serialize + Sync>(&self, event: &T, routing_key: &str) -> Result<(), BusError> {
        let payload = serde_json::to_vec(event)?;
        self.publish_bytes(routing_key, payload).await
    }
}

impl<B: MessageBus + ?Sized> MessageBusExt for B {}

/// Running consumer. Dropping the handle stops the consumer without waiting
/// for in-flight deliveries; [`close`](Self::close) waits for them.
pub struct Subscription {
    queue: String,
    routing_key: String,
    ready: watch::Receiver<bool>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wrap a running consumer task. `ready` flips to true once the queue is
    /// bound; `stop` is raised by [`close`](Self::close).
    pub fn new(
        queue: &str,
        routing_key: &str,
        ready: watch::Receiver<bool>,
        stop: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            queue: queue.to_string(),
            routing_key: routing_key.to_string(),
            ready,
            stop,
            task,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// True while the queue is declared, bound and consumed.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until the consumer is bound. Errors with [`BusError::Closed`] when
    /// the consumer task ends first.
    pub async fn ready(&self) -> Result<(), BusError> {
        self.readiness().wait().await
    }

    /// Detached view of the bound state that outlives borrows of `self`.
    pub fn readiness(&self) -> Readiness {
        Readiness(self.ready.clone())
    }

    /// Stop consuming. In-flight deliveries finish and settle first.
    pub async fn close(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            debug!(queue = %self.queue, "Consumer task ended abnormally: {}", e);
        }
    }
}

/// Bound state of one consumer, cloned out of a [`Subscription`]
#[derive(Clone, Debug)]
pub struct Readiness(watch::Receiver<bool>);

impl Readiness {
    pub fn is_ready(&self) -> bool {
        *self.0.borrow()
    }

    pub async fn wait(mut self) -> Result<(), BusError> {
        self.0
            .wait_for(|bound| *bound)
            .await
            .map(|_| ())
            .map_err(|_| BusError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BusOptions, MemoryBus};

    #[derive(Serialize)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn test_publish_json_through_trait_object() {
        let memory = Arc::new(MemoryBus::new(BusOptions::memory()));
        let bus: Arc<dyn MessageBus> = memory.clone();

        bus.publish(&Ping { n: 7 }, "ping").await.unwrap();

        let published = memory.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "ping");
        assert_eq!(published[0].1, br#"{"n":7}"#.to_vec());
    }

    #[tokio::test]
    async fn test_readiness_follows_consumer() {
        let (ready_tx, ready_rx) = watch::channel(false);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
            drop(ready_tx);
        });
        let subscription = Subscription::new("q", "ping", ready_rx, stop_tx, task);

        let readiness = subscription.readiness();
        assert!(!readiness.is_ready());
        subscription.close().await;
        assert!(matches!(readiness.wait().await, Err(BusError::Closed)));
    }
}
