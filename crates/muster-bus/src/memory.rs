//! In-process broker
//!
//! Models the subset of AMQP topic semantics the bus relies on: durable
//! queues that outlive their consumers, topic bindings, prefetch-bounded
//! concurrent consumers, requeue to the head of the queue and per-message
//! delivery counts. Used for single-node deployments and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

use crate::bus::{MessageBus, Subscription};
use crate::delivery::{Delivery, DeliveryHandler, Disposition, dispatch};
use crate::error::BusError;
use crate::options::BusOptions;
use crate::topic::{queue_name, topic_matches};

#[derive(Clone, Debug)]
struct Message {
    routing_key: String,
    payload: Vec<u8>,
    deliveries: u32,
}

#[derive(Default)]
struct MemoryQueue {
    messages: Mutex<VecDeque<Message>>,
    available: Notify,
}

impl MemoryQueue {
    fn push_back(&self, message: Message) {
        self.messages.lock().push_back(message);
        self.available.notify_one();
    }

    fn push_front(&self, message: Message) {
        self.messages.lock().push_front(message);
        self.available.notify_one();
    }

    fn pop(&self) -> Option<Message> {
        self.messages.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.messages.lock().len()
    }
}

#[derive(Default)]
struct Broker {
    queues: RwLock<HashMap<String, Arc<MemoryQueue>>>,
    /// (binding pattern, queue name)
    bindings: RwLock<Vec<(String, String)>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    rejected: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Broker {
    fn declare_queue(&self, name: &str) -> Arc<MemoryQueue> {
        self.queues
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn bind(&self, pattern: &str, queue: &str) {
        let mut bindings = self.bindings.write();
        if !bindings.iter().any(|(p, q)| p == pattern && q == queue) {
            bindings.push((pattern.to_string(), queue.to_string()));
        }
    }

    /// Route to every bound queue once, however many of its bindings match.
    fn route(&self, routing_key: &str, payload: &[u8]) -> usize {
        let mut targets: Vec<String> = self
            .bindings
            .read()
            .iter()
            .filter(|(pattern, _)| topic_matches(pattern, routing_key))
            .map(|(_, queue)| queue.clone())
            .collect();
        targets.sort();
        targets.dedup();

        let queues = self.queues.read();
        for name in &targets {
            if let Some(queue) = queues.get(name) {
                queue.push_back(Message {
                    routing_key: routing_key.to_string(),
                    payload: payload.to_vec(),
                    deliveries: 0,
                });
            }
        }
        targets.len()
    }
}

/// In-process [`MessageBus`]. Clones share the same broker.
#[derive(Clone)]
pub struct MemoryBus {
    broker: Arc<Broker>,
    options: BusOptions,
    unavailable: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryBus {
    pub fn new(options: BusOptions) -> Self {
        Self {
            broker: Arc::new(Broker::default()),
            options,
            unavailable: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Another client of the same broker with its own options (client id,
    /// prefetch), as a second process would connect.
    pub fn connect_as(&self, options: BusOptions) -> Self {
        Self {
            broker: self.broker.clone(),
            options,
            unavailable: self.unavailable.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make publishing fail with [`BusError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every accepted publish in order, as `(routing_key, payload)`.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.broker.published.lock().clone()
    }

    /// Published messages under `routing_key`.
    pub fn published_on(&self, routing_key: &str) -> Vec<Vec<u8>> {
        self.broker
            .published
            .lock()
            .iter()
            .filter(|(key, _)| key == routing_key)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Messages rejected by a consumer, as `(queue, payload)`.
    pub fn rejected(&self) -> Vec<(String, Vec<u8>)> {
        self.broker.rejected.lock().clone()
    }

    /// Messages waiting in `queue`, not counting unacknowledged ones.
    pub fn queue_depth(&self, queue: &str) -> usize {
        self.broker
            .queues
            .read()
            .get(queue)
            .map(|q| q.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish_bytes(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BusError::Unavailable);
        }

        let routed = self.broker.route(routing_key, &payload);
        self.broker
            .published
            .lock()
            .push((routing_key.to_string(), payload));
        debug!(routing_key, routed, "Published message");
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<Subscription, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let memory_queue = self.broker.declare_queue(queue);
        self.broker.bind(routing_key, queue);

        let (ready_tx, ready_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);

        let consumer = Consumer {
            broker: self.broker.clone(),
            queue_name: queue.to_string(),
            queue: memory_queue,
            handler,
            options: self.options.clone(),
        };
        let task = tokio::spawn(async move {
            let _ = ready_tx.send(true);
            consumer.run(stop_rx).await;
            let _ = ready_tx.send(false);
        });

        info!(queue, routing_key, "Subscribed");
        Ok(Subscription::new(queue, routing_key, ready_rx, stop_tx, task))
    }

    fn queue_for(&self, routing_key: &str) -> String {
        queue_name(&self.options.client_id, routing_key)
    }

    async fn close(&self) -> Result<(), BusError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct Consumer {
    broker: Arc<Broker>,
    queue_name: String,
    queue: Arc<MemoryQueue>,
    handler: Arc<dyn DeliveryHandler>,
    options: BusOptions,
}

impl Consumer {
    async fn run(self, stop: watch::Receiver<bool>) {
        let prefetch = self.options.prefetch();
        let timeout = self.options.handler_timeout();
        let max_attempts = self.options.max_attempts;

        let queue = self.queue.clone();
        let deliveries = futures::stream::unfold((queue, stop), |(queue, mut stop)| async move {
            loop {
                if *stop.borrow() {
                    return None;
                }
                if let Some(message) = queue.pop() {
                    return Some((message, (queue, stop)));
                }
                tokio::select! {
                    _ = queue.available.notified() => {}
                    changed = stop.changed() => {
                        if changed.is_err() {
                            return None;
                        }
                    }
                }
            }
        });

        deliveries
            .for_each_concurrent(prefetch, |mut message| {
                let handler = self.handler.clone();
                let queue = self.queue.clone();
                let broker = self.broker.clone();
                let queue_name = self.queue_name.clone();
                async move {
                    message.deliveries += 1;
                    let delivery = Delivery {
                        queue: queue_name.clone(),
                        routing_key: message.routing_key.clone(),
                        payload: message.payload.clone(),
                        redelivered: message.deliveries > 1,
                        attempt: message.deliveries,
                    };

                    match dispatch(handler.as_ref(), &delivery, timeout, max_attempts).await {
                        Disposition::Ack => {}
                        Disposition::Requeue => queue.push_front(message),
                        Disposition::Reject => {
                            warn!(queue = %queue_name, routing_key = %message.routing_key, "Message rejected");
                            broker.rejected.lock().push((queue_name, message.payload));
                        }
                    }
                }
            })
            .await;

        debug!(queue = %self.queue_name, "Consumer stopped");
    }
}
