//! AMQP 0-9-1 message bus
//!
//! One connection per bus, opened on first use and reopened when it drops.
//! Publishing shares one lazily created channel. Each subscription runs a
//! supervisor task that owns its own channel: declare exchange, queue and
//! binding, set prefetch, consume, and on connection loss wait
//! `reconnect_delay` and do it all again.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::bus::{MessageBus, Subscription};
use crate::delivery::{Delivery, DeliveryHandler, Disposition, dispatch};
use crate::error::BusError;
use crate::options::BusOptions;
use crate::topic::queue_name;

const CONTENT_TYPE_JSON: &str = "application/json";
const PERSISTENT: u8 = 2;
const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";
const DEAD_LETTER_HEADER: &str = "x-dead-letter-exchange";

struct Shared {
    options: BusOptions,
    connection: Mutex<Option<Arc<Connection>>>,
    publisher: Mutex<Option<Channel>>,
    closed: AtomicBool,
    stop: watch::Sender<bool>,
}

impl Shared {
    async fn connection(&self) -> Result<Arc<Connection>, BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let mut guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref()
            && connection.status().connected()
        {
            return Ok(connection.clone());
        }

        let connection = Connection::connect(&self.options.amqp_uri(), ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        info!(
            host = %self.options.host,
            port = self.options.port,
            exchange = %self.options.exchange,
            "Connected to message broker"
        );

        let connection = Arc::new(connection);
        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// New channel with the exchange declared. Declaring is idempotent.
    async fn open_channel(&self) -> Result<Channel, BusError> {
        let connection = self.connection().await?;
        let channel = connection.create_channel().await?;
        channel
            .exchange_declare(
                &self.options.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    async fn publisher(&self) -> Result<Channel, BusError> {
        let mut guard = self.publisher.lock().await;
        if let Some(channel) = guard.as_ref()
            && channel.status().connected()
        {
            return Ok(channel.clone());
        }

        let channel = self.open_channel().await?;
        *guard = Some(channel.clone());
        Ok(channel)
    }

    async fn reset_publisher(&self) {
        self.publisher.lock().await.take();
    }
}

/// [`MessageBus`] over an AMQP broker. Construction does not connect.
pub struct AmqpBus {
    shared: Arc<Shared>,
}

impl AmqpBus {
    pub fn new(options: BusOptions) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                options,
                connection: Mutex::new(None),
                publisher: Mutex::new(None),
                closed: AtomicBool::new(false),
                stop,
            }),
        }
    }

    pub fn options(&self) -> &BusOptions {
        &self.shared.options
    }
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn publish_bytes(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let channel = self.shared.publisher().await?;
        let properties = BasicProperties::default()
            .with_content_type(CONTENT_TYPE_JSON.into())
            .with_delivery_mode(PERSISTENT);

        let published = channel
            .basic_publish(
                &self.shared.options.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await;

        let outcome = match published {
            Ok(confirm) => confirm.await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            self.shared.reset_publisher().await;
            return Err(e.into());
        }

        debug!(routing_key, bytes = payload.len(), "Published message");
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        routing_key: &str,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<Subscription, BusError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        let (ready_tx, ready_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);

        let supervisor = Supervisor {
            shared: self.shared.clone(),
            queue: queue.to_string(),
            routing_key: routing_key.to_string(),
            handler,
        };
        let bus_stop = self.shared.stop.subscribe();
        let task = tokio::spawn(supervisor.run(ready_tx, stop_rx, bus_stop));

        Ok(Subscription::new(queue, routing_key, ready_rx, stop_tx, task))
    }

    fn queue_for(&self, routing_key: &str) -> String {
        queue_name(&self.shared.options.client_id, routing_key)
    }

    async fn close(&self) -> Result<(), BusError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        let _ = self.shared.stop.send(true);

        if let Some(channel) = self.shared.publisher.lock().await.take()
            && let Err(e) = channel.close(200, "closing").await
        {
            debug!("Publisher channel close failed: {}", e);
        }
        if let Some(connection) = self.shared.connection.lock().await.take() {
            connection.close(200, "closing").await?;
            info!("Disconnected from message broker");
        }
        Ok(())
    }
}

enum ConsumeEnd {
    Stopped,
    Lost,
}

struct Supervisor {
    shared: Arc<Shared>,
    queue: String,
    routing_key: String,
    handler: Arc<dyn DeliveryHandler>,
}

impl Supervisor {
    async fn run(
        self,
        ready: watch::Sender<bool>,
        stop: watch::Receiver<bool>,
        bus_stop: watch::Receiver<bool>,
    ) {
        let delay = self.shared.options.reconnect_delay();

        loop {
            let halt = halted(stop.clone(), bus_stop.clone());
            match self.consume(&ready, halt).await {
                Ok(ConsumeEnd::Stopped) => break,
                Ok(ConsumeEnd::Lost) => {
                    warn!(queue = %self.queue, "Consumer lost its channel, reconnecting");
                }
                Err(BusError::Closed) => break,
                Err(e) => {
                    warn!(
                        queue = %self.queue,
                        routing_key = %self.routing_key,
                        "Subscription setup failed, retrying in {}ms: {}",
                        delay.as_millis(),
                        e
                    );
                }
            }
            let _ = ready.send(false);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = halted(stop.clone(), bus_stop.clone()) => break,
            }
        }

        let _ = ready.send(false);
        info!(queue = %self.queue, "Consumer stopped");
    }

    async fn consume(
        &self,
        ready: &watch::Sender<bool>,
        halt: impl Future<Output = ()> + Send,
    ) -> Result<ConsumeEnd, BusError> {
        let options = &self.shared.options;
        let channel = self.shared.open_channel().await?;

        let mut arguments = FieldTable::default();
        if let Some(dlx) = options.dead_letter_exchange.as_deref() {
            arguments.insert(DEAD_LETTER_HEADER.into(), AMQPValue::LongString(dlx.into()));
        }
        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await?;
        channel
            .queue_bind(
                &self.queue,
                &options.exchange,
                &self.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        channel
            .basic_qos(options.prefetch.max(1), BasicQosOptions::default())
            .await?;

        let consumer_tag = format!("{}.{}", options.client_id, self.queue);
        let consumer = channel
            .basic_consume(
                &self.queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let _ = ready.send(true);
        info!(
            queue = %self.queue,
            routing_key = %self.routing_key,
            prefetch = options.prefetch,
            "Subscribed"
        );

        let stopped = Arc::new(AtomicBool::new(false));
        let halt = {
            let stopped = stopped.clone();
            async move {
                halt.await;
                stopped.store(true, Ordering::SeqCst);
            }
        };

        consumer
            .take_until(halt)
            .take_while(|item| {
                if let Err(e) = item {
                    warn!(queue = %self.queue, "Consumer stream error: {}", e);
                }
                futures::future::ready(item.is_ok())
            })
            .filter_map(|item| futures::future::ready(item.ok()))
            .for_each_concurrent(options.prefetch(), |delivery| self.handle(delivery))
            .await;

        if stopped.load(Ordering::SeqCst) {
            if let Err(e) = channel
                .basic_cancel(&consumer_tag, BasicCancelOptions::default())
                .await
            {
                debug!(queue = %self.queue, "Consumer cancel failed: {}", e);
            }
            let _ = channel.close(200, "closing").await;
            Ok(ConsumeEnd::Stopped)
        } else {
            Ok(ConsumeEnd::Lost)
        }
    }

    async fn handle(&self, delivery: lapin::message::Delivery) {
        let options = &self.shared.options;
        let message = Delivery {
            queue: self.queue.clone(),
            routing_key: delivery.routing_key.as_str().to_string(),
            payload: delivery.data.clone(),
            redelivered: delivery.redelivered,
            attempt: attempt_of(delivery.properties.headers().as_ref(), delivery.redelivered),
        };

        let disposition = dispatch(
            self.handler.as_ref(),
            &message,
            options.handler_timeout(),
            options.max_attempts,
        )
        .await;

        let settled = match disposition {
            Disposition::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
            Disposition::Requeue => {
                delivery
                    .acker
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await
            }
            Disposition::Reject => {
                delivery
                    .acker
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..Default::default()
                    })
                    .await
            }
        };
        if let Err(e) = settled {
            error!(
                queue = %self.queue,
                routing_key = %message.routing_key,
                "Failed to settle delivery, broker will redeliver: {}", e
            );
        }
    }
}

/// Resolves once either stop flag is raised or its sender is gone.
async fn halted(mut stop: watch::Receiver<bool>, mut bus_stop: watch::Receiver<bool>) {
    tokio::select! {
        _ = stop.wait_for(|s| *s) => {}
        _ = bus_stop.wait_for(|s| *s) => {}
    }
}

/// Delivery attempt, 1-based. Quorum queues report prior deliveries in
/// `x-delivery-count`; classic queues only say whether this is a redelivery.
fn attempt_of(headers: Option<&FieldTable>, redelivered: bool) -> u32 {
    let prior = headers.and_then(|headers| {
        headers
            .inner()
            .iter()
            .find(|(key, _)| key.as_str() == DELIVERY_COUNT_HEADER)
            .and_then(|(_, value)| amqp_count(value))
    });

    match prior {
        Some(count) => count.saturating_add(1),
        None if redelivered => 2,
        None => 1,
    }
}

fn amqp_count(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortUInt(n) => Some(u32::from(*n)),
        AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
        AMQPValue::LongUInt(n) => Some(*n),
        AMQPValue::ShortShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
        _ => None,
    }
}
