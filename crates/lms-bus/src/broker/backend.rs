//! # Broker-Backed Event Bus
//!
//! Cross-process delivery through a topic exchange.
//!
//! ## Topology
//!
//! ```text
//! publish("course.lesson.completed")
//!        │  routing key: course_lesson_completed
//!        ▼
//! ┌──────────────┐  binding: course_lesson_completed  ┌────────────────────────────────────┐
//! │  lms.events  │ ─────────────────────────────────▶ │ svc.course_lesson_completed (dur.) │
//! │   (topic)    │                                    └────────────────────────────────────┘
//! └──────────────┘                                                  │ one consumer task
//!                                                                   ▼
//!                                                      handlers in registration order
//! ```
//!
//! ## Acknowledgement
//!
//! | Outcome | Settlement |
//! |---------|------------|
//! | every handler returned `Ok` | `ack` |
//! | any handler returned `Err` | `nack`, requeue |
//! | body is not an envelope | `nack`, no requeue |
//!
//! Requeue is unbounded: a handler that always fails sees the message
//! forever. There is no dead-letter routing.
//!
//! Registrations survive `disconnect`; the next `connect` restarts a
//! consumer for every registered type. A consumer the broker cancelled is
//! restarted the same way, or by the next `subscribe` for its type.

use async_trait::async_trait;
use futures::StreamExt;
use lms_events::{EnvelopeStamper, EventEnvelope, EventMetadata, CONTENT_TYPE_JSON};
use lms_telemetry::{log_envelope, metrics, time_histogram};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::{
    BrokerChannel, BrokerConnection, BrokerConnector, Delivery, DeliveryStream, ExchangeKind,
    ExchangeOptions, MessageProperties, QueueOptions,
};
use crate::bus::{metric_label, EventBus};
use crate::config::BusConfig;
use crate::errors::{BrokerError, BusError};
use crate::handler::SharedHandler;
use crate::registry::HandlerRegistry;
use crate::routing::routing_key;

/// An open connection and the channel all bus traffic uses.
struct Session {
    connection: Box<dyn BrokerConnection>,
    channel: Arc<dyn BrokerChannel>,
}

/// A running consumer for one event type.
struct ConsumerHandle {
    tag: String,
    queue: String,
    task: JoinHandle<()>,
}

/// [`EventBus`] over a message broker.
pub struct BrokerEventBus {
    connector: Box<dyn BrokerConnector>,
    config: BusConfig,

    /// `Some` while connected.
    session: Mutex<Option<Arc<Session>>>,

    /// Handlers by event type. Shared with consumer tasks.
    registry: HandlerRegistry,

    /// Consumers by event type. Also serializes connect, subscribe,
    /// unsubscribe and disconnect.
    consumers: tokio::sync::Mutex<HashMap<String, ConsumerHandle>>,

    stamper: EnvelopeStamper,
    events_published: AtomicU64,
}

impl BrokerEventBus {
    pub const BACKEND: &'static str = "broker";

    /// Create a bus that connects through `connector`.
    pub fn new(connector: impl BrokerConnector + 'static, config: BusConfig) -> Self {
        Self::with_connector(Box::new(connector), config)
    }

    pub fn with_connector(connector: Box<dyn BrokerConnector>, config: BusConfig) -> Self {
        Self {
            connector,
            config,
            session: Mutex::new(None),
            registry: HandlerRegistry::new(),
            consumers: tokio::sync::Mutex::new(HashMap::new()),
            stamper: EnvelopeStamper::new(),
            events_published: AtomicU64::new(0),
        }
    }

    /// Create a bus for RabbitMQ.
    #[cfg(feature = "amqp")]
    pub fn amqp(config: BusConfig) -> Self {
        Self::new(super::amqp::AmqpConnector::new(), config)
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Get the total number of envelopes published.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Get the number of local handlers for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.registry.handler_count(event_type)
    }

    /// Event types with a running consumer, sorted.
    pub async fn active_consumers(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .consumers
            .lock()
            .await
            .iter()
            .filter(|(_, handle)| !handle.task.is_finished())
            .map(|(event_type, _)| event_type.clone())
            .collect();
        types.sort();
        types
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    /// Connect, open the bus channel and declare the exchange.
    async fn open_session(&self) -> Result<Arc<Session>, BusError> {
        self.config.validate()?;

        let url = self.config.redacted_url();
        let connection = self
            .connector
            .connect(&self.config.url)
            .await
            .map_err(|source| BusError::Connection {
                url: url.clone(),
                source,
            })?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(source) => {
                if let Err(close) = connection.close().await {
                    warn!(backend = Self::BACKEND, error = %close, "Failed to close connection");
                }
                return Err(BusError::Connection { url, source });
            }
        };

        if let Err(e) = channel
            .assert_exchange(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeOptions { durable: true },
            )
            .await
        {
            if let Err(close) = channel.close().await {
                warn!(backend = Self::BACKEND, error = %close, "Failed to close channel");
            }
            if let Err(close) = connection.close().await {
                warn!(backend = Self::BACKEND, error = %close, "Failed to close connection");
            }
            return Err(e.into());
        }

        let session = Arc::new(Session {
            connection,
            channel,
        });
        *self.session.lock() = Some(session.clone());
        info!(
            backend = Self::BACKEND,
            url = %url,
            exchange = %self.config.exchange,
            "Connected to broker"
        );
        Ok(session)
    }

    /// Declare, bind and start consuming the durable queue for `event_type`.
    async fn start_consumer(
        &self,
        session: &Session,
        event_type: &str,
    ) -> Result<ConsumerHandle, BrokerError> {
        let queue = self.config.queue_name(event_type);
        let key = routing_key(event_type);

        session
            .channel
            .assert_queue(&queue, QueueOptions::durable())
            .await?;
        session
            .channel
            .bind_queue(&queue, &self.config.exchange, &key)
            .await?;

        let tag = format!("{queue}.{}", Uuid::new_v4());
        let deliveries = session.channel.consume(&queue, &tag).await?;
        let task = tokio::spawn(consume_loop(
            deliveries,
            self.registry.clone(),
            event_type.to_string(),
            queue.clone(),
        ));

        info!(
            backend = Self::BACKEND,
            event_type,
            queue = %queue,
            routing_key = %key,
            "Consumer started"
        );
        Ok(ConsumerHandle { tag, queue, task })
    }
}

#[async_trait]
impl EventBus for BrokerEventBus {
    async fn connect(&self) -> Result<(), BusError> {
        let mut consumers = self.consumers.lock().await;
        let session = match self.session() {
            Some(session) => session,
            None => self.open_session().await?,
        };

        reap_stopped(&mut consumers);
        for event_type in self.registry.event_types() {
            if consumers.contains_key(&event_type) {
                continue;
            }
            match self.start_consumer(&session, &event_type).await {
                Ok(handle) => {
                    consumers.insert(event_type, handle);
                }
                Err(e) => warn!(
                    backend = Self::BACKEND,
                    event_type = %event_type,
                    error = %e,
                    "Failed to resume consumer"
                ),
            }
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        let mut consumers = self.consumers.lock().await;
        for (_, handle) in consumers.drain() {
            handle.task.abort();
        }

        let session = self.session.lock().take();
        let Some(session) = session else {
            return Ok(());
        };

        if let Err(e) = session.channel.close().await {
            warn!(backend = Self::BACKEND, error = %e, "Failed to close channel");
        }
        if let Err(e) = session.connection.close().await {
            warn!(backend = Self::BACKEND, error = %e, "Failed to close connection");
        }

        info!(
            backend = Self::BACKEND,
            retained_types = self.registry.event_types().len(),
            "Disconnected from broker"
        );
        Ok(())
    }

    async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        metadata: Option<EventMetadata>,
    ) -> Result<EventEnvelope, BusError> {
        let session = self.session().ok_or(BusError::NotConnected)?;

        let envelope = self.stamper.stamp(event_type, payload, metadata);
        let body = envelope.to_bytes()?;
        let key = routing_key(event_type);
        let properties = MessageProperties {
            persistent: true,
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
            message_id: Some(envelope.id.clone()),
            kind: Some(envelope.event_type.clone()),
        };

        session
            .channel
            .publish(&self.config.exchange, &key, &body, properties)
            .await?;

        self.events_published.fetch_add(1, Ordering::Relaxed);
        metrics::EVENTS_PUBLISHED
            .with_label_values(&[Self::BACKEND, metric_label(event_type)])
            .inc();
        log_envelope!(
            debug,
            Self::BACKEND,
            "Envelope published",
            envelope.event_type,
            envelope.id,
            routing_key = %key
        );
        Ok(envelope)
    }

    async fn subscribe(&self, event_type: &str, handler: SharedHandler) -> Result<(), BusError> {
        // Fail fast even while a connect holds the lifecycle lock.
        if self.session().is_none() {
            return Err(BusError::NotConnected);
        }
        let mut consumers = self.consumers.lock().await;
        let session = self.session().ok_or(BusError::NotConnected)?;

        reap_stopped(&mut consumers);
        let count = self.registry.register(event_type, handler.clone());
        if consumers.contains_key(event_type) {
            debug!(
                backend = Self::BACKEND,
                event_type,
                handlers = count,
                "Handler added to existing consumer"
            );
            return Ok(());
        }

        match self.start_consumer(&session, event_type).await {
            Ok(handle) => {
                consumers.insert(event_type.to_string(), handle);
                Ok(())
            }
            Err(e) => {
                self.registry.unregister(event_type, &handler);
                Err(e.into())
            }
        }
    }

    async fn unsubscribe(&self, event_type: &str) -> Result<(), BusError> {
        let mut consumers = self.consumers.lock().await;
        let removed = self.registry.remove(event_type);

        if let Some(handle) = consumers.remove(event_type) {
            if let Some(session) = self.session() {
                if let Err(e) = session.channel.cancel(&handle.tag).await {
                    warn!(
                        backend = Self::BACKEND,
                        event_type,
                        error = %e,
                        "Failed to cancel consumer"
                    );
                }
            }
            handle.task.abort();
            debug!(
                backend = Self::BACKEND,
                event_type,
                queue = %handle.queue,
                handlers_removed = removed,
                "Consumer stopped, queue retained"
            );
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    fn backend_name(&self) -> &'static str {
        Self::BACKEND
    }
}

impl Drop for BrokerEventBus {
    fn drop(&mut self) {
        for handle in self.consumers.get_mut().values() {
            handle.task.abort();
        }
    }
}

/// Forget consumers whose task has exited so they can be started again.
///
/// A consumer ends when the broker cancels it or its delivery stream fails.
fn reap_stopped(consumers: &mut HashMap<String, ConsumerHandle>) {
    consumers.retain(|event_type, handle| {
        let running = !handle.task.is_finished();
        if !running {
            warn!(
                backend = BrokerEventBus::BACKEND,
                event_type = %event_type,
                queue = %handle.queue,
                "Consumer had stopped"
            );
        }
        running
    });
}

/// Process deliveries for one event type until the stream ends.
async fn consume_loop(
    mut deliveries: DeliveryStream,
    registry: HandlerRegistry,
    event_type: String,
    queue: String,
) {
    while let Some(next) = deliveries.next().await {
        match next {
            Ok(delivery) => {
                match process_delivery(delivery.as_ref(), &registry, &event_type, &queue).await {
                    Outcome::Settled => {}
                    // A requeued message may come straight back; let other tasks run first.
                    Outcome::Requeued => tokio::task::yield_now().await,
                    Outcome::Stop => break,
                }
            }
            Err(e) => {
                warn!(
                    backend = BrokerEventBus::BACKEND,
                    queue = %queue,
                    error = %e,
                    "Delivery stream failed"
                );
                break;
            }
        }
    }
    debug!(backend = BrokerEventBus::BACKEND, queue = %queue, "Consumer loop exited");
}

/// What the consumer does after a delivery.
enum Outcome {
    Settled,
    Requeued,
    Stop,
}

/// Dispatch and settle one delivery.
async fn process_delivery(
    delivery: &dyn Delivery,
    registry: &HandlerRegistry,
    event_type: &str,
    queue: &str,
) -> Outcome {
    let envelope = match EventEnvelope::from_slice(delivery.body()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(
                backend = BrokerEventBus::BACKEND,
                queue,
                bytes = delivery.body().len(),
                error = %e,
                "Rejecting malformed message"
            );
            metrics::MESSAGES_REJECTED
                .with_label_values(&["malformed"])
                .inc();
            report_settlement(delivery.nack(false).await, queue);
            return Outcome::Settled;
        }
    };

    let handlers = registry.handlers_for(event_type);
    if handlers.is_empty() {
        // Unsubscribed while the message was in flight.
        report_settlement(delivery.nack(true).await, queue);
        return Outcome::Stop;
    }

    let _timer = time_histogram!(metrics::DISPATCH_DURATION);
    for handler in handlers {
        if let Err(e) = handler.handle(envelope.clone()).await {
            metrics::HANDLER_FAILURES
                .with_label_values(&[BrokerEventBus::BACKEND, metric_label(event_type)])
                .inc();
            log_envelope!(
                warn,
                BrokerEventBus::BACKEND,
                "Handler failed, requeueing",
                envelope.event_type,
                envelope.id,
                error = %e,
                redelivered = delivery.redelivered()
            );
            report_settlement(delivery.nack(true).await, queue);
            return Outcome::Requeued;
        }
    }

    metrics::EVENTS_DELIVERED
        .with_label_values(&[BrokerEventBus::BACKEND, metric_label(event_type)])
        .inc();
    report_settlement(delivery.ack().await, queue);
    Outcome::Settled
}

fn report_settlement(result: Result<(), BrokerError>, queue: &str) {
    if let Err(e) = result {
        warn!(
            backend = BrokerEventBus::BACKEND,
            queue,
            error = %e,
            "Failed to settle delivery"
        );
    }
}
