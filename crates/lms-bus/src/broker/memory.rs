//! # In-Memory Broker
//!
//! A process-local message broker implementing the client seam with
//! AMQP-like semantics:
//!
//! - exchanges (direct, topic, fanout) route to bound queues
//! - queues buffer messages until a consumer takes them, FIFO
//! - a delivery stays unacked until it is acked or nacked
//! - `nack(requeue)` puts the message back at the head, flagged redelivered
//! - a delivery dropped without settlement is requeued, as on channel loss
//!
//! Queues and bindings belong to the broker, not to a connection, so they
//! outlive every client the way durable topology does on a real broker.
//!
//! The broker also keeps the most recent [`PUBLISHED_LOG_CAPACITY`] messages
//! handed to any exchange for inspection. Older entries are dropped.

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::client::{
    BrokerChannel, BrokerConnection, BrokerConnector, Delivery, DeliveryStream, ExchangeKind,
    ExchangeOptions, MessageProperties, QueueOptions,
};
use crate::errors::BrokerError;
use crate::routing::topic_matches;

/// A queue-to-exchange binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

/// A message as it was handed to an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
}

/// Counters for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Waiting for a consumer.
    pub ready: usize,
    /// Delivered, not yet settled.
    pub unacked: usize,
    pub acked: u64,
    pub requeued: u64,
    /// Nacked without requeue.
    pub rejected: u64,
}

#[derive(Clone)]
struct StoredMessage {
    body: Arc<[u8]>,
    redelivered: bool,
}

struct ConsumerSlot {
    active: AtomicBool,
    wake: Notify,
}

struct QueueState {
    options: QueueOptions,
    ready: VecDeque<StoredMessage>,
    stats: QueueStats,
    consumers: HashMap<String, Arc<ConsumerSlot>>,
}

impl QueueState {
    fn new(options: QueueOptions) -> Self {
        Self {
            options,
            ready: VecDeque::new(),
            stats: QueueStats::default(),
            consumers: HashMap::new(),
        }
    }

    fn wake_consumers(&self) {
        for slot in self.consumers.values() {
            slot.wake.notify_one();
        }
    }
}

/// Messages kept in the publish log.
pub const PUBLISHED_LOG_CAPACITY: usize = 1024;

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, (ExchangeKind, ExchangeOptions)>,
    queues: HashMap<String, QueueState>,
    bindings: Vec<Binding>,
    /// Oldest first, at most `PUBLISHED_LOG_CAPACITY` entries.
    published: VecDeque<PublishedMessage>,
}

struct Inner {
    state: Mutex<BrokerState>,
    reachable: AtomicBool,
    connections_opened: AtomicUsize,
}

/// Shared handle to an in-memory broker. Clones see the same broker.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    /// Create an empty, reachable broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState::default()),
                reachable: AtomicBool::new(true),
                connections_opened: AtomicUsize::new(0),
            }),
        }
    }

    /// Make new connection attempts fail (or succeed again).
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Route a message through `exchange`.
    ///
    /// Returns how many queues received a copy. A message matching no
    /// binding is dropped, as an AMQP broker does without the mandatory flag.
    pub fn route(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: MessageProperties,
    ) -> Result<usize, BrokerError> {
        let mut state = self.inner.state.lock();
        let Some(&(kind, _)) = state.exchanges.get(exchange) else {
            return Err(BrokerError::NotFound {
                kind: "exchange",
                name: exchange.to_string(),
            });
        };

        if state.published.len() == PUBLISHED_LOG_CAPACITY {
            state.published.pop_front();
        }
        state.published.push_back(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: body.to_vec(),
            properties,
        });

        let mut targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|b| b.exchange == exchange)
            .filter(|b| match kind {
                ExchangeKind::Direct => b.routing_key == routing_key,
                ExchangeKind::Topic => topic_matches(&b.routing_key, routing_key),
                ExchangeKind::Fanout => true,
            })
            .map(|b| b.queue.clone())
            .collect();
        targets.sort();
        targets.dedup();

        let body: Arc<[u8]> = Arc::from(body);
        for name in &targets {
            if let Some(queue) = state.queues.get_mut(name) {
                queue.ready.push_back(StoredMessage {
                    body: body.clone(),
                    redelivered: false,
                });
                queue.wake_consumers();
            }
        }
        Ok(targets.len())
    }

    /// Every binding, in declaration order.
    #[must_use]
    pub fn bindings(&self) -> Vec<Binding> {
        self.inner.state.lock().bindings.clone()
    }

    /// Recent messages handed to an exchange, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.inner.state.lock().published.iter().cloned().collect()
    }

    /// Drain the publish log.
    pub fn take_published(&self) -> Vec<PublishedMessage> {
        self.inner.state.lock().published.drain(..).collect()
    }

    #[must_use]
    pub fn queue_stats(&self, queue: &str) -> Option<QueueStats> {
        self.inner.state.lock().queues.get(queue).map(|q| QueueStats {
            ready: q.ready.len(),
            ..q.stats
        })
    }

    #[must_use]
    pub fn queue_options(&self, queue: &str) -> Option<QueueOptions> {
        self.inner.state.lock().queues.get(queue).map(|q| q.options)
    }

    #[must_use]
    pub fn exchange(&self, name: &str) -> Option<(ExchangeKind, ExchangeOptions)> {
        self.inner.state.lock().exchanges.get(name).copied()
    }

    /// Active consumers on `queue`.
    #[must_use]
    pub fn consumer_count(&self, queue: &str) -> usize {
        self.inner
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.consumers.len())
    }

    /// Successful connections opened over the broker's lifetime.
    #[must_use]
    pub fn connections_opened(&self) -> usize {
        self.inner.connections_opened.load(Ordering::SeqCst)
    }

    /// Cancel every consumer on `queue` from the broker side, as RabbitMQ
    /// does when a queue is deleted or a node fails over. Their delivery
    /// streams end. Returns how many were cancelled.
    pub fn cancel_consumers(&self, queue: &str) -> usize {
        let mut state = self.inner.state.lock();
        let Some(queue_state) = state.queues.get_mut(queue) else {
            return 0;
        };
        let slots: Vec<Arc<ConsumerSlot>> =
            queue_state.consumers.drain().map(|(_, slot)| slot).collect();
        for slot in &slots {
            slot.active.store(false, Ordering::SeqCst);
            slot.wake.notify_one();
        }
        slots.len()
    }

    fn remove_consumer(&self, queue: &str, tag: &str) -> bool {
        let mut state = self.inner.state.lock();
        let Some(slot) = state
            .queues
            .get_mut(queue)
            .and_then(|q| q.consumers.remove(tag))
        else {
            return false;
        };
        slot.active.store(false, Ordering::SeqCst);
        slot.wake.notify_one();
        true
    }

    /// Take the next ready message for a consumer, or the slot to wait on.
    fn next_message(&self, queue: &str) -> Result<Option<StoredMessage>, BrokerError> {
        let mut state = self.inner.state.lock();
        let queue_state = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::NotFound {
                kind: "queue",
                name: queue.to_string(),
            })?;
        let message = queue_state.ready.pop_front();
        if message.is_some() {
            queue_state.stats.unacked += 1;
        }
        Ok(message)
    }

    fn settle(&self, queue: &str, message: &StoredMessage, outcome: Settlement) {
        let mut state = self.inner.state.lock();
        let Some(queue_state) = state.queues.get_mut(queue) else {
            return;
        };
        queue_state.stats.unacked = queue_state.stats.unacked.saturating_sub(1);
        match outcome {
            Settlement::Ack => queue_state.stats.acked += 1,
            Settlement::Reject => queue_state.stats.rejected += 1,
            Settlement::Requeue => {
                queue_state.stats.requeued += 1;
                queue_state.ready.push_front(StoredMessage {
                    body: message.body.clone(),
                    redelivered: true,
                });
                queue_state.wake_consumers();
            }
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Ack,
    Requeue,
    Reject,
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.inner.connections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            broker: self.clone(),
            open: Arc::new(AtomicBool::new(true)),
            channels: Mutex::new(Vec::new()),
        }))
    }
}

struct MemoryConnection {
    broker: MemoryBroker,
    open: Arc<AtomicBool>,
    channels: Mutex<Vec<Arc<MemoryChannel>>>,
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(BrokerError::ChannelClosed);
        }
        let channel = Arc::new(MemoryChannel {
            broker: self.broker.clone(),
            open: Arc::new(AtomicBool::new(true)),
            consumers: Mutex::new(Vec::new()),
        });
        self.channels.lock().push(channel.clone());
        Ok(channel)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.open.store(false, Ordering::SeqCst);
        let channels: Vec<Arc<MemoryChannel>> = self.channels.lock().drain(..).collect();
        for channel in channels {
            channel.shutdown();
        }
        Ok(())
    }
}

struct MemoryChannel {
    broker: MemoryBroker,
    open: Arc<AtomicBool>,
    /// (queue, consumer tag) pairs started on this channel.
    consumers: Mutex<Vec<(String, String)>>,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::ChannelClosed)
        }
    }

    fn shutdown(&self) {
        self.open.store(false, Ordering::SeqCst);
        let consumers: Vec<(String, String)> = self.consumers.lock().drain(..).collect();
        for (queue, tag) in consumers {
            self.broker.remove_consumer(&queue, &tag);
        }
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.inner.state.lock();
        match state.exchanges.get(name) {
            Some((existing, _)) if *existing != kind => Err(BrokerError::PreconditionFailed(
                format!("exchange '{name}' exists as {existing:?}, declared as {kind:?}"),
            )),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(name.to_string(), (kind, options));
                Ok(())
            }
        }
    }

    async fn assert_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.inner.state.lock();
        match state.queues.get(name) {
            Some(queue) if queue.options.durable != options.durable => {
                Err(BrokerError::PreconditionFailed(format!(
                    "queue '{name}' exists with durable={}",
                    queue.options.durable
                )))
            }
            Some(_) => Ok(()),
            None => {
                state.queues.insert(name.to_string(), QueueState::new(options));
                Ok(())
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.inner.state.lock();
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::NotFound {
                kind: "queue",
                name: queue.to_string(),
            });
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(BrokerError::NotFound {
                kind: "exchange",
                name: exchange.to_string(),
            });
        }
        let binding = Binding {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !state.bindings.contains(&binding) {
            state.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: MessageProperties,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.broker
            .route(exchange, routing_key, body, properties)
            .map(|_| ())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        self.ensure_open()?;
        let slot = {
            let mut state = self.broker.inner.state.lock();
            let queue_state = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| BrokerError::NotFound {
                    kind: "queue",
                    name: queue.to_string(),
                })?;
            if queue_state.consumers.contains_key(consumer_tag) {
                return Err(BrokerError::PreconditionFailed(format!(
                    "consumer tag '{consumer_tag}' already in use"
                )));
            }
            let slot = Arc::new(ConsumerSlot {
                active: AtomicBool::new(true),
                wake: Notify::new(),
            });
            queue_state
                .consumers
                .insert(consumer_tag.to_string(), slot.clone());
            slot
        };
        self.consumers
            .lock()
            .push((queue.to_string(), consumer_tag.to_string()));

        let cursor = ConsumerCursor {
            broker: self.broker.clone(),
            queue: queue.to_string(),
            slot,
            channel_open: self.open.clone(),
        };
        Ok(Box::pin(stream::unfold(cursor, |cursor| async move {
            loop {
                if !cursor.slot.active.load(Ordering::SeqCst) {
                    return None;
                }
                match cursor.broker.next_message(&cursor.queue) {
                    Ok(Some(message)) => {
                        let delivery = MemoryDelivery {
                            broker: cursor.broker.clone(),
                            queue: cursor.queue.clone(),
                            message,
                            settled: AtomicBool::new(false),
                            channel_open: cursor.channel_open.clone(),
                        };
                        let item: Box<dyn Delivery> = Box::new(delivery);
                        return Some((Ok(item), cursor));
                    }
                    Ok(None) => cursor.slot.wake.notified().await,
                    Err(e) => {
                        cursor.slot.active.store(false, Ordering::SeqCst);
                        return Some((Err(e), cursor));
                    }
                }
            }
        })))
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let entry = {
            let mut consumers = self.consumers.lock();
            let index = consumers.iter().position(|(_, tag)| tag == consumer_tag);
            index.map(|i| consumers.remove(i))
        };
        match entry {
            Some((queue, tag)) => {
                self.broker.remove_consumer(&queue, &tag);
                Ok(())
            }
            None => Err(BrokerError::NotFound {
                kind: "consumer",
                name: consumer_tag.to_string(),
            }),
        }
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.shutdown();
        Ok(())
    }
}

struct ConsumerCursor {
    broker: MemoryBroker,
    queue: String,
    slot: Arc<ConsumerSlot>,
    channel_open: Arc<AtomicBool>,
}

struct MemoryDelivery {
    broker: MemoryBroker,
    queue: String,
    message: StoredMessage,
    settled: AtomicBool,
    channel_open: Arc<AtomicBool>,
}

impl MemoryDelivery {
    fn finish(&self, outcome: Settlement) -> Result<(), BrokerError> {
        if !self.channel_open.load(Ordering::SeqCst) {
            return Err(BrokerError::ChannelClosed);
        }
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::PreconditionFailed(
                "delivery already settled".to_string(),
            ));
        }
        self.broker.settle(&self.queue, &self.message, outcome);
        Ok(())
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.finish(Settlement::Ack)
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.finish(if requeue {
            Settlement::Requeue
        } else {
            Settlement::Reject
        })
    }
}

impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.broker
                .settle(&self.queue, &self.message, Settlement::Requeue);
        }
    }
}
