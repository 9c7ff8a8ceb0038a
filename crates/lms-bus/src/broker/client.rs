//! # Broker Client Seam
//!
//! The slice of a message-broker client the broker-backed bus relies on:
//! connect, open a channel, declare topology, publish, consume, settle.
//!
//! Implemented over AMQP by [`super::amqp`] and in-process by
//! [`super::memory::MemoryBroker`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

use crate::errors::BrokerError;

/// Exchange routing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    Direct,
    Topic,
    Fanout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExchangeOptions {
    /// Survives a broker restart.
    pub durable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

impl QueueOptions {
    /// Shared, long-lived queue.
    #[must_use]
    pub fn durable() -> Self {
        Self {
            durable: true,
            ..Self::default()
        }
    }
}

/// Properties attached to a published message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageProperties {
    /// Written to disk by the broker.
    pub persistent: bool,
    pub content_type: Option<String>,
    pub message_id: Option<String>,
    /// Application-defined message type.
    pub kind: Option<String>,
}

/// Stream of deliveries from one consumer.
pub type DeliveryStream = BoxStream<'static, Result<Box<dyn Delivery>, BrokerError>>;

/// Opens connections to a broker.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// An open broker connection.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// A channel on an open connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange, or confirm an existing one has the same kind.
    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<(), BrokerError>;

    /// Declare a queue, or confirm an existing one.
    async fn assert_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// Fire-and-forget publish; no confirm is awaited.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: MessageProperties,
    ) -> Result<(), BrokerError>;

    /// Start consuming `queue` under `consumer_tag`.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, BrokerError>;

    /// Stop the consumer registered under `consumer_tag`.
    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// One received message awaiting settlement.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn body(&self) -> &[u8];

    /// Whether this message was delivered before and not acknowledged.
    fn redelivered(&self) -> bool;

    async fn ack(&self) -> Result<(), BrokerError>;

    /// Negative acknowledgement. With `requeue` the broker delivers the
    /// message again; without it the message is dropped.
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}
