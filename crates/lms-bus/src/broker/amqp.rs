//! # AMQP Adapter
//!
//! RabbitMQ implementation of the broker client seam over `lapin`.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};
use std::sync::Arc;

use super::client::{
    BrokerChannel, BrokerConnection, BrokerConnector, Delivery, DeliveryStream, ExchangeKind,
    ExchangeOptions, MessageProperties, QueueOptions,
};
use crate::config::redact_url;
use crate::errors::BrokerError;

/// AMQP delivery mode for messages written to disk.
const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

impl From<lapin::Error> for BrokerError {
    fn from(e: lapin::Error) -> Self {
        match e {
            lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
                BrokerError::ChannelClosed
            }
            other => BrokerError::Protocol(other.to_string()),
        }
    }
}

/// Opens `lapin` connections.
#[derive(Clone, Default)]
pub struct AmqpConnector {
    properties: ConnectionProperties,
}

impl AmqpConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom connection properties (executor, client name).
    #[must_use]
    pub fn with_properties(properties: ConnectionProperties) -> Self {
        Self { properties }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let connection = Connection::connect(url, self.properties.clone())
            .await
            .map_err(|e| BrokerError::Unreachable {
                url: redact_url(url),
                reason: e.to_string(),
            })?;
        Ok(Box::new(AmqpConnection { inner: connection }))
    }
}

struct AmqpConnection {
    inner: Connection,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn create_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let channel = self.inner.create_channel().await?;
        Ok(Arc::new(AmqpChannel { inner: channel }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.inner.close(REPLY_SUCCESS, "OK").await?;
        Ok(())
    }
}

struct AmqpChannel {
    inner: lapin::Channel,
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

fn basic_properties(properties: MessageProperties) -> BasicProperties {
    let mut props = BasicProperties::default();
    if properties.persistent {
        props = props.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
    }
    if let Some(content_type) = properties.content_type {
        props = props.with_content_type(content_type.into());
    }
    if let Some(message_id) = properties.message_id {
        props = props.with_message_id(message_id.into());
    }
    if let Some(kind) = properties.kind {
        props = props.with_kind(kind.into());
    }
    props
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn assert_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<(), BrokerError> {
        self.inner
            .exchange_declare(
                name,
                exchange_kind(kind),
                ExchangeDeclareOptions {
                    durable: options.durable,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn assert_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError> {
        self.inner
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.inner
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        properties: MessageProperties,
    ) -> Result<(), BrokerError> {
        // The returned confirm is dropped: publishing is fire-and-forget.
        self.inner
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                basic_properties(properties),
            )
            .await?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let consumer = self
            .inner
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer
            .map(|result| {
                result
                    .map(|delivery| Box::new(AmqpDelivery::from(delivery)) as Box<dyn Delivery>)
                    .map_err(BrokerError::from)
            })
            .boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.inner
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.inner.close(REPLY_SUCCESS, "OK").await?;
        Ok(())
    }
}

struct AmqpDelivery {
    body: Vec<u8>,
    redelivered: bool,
    acker: lapin::acker::Acker,
}

impl From<lapin::message::Delivery> for AmqpDelivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Self {
            body: delivery.data,
            redelivered: delivery.redelivered,
            acker: delivery.acker,
        }
    }
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.acker
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await?;
        Ok(())
    }
}
