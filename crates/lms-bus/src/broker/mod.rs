//! # Broker Backend
//!
//! - [`client`]: the broker client interface the bus is written against
//! - [`memory`]: in-process broker with AMQP-like semantics
//! - `amqp`: RabbitMQ client (feature `amqp`)
//! - [`backend`]: [`BrokerEventBus`], the bus over any client

pub mod backend;
pub mod client;
pub mod memory;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use backend::BrokerEventBus;
pub use client::{
    BrokerChannel, BrokerConnection, BrokerConnector, Delivery, DeliveryStream, ExchangeKind,
    ExchangeOptions, MessageProperties, QueueOptions,
};
pub use memory::{Binding, MemoryBroker, PublishedMessage, QueueStats, PUBLISHED_LOG_CAPACITY};

#[cfg(feature = "amqp")]
pub use amqp::AmqpConnector;
