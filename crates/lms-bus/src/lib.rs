//! # LMS Bus - Event Bus for Inter-Service Communication
//!
//! Services never call each other for domain reactions. They publish facts
//! and subscribe to the facts they care about.
//!
//! ## Choreography Pattern
//!
//! ```text
//! ┌────────────────┐                    ┌──────────────────┐
//! │ course-service │                    │ progress-service │
//! │                │    publish()       │                  │
//! │                │ ──────┐            │                  │
//! └────────────────┘       │            └──────────────────┘
//!                          ▼                    ↑
//!                    ┌──────────────┐           │
//!                    │  Event Bus   │           │
//!                    │              │ ──────────┘
//!                    └──────────────┘  subscribe()
//! ```
//!
//! ## Backends
//!
//! | Backend | Delivery | Failure signal |
//! |---------|----------|----------------|
//! | [`InMemoryEventBus`] | same process, before `publish` returns | error returned to the publisher |
//! | [`BrokerEventBus`] | via topic exchange, asynchronous | message requeued |
//!
//! Both implement [`EventBus`]; pick one at startup with [`build_event_bus`].

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod broker;
pub mod bus;
pub mod config;
pub mod errors;
pub mod handler;
pub mod in_memory;
pub mod registry;
pub mod routing;

use std::sync::Arc;

// Re-export main types
pub use broker::{BrokerEventBus, MemoryBroker};
pub use bus::{EventBus, EventBusExt};
pub use config::{BackendKind, BusConfig, ConfigError};
pub use errors::{BrokerError, BusError};
pub use handler::{handler_fn, EventHandler, HandlerResult, SharedHandler, TypedHandler};
pub use in_memory::InMemoryEventBus;
pub use registry::HandlerRegistry;
pub use routing::{queue_name, routing_key};

pub use lms_events::{EventEnvelope, EventMetadata};

/// Build the backend selected by `config`.
///
/// The bus is returned unconnected.
pub fn build_event_bus(config: &BusConfig) -> Result<Arc<dyn EventBus>, BusError> {
    config.validate()?;
    match config.backend {
        BackendKind::InMemory => Ok(Arc::new(InMemoryEventBus::new())),
        #[cfg(feature = "amqp")]
        BackendKind::Amqp => Ok(Arc::new(BrokerEventBus::amqp(config.clone()))),
        #[cfg(not(feature = "amqp"))]
        BackendKind::Amqp => Err(BusError::BackendUnavailable("amqp")),
    }
}
