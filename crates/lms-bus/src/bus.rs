//! # Event Bus Contract
//!
//! The interface every service uses to emit and react to events. Both
//! backends implement it; callers hold an `Arc<dyn EventBus>` and never
//! know which one they got.

use async_trait::async_trait;
use lms_events::{catalog, DomainEvent, EventEnvelope, EventMetadata};
use lms_telemetry::metrics::UNKNOWN_EVENT_TYPE;
use std::future::Future;
use std::sync::Arc;

use crate::errors::BusError;
use crate::handler::{HandlerResult, SharedHandler, TypedHandler};

/// `event_type` metric label: the type itself when the catalog lists it.
pub(crate) fn metric_label(event_type: &str) -> &str {
    if catalog::is_known(event_type) {
        event_type
    } else {
        UNKNOWN_EVENT_TYPE
    }
}

/// Publish/subscribe contract shared by all backends.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Establish backend resources.
    ///
    /// A broker that cannot be reached fails with [`BusError::Connection`];
    /// there is no retry.
    async fn connect(&self) -> Result<(), BusError>;

    /// Release backend resources. Calling it twice is a no-op.
    async fn disconnect(&self) -> Result<(), BusError>;

    /// Wrap `payload` in a fresh envelope and hand it off.
    ///
    /// # Returns
    ///
    /// The envelope that was handed off.
    async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        metadata: Option<EventMetadata>,
    ) -> Result<EventEnvelope, BusError>;

    /// Register `handler` for future envelopes of exactly `event_type`.
    ///
    /// Several handlers may be registered for one type; they run in
    /// registration order.
    async fn subscribe(&self, event_type: &str, handler: SharedHandler) -> Result<(), BusError>;

    /// Remove every local handler for `event_type`.
    async fn unsubscribe(&self, event_type: &str) -> Result<(), BusError>;

    /// Whether `connect` succeeded and `disconnect` has not been called since.
    fn is_connected(&self) -> bool;

    /// Short backend label used in logs and metrics.
    fn backend_name(&self) -> &'static str;
}

/// Typed helpers for catalog payloads.
///
/// The bus still moves JSON; these only fix the type string and payload
/// shape at compile time.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Publish a catalog payload under its own type string.
    async fn publish_event<E: DomainEvent>(
        &self,
        event: &E,
        metadata: Option<EventMetadata>,
    ) -> Result<EventEnvelope, BusError> {
        let payload = serde_json::to_value(event).map_err(lms_events::CodecError::Encode)?;
        self.publish(E::EVENT_TYPE, payload, metadata).await
    }

    /// Subscribe with a closure receiving the decoded payload.
    async fn subscribe_event<E, F, Fut>(&self, f: F) -> Result<(), BusError>
    where
        E: DomainEvent,
        F: Fn(EventEnvelope<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: SharedHandler = Arc::new(TypedHandler::<E, F>::new(f));
        self.subscribe(E::EVENT_TYPE, handler).await
    }
}

impl<B: EventBus + ?Sized> EventBusExt for B {}
