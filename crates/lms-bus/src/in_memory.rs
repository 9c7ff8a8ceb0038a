//! # In-Process Event Bus
//!
//! Dispatches envelopes to handlers registered in the same process. Used in
//! tests, local development and single-process deployments.
//!
//! ## Dispatch Semantics
//!
//! - Handlers run one after another in registration order.
//! - `publish` resolves after the last handler returns.
//! - The first handler error aborts the dispatch and is returned to the
//!   publisher; later handlers are not invoked.
//!
//! Delivery is not gated by connection state: `publish` dispatches even
//! before `connect`. `disconnect` clears every registration.

use async_trait::async_trait;
use lms_events::{catalog, EnvelopeStamper, EventEnvelope, EventMetadata};
use lms_telemetry::{log_envelope, metrics, time_histogram};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

use crate::bus::{metric_label, EventBus};
use crate::errors::BusError;
use crate::handler::SharedHandler;
use crate::registry::HandlerRegistry;

/// Same-process implementation of [`EventBus`].
pub struct InMemoryEventBus {
    /// Handlers by event type.
    registry: HandlerRegistry,

    /// Per-instance envelope factory.
    stamper: EnvelopeStamper,

    /// Tracks connect/disconnect calls only.
    connected: AtomicBool,

    /// Total envelopes published.
    events_published: AtomicU64,
}

impl InMemoryEventBus {
    pub const BACKEND: &'static str = "in_memory";

    /// Create a new in-process bus with no registrations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(),
            stamper: EnvelopeStamper::new(),
            connected: AtomicBool::new(false),
            events_published: AtomicU64::new(0),
        }
    }

    /// Get the total number of envelopes published.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Get the number of handlers registered for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.registry.handler_count(event_type)
    }

    /// Run every handler for the envelope's type, stopping at the first error.
    async fn dispatch(&self, envelope: &EventEnvelope) -> Result<(), BusError> {
        let handlers = self.registry.handlers_for(&envelope.event_type);
        if handlers.is_empty() {
            log_envelope!(
                debug,
                Self::BACKEND,
                "No handlers registered",
                envelope.event_type,
                envelope.id
            );
            return Ok(());
        }

        let _timer = time_histogram!(metrics::DISPATCH_DURATION);
        for handler in handlers {
            if let Err(source) = handler.handle(envelope.clone()).await {
                metrics::HANDLER_FAILURES
                    .with_label_values(&[Self::BACKEND, metric_label(&envelope.event_type)])
                    .inc();
                return Err(BusError::Handler {
                    event_type: envelope.event_type.clone(),
                    source,
                });
            }
        }

        metrics::EVENTS_DELIVERED
            .with_label_values(&[Self::BACKEND, metric_label(&envelope.event_type)])
            .inc();
        Ok(())
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn connect(&self) -> Result<(), BusError> {
        self.connected.store(true, Ordering::SeqCst);
        debug!(backend = Self::BACKEND, "Event bus connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        let removed = self.registry.clear();
        if was_connected || removed > 0 {
            debug!(
                backend = Self::BACKEND,
                handlers_removed = removed,
                "Event bus disconnected"
            );
        }
        Ok(())
    }

    async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        metadata: Option<EventMetadata>,
    ) -> Result<EventEnvelope, BusError> {
        let envelope = self.stamper.stamp(event_type, payload, metadata);

        self.events_published.fetch_add(1, Ordering::Relaxed);
        metrics::EVENTS_PUBLISHED
            .with_label_values(&[Self::BACKEND, metric_label(event_type)])
            .inc();

        if !catalog::is_known(event_type) {
            log_envelope!(
                debug,
                Self::BACKEND,
                "Publishing type outside the catalog",
                envelope.event_type,
                envelope.id
            );
        }

        self.dispatch(&envelope).await?;
        Ok(envelope)
    }

    async fn subscribe(&self, event_type: &str, handler: SharedHandler) -> Result<(), BusError> {
        let count = self.registry.register(event_type, handler);
        debug!(
            backend = Self::BACKEND,
            event_type,
            handlers = count,
            "Handler subscribed"
        );
        Ok(())
    }

    async fn unsubscribe(&self, event_type: &str) -> Result<(), BusError> {
        let removed = self.registry.remove(event_type);
        debug!(
            backend = Self::BACKEND,
            event_type,
            handlers_removed = removed,
            "Handlers unsubscribed"
        );
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn backend_name(&self) -> &'static str {
        Self::BACKEND
    }
}
