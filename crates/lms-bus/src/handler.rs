//! # Event Handlers
//!
//! A handler is any async callable taking an envelope. Returning `Err` is
//! the only signal the bus inspects: the in-process backend propagates it to
//! the publisher, the broker backend turns it into a requeue.

use async_trait::async_trait;
use lms_events::{DomainEvent, EventEnvelope};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Outcome of a handler invocation.
pub type HandlerResult = anyhow::Result<()>;

/// Receives envelopes for the event types it is subscribed to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one envelope.
    async fn handle(&self, envelope: EventEnvelope) -> HandlerResult;
}

/// Handlers are shared between the registration table and in-flight dispatches.
pub type SharedHandler = Arc<dyn EventHandler>;

/// Adapter turning an async closure into an [`EventHandler`].
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a handler.
///
/// ```rust,ignore
/// let handler = handler_fn(|envelope| async move {
///     println!("{}", envelope.event_type);
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> SharedHandler
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventEnvelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, envelope: EventEnvelope) -> HandlerResult {
        (self.f)(envelope).await
    }
}

/// Handler for one catalog payload type.
///
/// Decodes the payload into `E` before calling the closure; a payload of the
/// wrong shape is reported as a handler error.
pub struct TypedHandler<E, F> {
    f: F,
    _event: PhantomData<fn() -> E>,
}

impl<E, F> TypedHandler<E, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E, F, Fut> EventHandler for TypedHandler<E, F>
where
    E: DomainEvent,
    F: Fn(EventEnvelope<E>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, envelope: EventEnvelope) -> HandlerResult {
        let typed = envelope.decode::<E>()?;
        (self.f)(typed).await
    }
}
