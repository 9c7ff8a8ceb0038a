//! # Handler Registry
//!
//! Instance-owned table mapping an event type to its handlers in
//! registration order. Every bus owns its own table, so several buses in
//! one process never see each other's subscriptions.
//!
//! The lock is only held to mutate or snapshot the table, never while a
//! handler runs, so handlers may subscribe or unsubscribe re-entrantly.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::SharedHandler;

/// Registration table shared between a bus and its consumer tasks.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<String, Vec<SharedHandler>>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event_type`.
    ///
    /// Returns the number of handlers now registered for the type.
    pub fn register(&self, event_type: &str, handler: SharedHandler) -> usize {
        let mut handlers = self.handlers.write();
        let entry = handlers.entry(event_type.to_string()).or_default();
        entry.push(handler);
        entry.len()
    }

    /// Remove one specific handler, matched by identity.
    ///
    /// Returns `true` if it was registered.
    pub fn unregister(&self, event_type: &str, handler: &SharedHandler) -> bool {
        let mut handlers = self.handlers.write();
        let Some(entry) = handlers.get_mut(event_type) else {
            return false;
        };
        let before = entry.len();
        entry.retain(|h| !Arc::ptr_eq(h, handler));
        let removed = entry.len() != before;
        if entry.is_empty() {
            handlers.remove(event_type);
        }
        removed
    }

    /// Snapshot of the handlers for `event_type`, in registration order.
    #[must_use]
    pub fn handlers_for(&self, event_type: &str) -> Vec<SharedHandler> {
        self.handlers
            .read()
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove every handler for `event_type`. Returns how many were removed.
    pub fn remove(&self, event_type: &str) -> usize {
        self.handlers
            .write()
            .remove(event_type)
            .map_or(0, |h| h.len())
    }

    /// Remove every handler. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut handlers = self.handlers.write();
        let removed = handlers.values().map(Vec::len).sum();
        handlers.clear();
        removed
    }

    /// Number of handlers registered for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().get(event_type).map_or(0, Vec::len)
    }

    /// Event types with at least one handler, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().keys().cloned().collect();
        types.sort();
        types
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
