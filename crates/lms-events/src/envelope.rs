//! # Event Envelope
//!
//! The unit of transmission on the bus.
//!
//! ## Wire Format
//!
//! ```text
//! {
//!   "id": "<opaque unique string>",
//!   "type": "<dotted event type string>",
//!   "timestamp": "<ISO-8601 instant>",
//!   "payload": <json value>,
//!   "metadata": <json object, optional>
//! }
//! ```
//!
//! ## Timestamps
//!
//! The envelope timestamp is assigned by the publishing bus when `publish` is
//! invoked, never by the producer. It is distinct from the `timestamp` field
//! inside catalog payloads, which records domain-event time.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CodecError;

/// Free-form key/value map for cross-cutting concerns (trace id, source service).
///
/// Never interpreted by the bus.
pub type EventMetadata = serde_json::Map<String, serde_json::Value>;

/// The universal envelope for every event on the bus.
///
/// Generic over the payload so typed consumers can work with catalog structs;
/// the bus itself only ever moves `EventEnvelope<serde_json::Value>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<P = serde_json::Value> {
    /// Opaque unique identifier, generated at publish time.
    pub id: String,

    /// Dotted event type, e.g. `course.lesson.completed`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Creation time assigned by the publishing bus instance.
    pub timestamp: DateTime<Utc>,

    /// Event payload.
    pub payload: P,

    /// Optional pass-through metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

/// Build an envelope with a fresh id and the current time.
///
/// The type string is not checked against the catalog.
pub fn make_envelope<P>(
    event_type: impl Into<String>,
    payload: P,
    metadata: Option<EventMetadata>,
) -> EventEnvelope<P> {
    EventEnvelope {
        id: Uuid::new_v4().to_string(),
        event_type: event_type.into(),
        timestamp: Utc::now(),
        payload,
        metadata,
    }
}

impl<P> EventEnvelope<P> {
    /// Look up a single metadata entry.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }
}

impl<P: Serialize> EventEnvelope<P> {
    /// Serialize to the UTF-8 JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Encode)
    }

    /// Erase the payload type.
    pub fn into_raw(self) -> Result<EventEnvelope, CodecError> {
        let payload = serde_json::to_value(&self.payload).map_err(CodecError::Encode)?;
        Ok(EventEnvelope {
            id: self.id,
            event_type: self.event_type,
            timestamp: self.timestamp,
            payload,
            metadata: self.metadata,
        })
    }
}

impl EventEnvelope {
    /// Parse an envelope from its wire form.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }

    /// Interpret the payload as `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<EventEnvelope<T>, CodecError> {
        let payload = serde_json::from_value(self.payload).map_err(|source| CodecError::Payload {
            event_type: self.event_type.clone(),
            source,
        })?;
        Ok(EventEnvelope {
            id: self.id,
            event_type: self.event_type,
            timestamp: self.timestamp,
            payload,
            metadata: self.metadata,
        })
    }
}

/// Per-bus envelope factory.
///
/// Guarantees that timestamps handed out by one stamper never go backwards,
/// even if the wall clock does.
#[derive(Debug)]
pub struct EnvelopeStamper {
    last: Mutex<DateTime<Utc>>,
}

impl EnvelopeStamper {
    /// Create a stamper with no history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Build an envelope stamped with `max(now, previous stamp)`.
    pub fn stamp<P>(
        &self,
        event_type: impl Into<String>,
        payload: P,
        metadata: Option<EventMetadata>,
    ) -> EventEnvelope<P> {
        let mut envelope = make_envelope(event_type, payload, metadata);
        let mut last = self.last.lock();
        if envelope.timestamp < *last {
            envelope.timestamp = *last;
        }
        *last = envelope.timestamp;
        envelope
    }
}

impl Default for EnvelopeStamper {
    fn default() -> Self {
        Self::new()
    }
}
