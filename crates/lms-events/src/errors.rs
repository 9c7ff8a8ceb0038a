//! # Error Types
//!
//! Errors raised while moving envelopes to and from their wire form.

use thiserror::Error;

/// Errors from the envelope codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope could not be serialized.
    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The bytes are not a valid envelope.
    #[error("Malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// The envelope is valid but its payload does not have the requested shape.
    #[error("Payload of '{event_type}' does not match the expected shape: {source}")]
    Payload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}
