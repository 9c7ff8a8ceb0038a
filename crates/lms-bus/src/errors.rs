//! # Error Types
//!
//! Errors surfaced by the bus contract and by broker clients.

use lms_events::CodecError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from event bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// `publish`/`subscribe` called before `connect` or after `disconnect`.
    #[error("Event bus is not connected")]
    NotConnected,

    /// The broker could not be reached or refused the channel.
    #[error("Failed to connect to broker at {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: BrokerError,
    },

    /// A broker operation failed on an open channel.
    #[error("Broker operation failed: {0}")]
    Broker(#[from] BrokerError),

    /// A handler returned an error during in-process dispatch.
    #[error("Handler for '{event_type}' failed: {source}")]
    Handler {
        event_type: String,
        #[source]
        source: anyhow::Error,
    },

    /// The envelope could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The bus configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured backend was not compiled into this build.
    #[error("Backend '{0}' is not available in this build")]
    BackendUnavailable(&'static str),
}

/// Errors reported by a broker client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Broker unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("Channel is closed")]
    ChannelClosed,

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Broker protocol error: {0}")]
    Protocol(String),
}
