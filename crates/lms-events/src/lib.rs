//! # LMS Events
//!
//! Envelope and event catalog for the e-learning platform's event bus.
//!
//! ## Design Principles
//!
//! - **One envelope**: every event travels as an [`EventEnvelope`] carrying
//!   `id`, `type`, `timestamp`, `payload` and optional `metadata`.
//! - **Literal type strings**: the catalog's type strings are the routing and
//!   handler-lookup keys. They are append-only and never renamed.
//! - **Self-describing payloads**: payloads embed the id of every entity they
//!   reference so consumers never need a secondary lookup.
//! - **Advisory shapes**: the bus does not validate a payload against the
//!   catalog. The typed structs are a compile-time contract only.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod catalog;
pub mod envelope;
pub mod enums;
pub mod errors;

pub use catalog::{event_types, Domain, DomainEvent};
pub use envelope::{make_envelope, EnvelopeStamper, EventEnvelope, EventMetadata};
pub use enums::{CourseLevel, LessonType, NotificationChannel, UserRole};
pub use errors::CodecError;

/// Content type of a serialized envelope.
pub const CONTENT_TYPE_JSON: &str = "application/json";
