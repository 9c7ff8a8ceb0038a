//! # LMS Telemetry
//!
//! Logging and metrics for services built on the LMS event bus.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lms_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LMS_SERVICE_NAME` | `lms` | Service name in logs |
//! | `LMS_LOG_LEVEL` | `info` | Log level filter |
//! | `LMS_JSON_LOGS` | `false` | JSON log output |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, DISPATCH_DURATION,
    EVENTS_DELIVERED, EVENTS_PUBLISHED, HANDLER_FAILURES, MESSAGES_REJECTED,
};

use thiserror::Error;

/// Errors raised while installing logging or metrics.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("Logging setup failed: {0}")]
    LoggingInit(String),

    /// A bus metric could not be registered or encoded.
    #[error("Metrics setup failed: {0}")]
    MetricsInit(String),

    #[error("Bad telemetry setting: {0}")]
    Config(String),
}

/// Install logging, then register the bus metrics.
///
/// Keep the returned guard alive until the service exits.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_logging(&config)?;
    let metrics = register_metrics()?;
    tracing::info!(service = %config.service_name, "Bus metrics registered");

    Ok(TelemetryGuard {
        service_name: config.service_name,
        _metrics: metrics,
    })
}

/// Holds telemetry for the lifetime of a service.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl TelemetryGuard {
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Telemetry stopped");
    }
}
