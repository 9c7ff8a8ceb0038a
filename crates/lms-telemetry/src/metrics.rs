//! Prometheus metrics for the event bus.
//!
//! All metrics follow the naming convention: `lms_eventbus_<metric>_<unit>`.
//! Labels use the backend name (`in_memory`, `broker`) and the event type.
//! Types outside the event catalog share the [`UNKNOWN_EVENT_TYPE`] label so
//! the label set stays bounded.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

/// `event_type` label value for types the catalog does not list.
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Envelopes handed to a backend
    pub static ref EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("lms_eventbus_events_published_total", "Envelopes handed to the bus"),
        &["backend", "event_type"]
    ).expect("metric creation failed");

    /// Envelopes that every handler accepted
    pub static ref EVENTS_DELIVERED: CounterVec = CounterVec::new(
        Opts::new("lms_eventbus_events_delivered_total", "Envelopes fully handled"),
        &["backend", "event_type"]
    ).expect("metric creation failed");

    /// Handler invocations that returned an error
    pub static ref HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("lms_eventbus_handler_failures_total", "Handler invocations that failed"),
        &["backend", "event_type"]
    ).expect("metric creation failed");

    /// Broker messages rejected without requeue
    pub static ref MESSAGES_REJECTED: CounterVec = CounterVec::new(
        Opts::new("lms_eventbus_messages_rejected_total", "Messages rejected without requeue"),
        &["reason"]
    ).expect("metric creation failed");

    /// Time spent running all handlers for one envelope
    pub static ref DISPATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "lms_eventbus_dispatch_duration_seconds",
            "Time spent dispatching one envelope to its handlers"
        ).buckets(exponential_buckets(0.0001, 2.0, 14).expect("valid bucket layout"))
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all bus metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_DELIVERED.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(MESSAGES_REJECTED.clone()),
        Box::new(DISPATCH_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
