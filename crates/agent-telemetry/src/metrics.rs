//! Prometheus metrics for the agent protocol bridge.
//!
//! All metrics follow the naming convention: `agent_<component>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., bus_events_published_total)
//! - **Gauge**: Value that can go up or down (e.g., bridge_pending_requests)
//! - **Histogram**: Distribution of values (e.g., bridge_request_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts,
    HistogramVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT BUS METRICS
    // =========================================================================

    /// Events published on the bus, by topic
    pub static ref BUS_EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("agent_bus_events_published_total", "Events published on the bus"),
        &["topic"]
    ).expect("metric creation failed");

    /// One-shot subscriptions resolved by a published event
    pub static ref BUS_WAITERS_RESOLVED: Counter = Counter::new(
        "agent_bus_waiters_resolved_total",
        "Subscriptions resolved by a matching event"
    ).expect("metric creation failed");

    /// Webhooks rejected at the bus boundary
    pub static ref BUS_WEBHOOKS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("agent_bus_webhooks_rejected_total", "Webhook payloads that failed validation"),
        &["topic"]
    ).expect("metric creation failed");

    // =========================================================================
    // REQUEST BRIDGE METRICS
    // =========================================================================

    /// Bridged requests by kind and outcome
    pub static ref BRIDGE_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("agent_bridge_requests_total", "Correlated requests by outcome"),
        &["kind", "outcome"]  // outcome: ok/send_error/status_error/decode_error/timeout/closed
    ).expect("metric creation failed");

    /// Round-trip latency of bridged requests
    pub static ref BRIDGE_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "agent_bridge_request_duration_seconds",
            "Time from dispatch to correlated reply"
        ).buckets(exponential_buckets(0.001, 2.0, 16).expect("valid buckets")),
        &["kind"]
    ).expect("metric creation failed");

    /// Requests currently waiting for a reply
    pub static ref BRIDGE_PENDING_REQUESTS: Gauge = Gauge::new(
        "agent_bridge_pending_requests",
        "Requests dispatched and awaiting a reply"
    ).expect("metric creation failed");

    // =========================================================================
    // SERVICE REGISTRY METRICS
    // =========================================================================

    /// Registrations started, by publish strategy
    pub static ref REGISTRATIONS: CounterVec = CounterVec::new(
        Opts::new("agent_registry_registrations_total", "Service registrations started"),
        &["strategy"]
    ).expect("metric creation failed");

    /// Verification sub-flows by credential schema and outcome
    pub static ref SUBFLOWS: CounterVec = CounterVec::new(
        Opts::new("agent_registry_subflows_total", "Verification sub-flows by outcome"),
        &["schema", "outcome"]  // outcome: done/failed
    ).expect("metric creation failed");

    /// Verification sub-flow duration
    pub static ref SUBFLOW_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "agent_registry_subflow_duration_seconds",
            "Time from proof request to merged record"
        ).buckets(exponential_buckets(0.01, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // PROTOCOL METRICS
    // =========================================================================

    /// Inbound peer messages by type and outcome
    pub static ref PROTOCOL_MESSAGES: CounterVec = CounterVec::new(
        Opts::new("agent_protocol_messages_total", "Inbound peer messages handled"),
        &["type", "outcome"]  // outcome: ok/error
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Event bus
        Box::new(BUS_EVENTS_PUBLISHED.clone()),
        Box::new(BUS_WAITERS_RESOLVED.clone()),
        Box::new(BUS_WEBHOOKS_REJECTED.clone()),
        // Request bridge
        Box::new(BRIDGE_REQUESTS.clone()),
        Box::new(BRIDGE_REQUEST_DURATION.clone()),
        Box::new(BRIDGE_PENDING_REQUESTS.clone()),
        // Service registry
        Box::new(REGISTRATIONS.clone()),
        Box::new(SUBFLOWS.clone()),
        Box::new(SUBFLOW_DURATION.clone()),
        // Protocol
        Box::new(PROTOCOL_MESSAGES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
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

    /// Seconds since the timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.elapsed_secs());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
