//! Metrics collection and export for switchboard.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const TOKENS_ISSUED_TOTAL: &str = "switchboard_tokens_issued_total";
    pub const MESSAGES_ROUTED_TOTAL: &str = "switchboard_messages_routed_total";
    pub const PUBLISH_TOTAL: &str = "switchboard_publish_total";
    pub const PUBLISH_LATENCY_SECONDS: &str = "switchboard_publish_latency_seconds";
    pub const ERRORS_TOTAL: &str = "switchboard_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::TOKENS_ISSUED_TOTAL,
        "Total number of connection tokens issued"
    );
    metrics::describe_counter!(
        names::MESSAGES_ROUTED_TOTAL,
        "Total number of messages routed, by source topic kind"
    );
    metrics::describe_counter!(
        names::PUBLISH_TOTAL,
        "Total number of broker publishes, by result"
    );
    metrics::describe_histogram!(
        names::PUBLISH_LATENCY_SECONDS,
        "Broker publish latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of request errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an issued token.
pub fn record_token_issued() {
    counter!(names::TOKENS_ISSUED_TOTAL).increment(1);
}

/// Record a routed message. `kind` is `aggregate` or `topic`.
pub fn record_message_routed(kind: &'static str) {
    counter!(names::MESSAGES_ROUTED_TOTAL, "kind" => kind).increment(1);
}

/// Record one broker publish and its latency.
pub fn record_publish(success: bool, seconds: f64) {
    let result = if success { "ok" } else { "error" };
    counter!(names::PUBLISH_TOTAL, "result" => result).increment(1);
    histogram!(names::PUBLISH_LATENCY_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}
