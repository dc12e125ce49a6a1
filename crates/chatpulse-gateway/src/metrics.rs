//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {e}"))
}

/// Record the client entering `state`.
pub fn record_transition(state: &str) {
    let labels = [("state", state.to_string())];
    metrics::counter!("client_state_transitions_total", &labels).increment(1);
}

/// Record a gateway operation with its outcome and duration.
pub fn record_operation(operation: &str, outcome: &str, duration_secs: f64) {
    let labels = [
        ("operation", operation.to_string()),
        ("outcome", outcome.to_string()),
    ];
    metrics::counter!("gateway_operations_total", &labels).increment(1);
    metrics::histogram!("gateway_operation_duration_seconds", &labels).record(duration_secs);
}

pub fn record_gateway_created() {
    metrics::counter!("gateway_instances_created_total").increment(1);
}

pub fn record_reset() {
    metrics::counter!("gateway_resets_total").increment(1);
}
