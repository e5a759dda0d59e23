use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder once per process.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => tracing::warn!(error = %e, "Prometheus recorder not installed"),
    }
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// `outcome` is `issued` or the violation code.
pub fn record_issuance(outcome: &str) {
    counter!("vault_lease_issuance_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_revocation(outcome: &str) {
    counter!("vault_lease_revocations_total", "outcome" => outcome.to_string()).increment(1);
}

/// `outcome` is `allowed` or the denial reason.
pub fn record_consume(outcome: &str) {
    counter!("vault_consume_total", "outcome" => outcome.to_string()).increment(1);
}
