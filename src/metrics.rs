//! Prometheus metrics exposition server.
//!
//! Optional: the engine emits counters and gauges unconditionally, which
//! are no-ops unless this server (or another recorder) is installed.

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Register all metric descriptions for Prometheus.
///
/// This should be called once at startup after the recorder is installed.
/// Descriptions provide HELP text in the Prometheus output.
pub fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        "mailblast_sent_total",
        "Total number of records delivered successfully"
    );
    describe_counter!(
        "mailblast_failed_total",
        "Total number of records that exhausted their attempt budget or hit an unclassified failure"
    );
    describe_counter!(
        "mailblast_invalid_total",
        "Total number of records skipped because the recipient address failed validation"
    );
    describe_counter!(
        "mailblast_auth_errors_total",
        "Total number of records stopped by an authentication rejection"
    );
    describe_counter!(
        "mailblast_attempts_total",
        "Total number of transport submission attempts, including retries"
    );

    describe_gauge!(
        "mailblast_queue_size",
        "Current number of records waiting in the work queue"
    );
    describe_gauge!(
        "mailblast_build_info",
        "Build information with version label (always 1)"
    );
}

/// Initialize all known metrics to their default values.
///
/// Called right after the recorder is installed so every series is
/// visible in `/metrics` from startup, even before any record completes.
pub fn initialize_metrics() {
    use metrics::{counter, gauge};

    gauge!("mailblast_build_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    gauge!("mailblast_queue_size").set(0.0);

    counter!("mailblast_sent_total").absolute(0);
    counter!("mailblast_failed_total").absolute(0);
    counter!("mailblast_invalid_total").absolute(0);
    counter!("mailblast_auth_errors_total").absolute(0);
    counter!("mailblast_attempts_total").absolute(0);
}

/// Metrics server for Prometheus exposition.
///
/// Starts an HTTP server that serves metrics on `/metrics`.
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    /// Create a new metrics server bound to the given port.
    ///
    /// Use port 0 to let the OS assign an available port (useful for testing).
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Returns the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the metrics server until cancelled.
    ///
    /// Installs the global metrics recorder and starts the HTTP listener.
    /// The recorder can only be installed once per process.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter fails to install.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();

        let builder = PrometheusBuilder::new();
        builder
            .with_http_listener(addr)
            .install()
            .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

        register_metric_descriptions();
        initialize_metrics();

        info!(port = self.port, "Metrics server started on /metrics");

        cancel.cancelled().await;

        info!("Metrics server shutting down");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_creates_server_with_port() {
        let server = MetricsServer::new(9090);
        assert_eq!(server.port(), 9090);
    }

    #[test]
    fn new_with_port_zero_allowed() {
        let server = MetricsServer::new(0);
        assert_eq!(server.port(), 0);
    }
}
