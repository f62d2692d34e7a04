//! Prometheus metrics for the wallet ledger server.
//!
//! Metrics are exposed in Prometheus text format on a dedicated listener.
//!
//! # Metrics
//!
//! - `ledger_operations_total{operation,outcome}`: completed ledger calls
//! - `ledger_operation_duration_ms{operation}`: ledger call latency
//! - `http_requests_total{method,status}`: completed HTTP requests
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use wallet_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::ledger_operations_total("deposit", "success");
//! metrics::ledger_operation_duration_ms("deposit", 3.2);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

/// Record a completed ledger operation.
pub fn ledger_operations_total(operation: &'static str, outcome: &'static str) {
    metrics::counter!("ledger_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record ledger operation duration in milliseconds.
pub fn ledger_operation_duration_ms(operation: &'static str, duration_ms: f64) {
    metrics::histogram!("ledger_operation_duration_ms", "operation" => operation)
        .record(duration_ms);
}

/// Record HTTP request.
pub fn http_requests_total(method: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
