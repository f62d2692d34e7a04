//! Structured logging configuration.
//!
//! The server logs through `tracing`; the ledger library logs through the
//! `log` facade, and those records are forwarded into the same subscriber.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use wallet_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // `init` also installs the `log` bridge, so `log::info!` from the
    // ledger crate lands here
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a completed ledger operation with its outcome and latency
///
/// Operations slower than a second are logged at warn.
pub fn log_ledger_operation(
    request_id: &str,
    operation: &str,
    owner: &str,
    outcome: &str,
    duration_ms: u64,
) {
    if duration_ms > 1000 {
        tracing::warn!(
            request_id = request_id,
            operation = operation,
            owner = owner,
            outcome = outcome,
            duration_ms = duration_ms,
            "PERFORMANCE: Slow ledger operation"
        );
    } else {
        tracing::debug!(
            request_id = request_id,
            operation = operation,
            owner = owner,
            outcome = outcome,
            duration_ms = duration_ms,
            "Ledger operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_log_ledger_operation() {
        // Just ensure it doesn't panic without a subscriber
        log_ledger_operation("req-1", "deposit", "alice", "success", 12);
        log_ledger_operation("req-2", "transfer", "bob", "store_failure", 2500);
    }
}
