//! HTTP front-end for the wallet ledger.
//!
//! The binary in `main.rs` wires configuration, logging, metrics and the
//! PostgreSQL/Redis backed engine together; this library exposes the pieces so
//! they can be driven from tests.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
