//! HTTP API for the wallet ledger.
//!
//! # Modules
//!
//! - [`wallet`]: wallet lookup, history, deposit, withdraw and transfer
//! - [`request_id`]: request correlation ids
//!
//! # Endpoints Overview
//!
//! - `GET  /health` - Store and cache health
//! - `GET  /api/v1/wallet` - Caller's wallet
//! - `GET  /api/v1/wallet/transactions?page=&pageSize=` - Caller's history
//! - `POST /api/v1/wallet/deposit` - Deposit
//! - `POST /api/v1/wallet/withdraw` - Withdraw
//! - `POST /api/v1/wallet/transfer` - Transfer to another user
//!
//! The caller is identified by the `X-USER-ID` header; mutations also require
//! `X-IDEMPOTENCY-KEY`. Retrying a mutation with the same key returns the
//! original transaction id.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wallet_ledger::cache::MemoryIdempotencyCache;
//! use wallet_ledger::store::MemoryLedgerStore;
//! use wallet_ledger::{EngineConfig, LedgerEngine};
//! use wallet_server::api::{AppState, create_router};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = LedgerEngine::new(
//!     MemoryLedgerStore::new(),
//!     MemoryIdempotencyCache::new(),
//!     EngineConfig::default(),
//! );
//! let app = create_router(AppState {
//!     ledger: Arc::new(engine),
//! });
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod request_id;
pub mod wallet;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use wallet_ledger::WalletLedger;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; the ledger sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn WalletLedger>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// ```text
/// GET  /health                          - Health check
/// GET  /api/v1/wallet                   - Get wallet
/// GET  /api/v1/wallet/transactions      - Transaction history
/// POST /api/v1/wallet/deposit           - Deposit
/// POST /api/v1/wallet/withdraw          - Withdraw
/// POST /api/v1/wallet/transfer          - Transfer
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_v1_router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id::request_id_middleware))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Create API v1 router with all versioned endpoints.
fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/transactions", get(wallet::get_transactions))
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/withdraw", post(wallet::withdraw))
        .route("/wallet/transfer", post(wallet::transfer))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` if the store and the idempotency cache both answer, or
/// `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","version":"0.1.0","timestamp":"2026-01-01T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.ledger.health_check().await;

    let status_code = if result.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    if let Err(e) = &result {
        tracing::warn!(error = %e, "Health check failed");
    }

    let response = json!({
        "status": if result.is_ok() { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
