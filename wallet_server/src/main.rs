//! Wallet ledger HTTP server.
//!
//! Connects to PostgreSQL (ledger store) and Redis (idempotency cache),
//! builds the ledger engine and serves the wallet API until Ctrl+C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use pico_args::Arguments;
use tracing::info;
use wallet_ledger::cache::RedisIdempotencyCache;
use wallet_ledger::db::Database;
use wallet_ledger::store::PgLedgerStore;
use wallet_ledger::LedgerEngine;
use wallet_server::api::{self, AppState};
use wallet_server::config::ServerConfig;
use wallet_server::{logging, metrics};

const HELP: &str = "\
Run the wallet ledger server

USAGE:
  wallet_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --redis-url  URL         Redis connection string     [default: env REDIS_URL or redis://127.0.0.1:6379]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND                       Server bind address (e.g., 0.0.0.0:8080)
  METRICS_BIND                      Prometheus exporter address (disabled when unset)
  DATABASE_URL                      PostgreSQL connection string
  REDIS_URL                         Redis connection string
  IDEMPOTENCY_TTL_SECS              Idempotency cache retention [default: 86400, max: 2592000]
  LEDGER_TRANSACTION_TIMEOUT_SECS   Unit of work deadline       [default: 10]
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        redis_url: pargs.opt_value_from_str("--redis-url")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url, args.redis_url)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics exported at http://{}/metrics", addr);
    }

    info!("Connecting to database");
    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    db.ensure_schema()
        .await
        .context("Failed to apply ledger schema")?;
    info!("Database connected successfully");

    info!("Connecting to idempotency cache");
    let cache = RedisIdempotencyCache::connect(&config.cache)
        .await
        .context("Failed to connect to Redis")?;

    let store = PgLedgerStore::new(db.pool().clone());
    let engine = LedgerEngine::new(store, cache, config.engine.clone());

    let app = api::create_router(AppState {
        ledger: Arc::new(engine),
    });

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    db.close().await;

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
