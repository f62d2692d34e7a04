//! Wallet API handlers.
//!
//! Thin glue over [`WalletLedger`]: extract the caller from headers, call the
//! engine, and map its result onto HTTP. Amounts are integer minor units.
//!
//! # Examples
//!
//! Deposit:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/wallet/deposit \
//!   -H "X-USER-ID: alice" \
//!   -H "X-IDEMPOTENCY-KEY: 5b8e0c3a-7d4e-4f0e-9c55-0c1f9e1f3b21" \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": 2500}'
//! ```
//!
//! History:
//! ```bash
//! curl "http://localhost:8080/api/v1/wallet/transactions?page=2&pageSize=20" \
//!   -H "X-USER-ID: alice"
//! ```

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use wallet_ledger::{LedgerError, LedgerResult, TransactionRecord, Wallet};

use super::AppState;
use super::request_id::RequestId;
use crate::{logging, metrics};

/// Header carrying the calling owner's identifier
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's idempotency token
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct AmountPayload {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct TransferPayload {
    pub recipient_user_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub id: Uuid,
    pub user_id: String,
    pub balance: i64,
    pub created_at: String,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            user_id: wallet.owner,
            balance: wallet.balance,
            created_at: wallet.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionIdResponse {
    pub transaction_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub initiator_wallet_user_id: String,
    pub amount: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_wallet_user_id: Option<String>,
    pub created_at: String,
}

impl From<TransactionRecord> for TransactionResponse {
    fn from(record: TransactionRecord) -> Self {
        Self {
            id: record.id,
            initiator_wallet_user_id: record.initiator_owner,
            amount: record.amount,
            kind: record.kind.to_string(),
            status: record.status.to_string(),
            recipient_wallet_user_id: record.recipient_owner,
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<TransactionResponse>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

/// Handler error, rendered as a JSON [`ErrorResponse`]
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request rejected before reaching the ledger
    BadRequest(String),
    Ledger(LedgerError),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

/// HTTP status for a ledger error
pub fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::WalletNotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::InvalidAmount(_)
        | LedgerError::InvalidOwner
        | LedgerError::InvalidIdempotencyKey
        | LedgerError::SelfTransfer
        | LedgerError::InvalidPagination { .. } => StatusCode::BAD_REQUEST,
        LedgerError::IdempotencyLookupFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Store(_) | LedgerError::BalanceOverflow => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Metric label for a ledger error
fn outcome_label(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::WalletNotFound(_) => "wallet_not_found",
        LedgerError::InsufficientBalance { .. } => "insufficient_balance",
        LedgerError::InvalidAmount(_)
        | LedgerError::InvalidOwner
        | LedgerError::InvalidIdempotencyKey
        | LedgerError::SelfTransfer
        | LedgerError::InvalidPagination { .. } => "invalid_request",
        LedgerError::BalanceOverflow => "balance_overflow",
        LedgerError::IdempotencyLookupFailed(_) => "idempotency_lookup_failed",
        LedgerError::Store(_) => "store_failure",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error,
                    retryable: false,
                },
            ),
            ApiError::Ledger(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "Ledger operation failed");
                }
                (
                    status,
                    ErrorResponse {
                        error: err.client_message(),
                        retryable: err.is_retryable(),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn required_header(headers: &HeaderMap, name: &'static str) -> Result<String, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing or invalid {name} header")))
}

/// Record metrics and a log line for a finished ledger call
fn observe<T>(
    request_id: &RequestId,
    operation: &'static str,
    owner: &str,
    started: Instant,
    result: &LedgerResult<T>,
) {
    let outcome = match result {
        Ok(_) => "success",
        Err(err) => outcome_label(err),
    };
    let elapsed = started.elapsed();

    metrics::ledger_operations_total(operation, outcome);
    metrics::ledger_operation_duration_ms(operation, elapsed.as_secs_f64() * 1000.0);
    logging::log_ledger_operation(
        request_id.as_str(),
        operation,
        owner,
        outcome,
        elapsed.as_millis() as u64,
    );
}

/// Get the caller's wallet.
///
/// # Errors
///
/// - `400 Bad Request`: Missing `X-USER-ID`
/// - `404 Not Found`: Caller has no wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
) -> Result<Json<WalletResponse>, ApiError> {
    let owner = required_header(&headers, USER_ID_HEADER)?;

    let started = Instant::now();
    let result = state.ledger.get_wallet(&owner).await;
    observe(&request_id, "get_wallet", &owner, started, &result);

    Ok(Json(result?.into()))
}

/// Get one page of the caller's transaction history, newest first.
///
/// `page` starts at 1 (default 1); `pageSize` is 1..=100 (default 10).
pub async fn get_transactions(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let owner = required_header(&headers, USER_ID_HEADER)?;
    let Query(query) =
        query.map_err(|_| ApiError::BadRequest("Invalid pagination parameters".to_string()))?;

    let page = query.page.unwrap_or(DEFAULT_PAGE);
    if page < 1 {
        return Err(ApiError::BadRequest("Invalid page parameter".to_string()));
    }
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(ApiError::BadRequest("Invalid pageSize parameter".to_string()));
    }
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| ApiError::BadRequest("Invalid page parameter".to_string()))?;

    let started = Instant::now();
    let result = state.ledger.get_history(&owner, offset, page_size).await;
    observe(&request_id, "get_history", &owner, started, &result);
    let history = result?;

    let total_pages = history.total_pages();
    Ok(Json(HistoryResponse {
        transactions: history.transactions.into_iter().map(Into::into).collect(),
        page,
        page_size,
        total: history.total,
        total_pages,
    }))
}

/// Deposit into the caller's wallet.
///
/// # Request Body
///
/// ```json
/// { "amount": 2500 }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing headers, malformed body or non-positive amount
/// - `404 Not Found`: Caller has no wallet
/// - `503 Service Unavailable`: Idempotency cache unreachable, retry with the same key
pub async fn deposit(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
    payload: Result<Json<AmountPayload>, JsonRejection>,
) -> Result<Json<TransactionIdResponse>, ApiError> {
    let owner = required_header(&headers, USER_ID_HEADER)?;
    let key = required_header(&headers, IDEMPOTENCY_KEY_HEADER)?;
    let Json(payload) = payload.map_err(|_| ApiError::BadRequest("Invalid request".to_string()))?;

    let started = Instant::now();
    let result = state.ledger.deposit(&owner, &key, payload.amount).await;
    observe(&request_id, "deposit", &owner, started, &result);

    Ok(Json(TransactionIdResponse {
        transaction_id: result?,
    }))
}

/// Withdraw from the caller's wallet.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Balance below the requested amount
/// - Otherwise as [`deposit`]
pub async fn withdraw(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
    payload: Result<Json<AmountPayload>, JsonRejection>,
) -> Result<Json<TransactionIdResponse>, ApiError> {
    let owner = required_header(&headers, USER_ID_HEADER)?;
    let key = required_header(&headers, IDEMPOTENCY_KEY_HEADER)?;
    let Json(payload) = payload.map_err(|_| ApiError::BadRequest("Invalid request".to_string()))?;

    let started = Instant::now();
    let result = state.ledger.withdraw(&owner, &key, payload.amount).await;
    observe(&request_id, "withdraw", &owner, started, &result);

    Ok(Json(TransactionIdResponse {
        transaction_id: result?,
    }))
}

/// Transfer from the caller's wallet to another user's wallet.
///
/// # Request Body
///
/// ```json
/// { "recipient_user_id": "bob", "amount": 1000 }
/// ```
pub async fn transfer(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
    payload: Result<Json<TransferPayload>, JsonRejection>,
) -> Result<Json<TransactionIdResponse>, ApiError> {
    let owner = required_header(&headers, USER_ID_HEADER)?;
    let key = required_header(&headers, IDEMPOTENCY_KEY_HEADER)?;
    let Json(payload) = payload.map_err(|_| ApiError::BadRequest("Invalid request".to_string()))?;

    let started = Instant::now();
    let result = state
        .ledger
        .transfer(&owner, payload.recipient_user_id.trim(), &key, payload.amount)
        .await;
    observe(&request_id, "transfer", &owner, started, &result);

    Ok(Json(TransactionIdResponse {
        transaction_id: result?,
    }))
}
