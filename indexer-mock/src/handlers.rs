//! Axum HTTP handlers for the indexer API endpoints

use axum::{
    extract::{Path, Request, State},
    http::{header::USER_AGENT, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::state::{LedgerError, MockLedger, ScriptLookup};
use crate::types::*;

/// Shared application state
pub type AppState = MockLedger;

/// Custom error type for handlers
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected(reason) => ApiError::BadRequest(reason),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

fn parse_network(segment: &str) -> Result<bitcoin::Network, ApiError> {
    match segment {
        "main" => Ok(bitcoin::Network::Bitcoin),
        "test" => Ok(bitcoin::Network::Testnet),
        other => Err(ApiError::NotFound(format!("Unknown network: {}", other))),
    }
}

/// Records the User-Agent of every request before routing it
pub async fn record_user_agent(
    State(ledger): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    ledger.record_user_agent(&user_agent);
    next.run(request).await
}

/// GET /{network}/address/{address}/balance
pub async fn get_address_balance(
    State(ledger): State<AppState>,
    Path((network, address)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    parse_network(&network)?;
    Ok(Json(ledger.balance(&address)))
}

/// GET /{network}/address/{address}/unspent
/// Unknown addresses answer an empty list
pub async fn get_address_unspent(
    State(ledger): State<AppState>,
    Path((network, address)): Path<(String, String)>,
) -> Result<Json<Vec<UnspentEntry>>, ApiError> {
    parse_network(&network)?;
    let unspent = ledger
        .unspent(&address)
        .ok_or_else(|| ApiError::Unavailable("Unspent lookup unavailable".to_string()))?;
    Ok(Json(unspent))
}

/// GET /{network}/tx/{txid}/out/{vout}/hex
/// Returns the output's locking script as plain-text hex
pub async fn get_output_script(
    State(ledger): State<AppState>,
    Path((network, txid, vout)): Path<(String, String, u32)>,
) -> Result<String, ApiError> {
    parse_network(&network)?;
    match ledger.script(&txid, vout) {
        ScriptLookup::Found(script) => Ok(script),
        ScriptLookup::Unknown => Err(ApiError::NotFound(format!(
            "Output not found: {}:{}",
            txid, vout
        ))),
        ScriptLookup::Failed => Err(ApiError::Internal("Script lookup failed".to_string())),
    }
}

/// POST /{network}/tx/raw
/// Accepts `{"txhex": ...}` and answers the txid as a JSON string
pub async fn broadcast_transaction(
    State(ledger): State<AppState>,
    Path(network): Path<String>,
    Json(req): Json<BroadcastRequest>,
) -> Result<Json<String>, ApiError> {
    let network = parse_network(&network)?;
    let txid = ledger.broadcast(&req.txhex, network).map_err(|e| {
        log::warn!("Rejected broadcast: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(txid))
}

/// POST /{network}/mine
/// Confirm pending outputs (helper endpoint for testing)
pub async fn mine(
    State(ledger): State<AppState>,
    Path(network): Path<String>,
) -> Result<StatusCode, ApiError> {
    parse_network(&network)?;
    ledger.mine();
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}
