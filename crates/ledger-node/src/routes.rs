use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ledger_core::{ChainSnapshot, Ledger, LedgerError, Transaction};
use ledger_storage::{sled_store::SledStore, Storage};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::peers::fetch_peer_chains;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Mutex<Ledger>>,
    pub store: Option<SledStore>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(ledger: Ledger, store: Option<SledStore>, http: reqwest::Client) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(ledger)),
            store,
            http,
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Deserialize)]
struct MineRequest {
    miner: String,
}

#[derive(Serialize)]
struct Balance {
    principal: String,
    balance: i128,
}

#[derive(Deserialize)]
struct RegisterRequest {
    nodes: Vec<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(err: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match err {
            LedgerError::InvalidTransaction(_)
            | LedgerError::InsufficientPendingTransactions { .. }
            | LedgerError::InvalidPeer(_)
            | LedgerError::InvalidChain { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("storage failure: {err:#}");
        Self::internal(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/chain", get(get_chain))
        .route("/transactions", post(post_transaction))
        .route("/mine", post(post_mine))
        .route("/balance/{principal}", get(get_balance))
        .route("/nodes/register", post(register_nodes))
        .route("/nodes/resolve", get(resolve_nodes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_chain(State(state): State<AppState>) -> Json<ChainSnapshot> {
    Json(state.ledger.lock().await.snapshot())
}

async fn post_transaction(
    State(state): State<AppState>,
    Json(tx): Json<Transaction>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let hash = tx.content_hash();
    let mut ledger = state.ledger.lock().await;
    ledger.submit_transaction(tx)?;
    Ok((
        StatusCode::CREATED,
        json!({ "accepted": true, "hash": hash, "pending": ledger.pending().len() }).into(),
    ))
}

/// Mines on a copy of the ledger and only commits it once the new blocks are
/// stored, all under the ledger lock, so disk and memory never diverge.
async fn post_mine(
    State(state): State<AppState>,
    Json(req): Json<MineRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let miner = req.miner;
    let (mined, tip) = tokio::task::spawn_blocking(move || {
        let mut ledger = state.ledger.blocking_lock();
        let mut staged = ledger.clone();
        let mined = staged.mine_pending_transactions(&miner)?;
        if let Some(store) = &state.store {
            store.append_blocks(&staged.chain()[ledger.len()..])?;
        }
        *ledger = staged;
        Ok::<_, ApiError>((mined, ledger.last_block().hash.clone()))
    })
    .await
    .map_err(ApiError::internal)??;

    info!(mined, "mining request completed");
    Ok(Json(json!({ "mined": mined, "tip": tip })))
}

async fn get_balance(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> Json<Balance> {
    let balance = state.ledger.lock().await.get_balance(&principal);
    Json(Balance { principal, balance })
}

async fn register_nodes(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let mut ledger = state.ledger.lock().await;
    for node in &req.nodes {
        ledger.register_peer(node)?;
    }
    let peers: Vec<&String> = ledger.peers().iter().collect();
    Ok((StatusCode::CREATED, json!({ "peers": peers }).into()))
}

async fn resolve_nodes(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    // Fetch without holding the lock; peers may be slow.
    let peers: Vec<String> = state.ledger.lock().await.peers().iter().cloned().collect();
    let candidates = fetch_peer_chains(&state.http, &peers).await;

    let (replaced, length) = tokio::task::spawn_blocking(move || {
        let mut ledger = state.ledger.blocking_lock();
        let mut staged = ledger.clone();
        let replaced = staged.resolve_conflicts(candidates);
        if replaced {
            if let Some(store) = &state.store {
                store.replace_chain(staged.chain())?;
            }
            *ledger = staged;
        }
        Ok::<_, ApiError>((replaced, ledger.len()))
    })
    .await
    .map_err(ApiError::internal)??;

    Ok(Json(json!({ "replaced": replaced, "length": length })))
}
