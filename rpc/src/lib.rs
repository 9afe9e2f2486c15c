//! HTTP query and submit surface.
//!
//! Endpoints: `/status`, `/block/height?h=`, `/block/hash?id=`,
//! `/balance?addr=`, `/mempool`, and `POST /tx`. Responses are JSON;
//! rejected submissions come back as 400 with the rejection reason.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use blockchain::Chain;
use mempool::Mempool;
use p2p::Server as P2pServer;
use types::block::Block;
use types::events::LocalEvent;
use types::tx::{Transaction, TxKind};
use types::{Amount, Hash};

#[derive(Clone)]
pub struct ApiState {
    pub chain: Arc<Chain>,
    pub mempool: Arc<Mempool>,
    pub network: Arc<P2pServer>,
    pub events: UnboundedSender<LocalEvent>,
}

pub async fn start_rpc_server(state: ApiState, addr: SocketAddr) -> Result<()> {
    let app = Router::new()
        .route("/status", get(handle_status))
        .route("/block/height", get(handle_block_by_height))
        .route("/block/hash", get(handle_block_by_hash))
        .route("/balance", get(handle_balance))
        .route("/mempool", get(handle_mempool))
        .route("/tx", post(handle_submit_tx))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "rpc server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

type ApiError = (StatusCode, String);

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, msg.into())
}

fn not_found(msg: impl Into<String>) -> ApiError {
    (StatusCode::NOT_FOUND, msg.into())
}

#[derive(Serialize)]
struct StatusResponse {
    height: u64,
    tip_hash: Hash,
    total_supply: Amount,
    mempool_size: usize,
    peer_count: usize,
}

async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let tip_hash = state
        .chain
        .tip()
        .map(|tip| tip.hash)
        .unwrap_or(Hash::ZERO);

    Json(StatusResponse {
        height: state.chain.height(),
        tip_hash,
        total_supply: state.chain.total_supply(),
        mempool_size: state.mempool.size(),
        peer_count: state.network.peer_count().await,
    })
}

#[derive(Deserialize)]
struct HeightQuery {
    h: u64,
}

async fn handle_block_by_height(
    State(state): State<ApiState>,
    Query(query): Query<HeightQuery>,
) -> Result<Json<Block>, ApiError> {
    state
        .chain
        .get_block_by_height(query.h)
        .map(Json)
        .map_err(|_| not_found("block not found"))
}

#[derive(Deserialize)]
struct HashQuery {
    id: String,
}

async fn handle_block_by_hash(
    State(state): State<ApiState>,
    Query(query): Query<HashQuery>,
) -> Result<Json<Block>, ApiError> {
    let hash = Hash::from_hex(&query.id).map_err(|_| bad_request("invalid hash format"))?;
    state
        .chain
        .get_block_by_hash(&hash)
        .map(Json)
        .map_err(|_| not_found("block not found"))
}

#[derive(Deserialize)]
struct BalanceQuery {
    addr: String,
}

#[derive(Serialize)]
struct BalanceResponse {
    address: String,
    balance: Amount,
    nonce: u64,
}

async fn handle_balance(
    State(state): State<ApiState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let addr = Hash::from_hex(&query.addr).map_err(|_| bad_request("invalid address format"))?;
    let (balance, nonce) = state
        .chain
        .get_account_state(&addr)
        .map_err(|err| (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()))?;

    Ok(Json(BalanceResponse {
        address: query.addr,
        balance,
        nonce,
    }))
}

async fn handle_mempool(State(state): State<ApiState>) -> Json<Vec<Transaction>> {
    Json(state.mempool.pending(1000))
}

#[derive(Deserialize)]
pub struct TxRequest {
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    pub signature: String,
    /// Unix seconds.
    pub timestamp: u64,
}

#[derive(Serialize)]
struct TxResponse {
    status: &'static str,
    txid: Hash,
}

async fn handle_submit_tx(
    State(state): State<ApiState>,
    Json(req): Json<TxRequest>,
) -> Result<Json<TxResponse>, ApiError> {
    let from = Hash::from_hex(&req.from).map_err(|_| bad_request("invalid from address"))?;
    let to = Hash::from_hex(&req.to).map_err(|_| bad_request("invalid to address"))?;
    let signature = hex::decode(&req.signature).map_err(|_| bad_request("invalid signature hex"))?;

    let mut tx = Transaction {
        id: Hash::ZERO,
        kind: TxKind::Transfer,
        timestamp: req.timestamp,
        from,
        to,
        amount: req.amount,
        fee: req.fee,
        nonce: req.nonce,
        signature,
    };
    tx.id = tx.compute_id();

    state
        .mempool
        .add_transaction(&tx)
        .map_err(|err| bad_request(format!("rejected: {err}")))?;

    // Hand the admitted transaction to the node loop for gossip.
    let _ = state.events.send(LocalEvent::SubmittedTransaction(tx.clone()));

    Ok(Json(TxResponse {
        status: "ok",
        txid: tx.id,
    }))
}
