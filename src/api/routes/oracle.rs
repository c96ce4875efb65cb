//! Backing and attestation control endpoints
//!
//! - POST /api/backing - oracle batch backing update
//! - POST /api/reserves/:qc/backing - oracle backing update
//! - POST /api/reserves/:qc/consensus - finalize a pending round
//! - POST /api/reserves/:qc/override - arbiter replaces the consensus
//! - POST /api/reserves/:qc/emergency-reserve - arbiter writes a record
//! - POST /api/reserves/:qc/reset-consensus - arbiter discards a round

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{parse_account, token_amount};
use crate::api::middleware::{ApiError, Caller};
use crate::api::server::SharedApiState;
use crate::types::AccountId;

#[derive(Debug, Deserialize)]
pub struct BackingRequest {
    /// Satoshis
    pub backing: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackingUpdate {
    pub qc: AccountId,
    pub backing: u64,
}

#[derive(Debug, Deserialize)]
pub struct BatchBackingRequest {
    pub updates: Vec<BackingUpdate>,
}

/// POST /api/reserves/:qc/backing
pub async fn handle_set_backing(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<BackingRequest>,
) -> Result<Json<BackingUpdate>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.set_backing(ctx, qc, req.backing))
        .await?;
    Ok(Json(BackingUpdate {
        qc,
        backing: req.backing,
    }))
}

/// POST /api/backing
pub async fn handle_batch_set_backing(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Json(req): Json<BatchBackingRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updates: Vec<(AccountId, u64)> = req.updates.iter().map(|u| (u.qc, u.backing)).collect();
    state
        .service
        .execute(caller, |p, ctx| p.batch_set_backing(ctx, &updates))
        .await?;
    Ok(Json(serde_json::json!({ "updated": updates.len() })))
}

#[derive(Debug, Serialize)]
pub struct ConsensusResponse {
    pub qc: AccountId,
    pub balance: u64,
}

/// POST /api/reserves/:qc/consensus
pub async fn handle_record_consensus(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
) -> Result<Json<ConsensusResponse>, ApiError> {
    let qc = parse_account(&qc)?;
    let balance = state
        .service
        .execute(caller, |p, ctx| p.record_consensus_attestation(ctx, qc))
        .await?;
    Ok(Json(ConsensusResponse { qc, balance }))
}

#[derive(Debug, Deserialize)]
pub struct BalanceRequest {
    /// Satoshis held, as a decimal string
    #[serde(with = "token_amount")]
    pub balance: u128,
}

/// POST /api/reserves/:qc/override
pub async fn handle_override_attestation(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<BalanceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.override_attestation(ctx, qc, req.balance))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "balance": req.balance.to_string() })))
}

/// POST /api/reserves/:qc/emergency-reserve
pub async fn handle_emergency_set_reserve(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<BalanceRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.emergency_set_reserve(ctx, qc, req.balance))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "balance": req.balance.to_string() })))
}

/// POST /api/reserves/:qc/reset-consensus
pub async fn handle_reset_consensus(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    let discarded = state
        .service
        .execute(caller, |p, ctx| p.reset_consensus(ctx, qc))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "discarded": discarded })))
}
