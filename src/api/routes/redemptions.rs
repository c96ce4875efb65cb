//! Redemption endpoints
//!
//! - POST /api/redemptions - burn tokens and open a redemption
//! - GET  /api/redemptions/:id - redemption lookup
//! - POST /api/redemptions/:id/fulfill - record an SPV-proven payment
//! - POST /api/redemptions/:id/default - flag an overdue redemption
//! - GET  /api/reserves/:qc/earliest-deadline - earliest pending deadline

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{parse_account, parse_redemption_id, token_amount};
use crate::api::middleware::{ApiError, Caller};
use crate::api::server::SharedApiState;
use crate::common::logging::log_redemption_event;
use crate::redemption::{Fulfillment, Redemption};
use crate::spv::{BitcoinTxInfo, SpvProof};
use crate::types::AccountId;

#[derive(Debug, Deserialize)]
pub struct RedemptionRequest {
    pub qc: AccountId,
    /// Token base units to burn
    #[serde(with = "token_amount")]
    pub amount: u128,
    pub btc_address: String,
}

/// POST /api/redemptions
pub async fn handle_request_redemption(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Json(req): Json<RedemptionRequest>,
) -> Result<(StatusCode, Json<Redemption>), ApiError> {
    let result = state
        .service
        .execute(caller, |p, ctx| {
            p.request_redemption(ctx, req.qc, req.amount, &req.btc_address)
        })
        .await;
    match &result {
        Ok(r) => log_redemption_event(
            "redemption_requested",
            Some(&r.id),
            Some(r.amount_sats),
            None,
            None,
        ),
        Err(e) => log_redemption_event(
            "redemption_requested",
            None,
            None,
            None,
            Some((e.code(), &e.to_string())),
        ),
    }
    Ok((StatusCode::CREATED, Json(result?)))
}

/// GET /api/redemptions/:id
pub async fn handle_get_redemption(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<Redemption>, ApiError> {
    let id = parse_redemption_id(&id)?;
    let redemption = state
        .service
        .read(|p, _| p.get_redemption(&id).cloned())
        .await?;
    Ok(Json(redemption))
}

#[derive(Debug, Deserialize)]
pub struct FulfillmentRequest {
    pub btc_address: String,
    /// Satoshis the custodian claims to have paid
    pub expected_amount: u64,
    pub tx_info: BitcoinTxInfo,
    pub proof: SpvProof,
}

/// POST /api/redemptions/:id/fulfill
pub async fn handle_record_fulfillment(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(req): Json<FulfillmentRequest>,
) -> Result<Json<Fulfillment>, ApiError> {
    let id = parse_redemption_id(&id)?;
    let result = state
        .service
        .execute(caller, |p, ctx| {
            p.record_fulfillment(
                ctx,
                id,
                &req.btc_address,
                req.expected_amount,
                &req.tx_info,
                &req.proof,
            )
        })
        .await;
    match &result {
        Ok(f) => log_redemption_event(
            "redemption_fulfilled",
            Some(&id),
            Some(f.paid_sats),
            Some(&f.txid),
            None,
        ),
        Err(e) => log_redemption_event(
            "redemption_fulfilled",
            Some(&id),
            Some(req.expected_amount),
            None,
            Some((e.code(), &e.to_string())),
        ),
    }
    Ok(Json(result?))
}

#[derive(Debug, Deserialize)]
pub struct DefaultRequest {
    pub reason: String,
}

/// POST /api/redemptions/:id/default
pub async fn handle_flag_default(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(req): Json<DefaultRequest>,
) -> Result<Json<Redemption>, ApiError> {
    let id = parse_redemption_id(&id)?;
    let result = state
        .service
        .execute(caller, |p, ctx| p.flag_default(ctx, id, &req.reason))
        .await;
    match &result {
        Ok(r) => log_redemption_event(
            "redemption_defaulted",
            Some(&id),
            Some(r.amount_sats),
            None,
            None,
        ),
        Err(e) => log_redemption_event(
            "redemption_defaulted",
            Some(&id),
            None,
            None,
            Some((e.code(), &e.to_string())),
        ),
    }
    Ok(Json(result?))
}

#[derive(Debug, Serialize)]
pub struct DeadlineResponse {
    pub qc: AccountId,
    pub earliest_deadline: Option<u64>,
}

/// GET /api/reserves/:qc/earliest-deadline
pub async fn handle_earliest_deadline(
    State(state): State<SharedApiState>,
    Path(qc): Path<String>,
) -> Result<Json<DeadlineResponse>, ApiError> {
    let qc = parse_account(&qc)?;
    let earliest_deadline = state
        .service
        .read(|p, _| p.get_earliest_redemption_deadline(&qc))
        .await;
    Ok(Json(DeadlineResponse {
        qc,
        earliest_deadline,
    }))
}
