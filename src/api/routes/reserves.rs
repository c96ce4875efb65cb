//! Custodian reserve endpoints
//!
//! - GET  /api/reserves/:qc - reserve, status and pause view
//! - GET  /api/reserves/:qc/attestation - oracle record and pending round
//! - POST /api/reserves/:qc/attestations - attester balance submission
//! - POST /api/reserves/:qc/mint - mint against the reserve
//! - POST /api/reserves/:qc/status - governance status change
//! - POST /api/reserves/:qc/resume - close a pause window
//! - POST /api/reserves/:qc/renew-credit - renew a spent pause credit
//! - POST /api/reserves/:qc/clear-pause - council ends a self-pause
//! - POST /api/reserves/:qc/restore-credit - council restores a credit
//! - POST /api/reserves/:qc/wallets - register a custodian wallet
//! - POST /api/reserves/:qc/wallets/remove - deregister a custodian wallet
//! - POST /api/reserves/:qc/redeem - the custodian burns its own tokens
//! - POST /api/pause - the calling custodian pauses itself

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{parse_account, token_amount};
use crate::account_control::Reserve;
use crate::api::middleware::{ApiError, Caller};
use crate::api::server::SharedApiState;
use crate::common::logging::log_mint_event;
use crate::oracle::ReserveAttestationRecord;
use crate::pause_credit::PauseCredit;
use crate::qc_state::{QcStatus, StatusChangeReason};
use crate::types::AccountId;

#[derive(Debug, Serialize)]
pub struct ReserveView {
    pub qc: AccountId,
    pub status: Option<QcStatus>,
    pub reserve: Option<Reserve>,
    pub wallets: Vec<String>,
    pub reserve_balance: u64,
    pub reserve_stale: bool,
    pub undercollateralized: bool,
    pub can_operate: bool,
    pub can_self_pause: bool,
    pub pause: Option<PauseCredit>,
    pub earliest_redemption_deadline: Option<u64>,
}

/// GET /api/reserves/:qc
pub async fn handle_get_reserve(
    State(state): State<SharedApiState>,
    Path(qc): Path<String>,
) -> Result<Json<ReserveView>, ApiError> {
    let qc = parse_account(&qc)?;

    let view = state
        .service
        .read(|p, now| {
            let record = p.qc_record(&qc);
            let reserve = p.reserve(&qc).cloned();
            if record.is_none() && reserve.is_none() {
                return None;
            }
            let (reserve_balance, reserve_stale) = p.get_reserve_balance_and_staleness(&qc, now);
            Some(ReserveView {
                qc,
                status: record.map(|r| r.status),
                reserve,
                wallets: record
                    .map(|r| r.wallets.iter().cloned().collect())
                    .unwrap_or_default(),
                reserve_balance,
                reserve_stale,
                undercollateralized: p.is_undercollateralized(&qc),
                can_operate: p.can_operate(&qc),
                can_self_pause: p.can_self_pause(&qc, now),
                pause: p.get_pause_info(&qc).cloned(),
                earliest_redemption_deadline: p.get_earliest_redemption_deadline(&qc),
            })
        })
        .await;

    view.map(Json)
        .ok_or_else(|| ApiError::not_found("UNKNOWN_CUSTODIAN", format!("no reserve for {}", qc)))
}

#[derive(Debug, Serialize)]
pub struct AttestationView {
    pub record: Option<ReserveAttestationRecord>,
    pub pending_attestations: usize,
    pub balance: u64,
    pub stale: bool,
}

/// GET /api/reserves/:qc/attestation
pub async fn handle_get_attestation(
    State(state): State<SharedApiState>,
    Path(qc): Path<String>,
) -> Result<Json<AttestationView>, ApiError> {
    let qc = parse_account(&qc)?;

    let view = state
        .service
        .read(|p, now| {
            let (balance, stale) = p.get_reserve_balance_and_staleness(&qc, now);
            AttestationView {
                record: p.attestation_record(&qc).cloned(),
                pending_attestations: p.pending_attestation_count(&qc, now),
                balance,
                stale,
            }
        })
        .await;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct AttestationRequest {
    /// Satoshis held, as a decimal string
    #[serde(with = "token_amount")]
    pub balance: u128,
}

#[derive(Debug, Serialize)]
pub struct AttestationResponse {
    /// Set when this submission completed a consensus round
    pub consensus_balance: Option<u64>,
}

/// POST /api/reserves/:qc/attestations
pub async fn handle_submit_attestation(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<AttestationRequest>,
) -> Result<Json<AttestationResponse>, ApiError> {
    let qc = parse_account(&qc)?;
    let consensus_balance = state
        .service
        .execute(caller, |p, ctx| p.submit_attestation(ctx, qc, req.balance))
        .await?;
    Ok(Json(AttestationResponse { consensus_balance }))
}

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    pub recipient: AccountId,
    /// Token base units
    #[serde(with = "token_amount")]
    pub amount: u128,
}

#[derive(Debug, Serialize)]
pub struct MintResponse {
    pub qc: AccountId,
    pub recipient: AccountId,
    pub amount_sats: u64,
}

/// POST /api/reserves/:qc/mint
pub async fn handle_mint(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<MintRequest>,
) -> Result<Json<MintResponse>, ApiError> {
    let qc = parse_account(&qc)?;
    let result = state
        .service
        .execute(caller, |p, ctx| p.mint(ctx, qc, req.recipient, req.amount))
        .await;
    match &result {
        Ok(_) => log_mint_event(&qc, &req.recipient, req.amount, None),
        Err(e) => {
            let message = e.to_string();
            log_mint_event(&qc, &req.recipient, req.amount, Some((e.code(), &message)))
        }
    }
    let amount_sats = result?;
    Ok(Json(MintResponse {
        qc,
        recipient: req.recipient,
        amount_sats,
    }))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: QcStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub previous: QcStatus,
    pub status: QcStatus,
}

/// POST /api/reserves/:qc/status
pub async fn handle_set_status(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let qc = parse_account(&qc)?;
    let reason = match req.reason {
        Some(text) if !text.trim().is_empty() => StatusChangeReason::Other(text),
        _ => StatusChangeReason::Governance,
    };
    let previous = state
        .service
        .execute(caller, |p, ctx| p.set_qc_status(ctx, qc, req.status, reason))
        .await?;
    Ok(Json(StatusResponse {
        previous,
        status: req.status,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResumeRequest {
    /// Custodian ends its own pause before the window closes
    #[serde(default)]
    pub early: bool,
}

/// POST /api/reserves/:qc/resume
pub async fn handle_resume(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<ResumeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| {
            if req.early {
                p.resume_early(ctx, qc)
            } else {
                p.resume_if_expired(ctx, qc)
            }
        })
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "resumed": true })))
}

#[derive(Debug, Deserialize)]
pub struct SelfPauseRequest {
    pub reason: String,
}

/// POST /api/pause
pub async fn handle_self_pause(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Json(req): Json<SelfPauseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pause_end_time = state
        .service
        .execute(caller, |p, ctx| p.use_emergency_pause(ctx, &req.reason))
        .await?;
    Ok(Json(serde_json::json!({
        "qc": caller,
        "pause_end_time": pause_end_time,
    })))
}

/// POST /api/reserves/:qc/renew-credit
pub async fn handle_renew_credit(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.renew_pause_credit(ctx, qc))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "has_credit": true })))
}

/// POST /api/reserves/:qc/clear-pause
pub async fn handle_clear_pause(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.emergency_clear_pause(ctx, qc))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "resumed": true })))
}

/// POST /api/reserves/:qc/restore-credit
pub async fn handle_restore_credit(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.emergency_restore_credit(ctx, qc))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "has_credit": true })))
}

#[derive(Debug, Deserialize)]
pub struct WalletRequest {
    pub wallet: String,
}

/// POST /api/reserves/:qc/wallets
pub async fn handle_register_wallet(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<WalletRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.register_wallet(ctx, qc, &req.wallet))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "wallet": req.wallet, "registered": true })))
}

/// POST /api/reserves/:qc/wallets/remove
pub async fn handle_deregister_wallet(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<WalletRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.deregister_wallet(ctx, qc, &req.wallet))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "wallet": req.wallet, "registered": false })))
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    /// Token base units
    #[serde(with = "token_amount")]
    pub amount: u128,
}

/// POST /api/reserves/:qc/redeem
pub async fn handle_redeem(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<RedeemRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    let amount_sats = state
        .service
        .execute(caller, |p, ctx| p.redeem(ctx, qc, req.amount))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "amount_sats": amount_sats })))
}
