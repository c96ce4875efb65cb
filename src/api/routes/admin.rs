//! Governance endpoints
//!
//! - POST /api/roles - grant a role
//! - POST /api/roles/revoke - revoke a role
//! - POST /api/reserves/:qc/authorize - admit a custodian with a minting cap
//! - POST /api/reserves/:qc/deauthorize - remove a custodian
//! - POST /api/reserves/:qc/cap - change a minting cap
//! - POST /api/pause/:scope - engage a pause switch
//! - POST /api/unpause/:scope - lift a pause switch
//! - POST /api/parameters - tune oracle and redemption parameters
//!
//! A scope is `system`, `minting`, `redemptions`, or a custodian account
//! for a single reserve.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::parse_account;
use crate::access::Role;
use crate::account_control::PauseScope;
use crate::api::middleware::{ApiError, Caller};
use crate::api::server::SharedApiState;
use crate::types::AccountId;

pub(crate) fn parse_scope(raw: &str) -> Result<PauseScope, ApiError> {
    match raw {
        "system" => Ok(PauseScope::System),
        "minting" => Ok(PauseScope::Minting),
        "redemptions" => Ok(PauseScope::Redemptions),
        other => other.parse().map(PauseScope::Reserve).map_err(|_| {
            ApiError::bad_request(
                "INVALID_PAUSE_SCOPE",
                format!("{} is neither a pause switch nor an account", other),
            )
        }),
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
    pub account: AccountId,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role: Role,
    pub account: AccountId,
    pub granted: bool,
}

/// POST /api/roles
pub async fn handle_grant_role(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Json(req): Json<RoleRequest>,
) -> Result<Json<RoleResponse>, ApiError> {
    state
        .service
        .execute(caller, |p, ctx| p.grant_role(ctx, req.role, req.account))
        .await?;
    Ok(Json(RoleResponse {
        role: req.role,
        account: req.account,
        granted: true,
    }))
}

/// POST /api/roles/revoke
pub async fn handle_revoke_role(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Json(req): Json<RoleRequest>,
) -> Result<Json<RoleResponse>, ApiError> {
    state
        .service
        .execute(caller, |p, ctx| p.revoke_role(ctx, req.role, req.account))
        .await?;
    Ok(Json(RoleResponse {
        role: req.role,
        account: req.account,
        granted: false,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CapRequest {
    /// Satoshis
    pub cap: u64,
}

#[derive(Debug, Serialize)]
pub struct CapResponse {
    pub qc: AccountId,
    pub cap: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<u64>,
}

/// POST /api/reserves/:qc/authorize
pub async fn handle_authorize_reserve(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<CapRequest>,
) -> Result<Json<CapResponse>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.authorize_reserve(ctx, qc, req.cap))
        .await?;
    Ok(Json(CapResponse {
        qc,
        cap: req.cap,
        previous: None,
    }))
}

/// POST /api/reserves/:qc/deauthorize
pub async fn handle_deauthorize_reserve(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let qc = parse_account(&qc)?;
    state
        .service
        .execute(caller, |p, ctx| p.deauthorize_reserve(ctx, qc))
        .await?;
    Ok(Json(serde_json::json!({ "qc": qc, "authorized": false })))
}

/// POST /api/reserves/:qc/cap
pub async fn handle_set_minting_cap(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(qc): Path<String>,
    Json(req): Json<CapRequest>,
) -> Result<Json<CapResponse>, ApiError> {
    let qc = parse_account(&qc)?;
    let previous = state
        .service
        .execute(caller, |p, ctx| p.set_minting_cap(ctx, qc, req.cap))
        .await?;
    Ok(Json(CapResponse {
        qc,
        cap: req.cap,
        previous: Some(previous),
    }))
}

#[derive(Debug, Serialize)]
pub struct PauseResponse {
    pub scope: PauseScope,
    pub paused: bool,
}

/// POST /api/pause/:scope
pub async fn handle_pause(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(scope): Path<String>,
) -> Result<Json<PauseResponse>, ApiError> {
    let scope = parse_scope(&scope)?;
    state
        .service
        .execute(caller, |p, ctx| p.pause(ctx, scope))
        .await?;
    Ok(Json(PauseResponse {
        scope,
        paused: true,
    }))
}

/// POST /api/unpause/:scope
pub async fn handle_unpause(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Path(scope): Path<String>,
) -> Result<Json<PauseResponse>, ApiError> {
    let scope = parse_scope(&scope)?;
    state
        .service
        .execute(caller, |p, ctx| p.unpause(ctx, scope))
        .await?;
    Ok(Json(PauseResponse {
        scope,
        paused: false,
    }))
}

/// Parameters left out are unchanged. All given values apply together or
/// not at all.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ParametersRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus_threshold: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staleness_threshold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redemption_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_proof_difficulty_factor: Option<u64>,
}

/// POST /api/parameters
pub async fn handle_set_parameters(
    State(state): State<SharedApiState>,
    Caller(caller): Caller,
    Json(req): Json<ParametersRequest>,
) -> Result<Json<ParametersRequest>, ApiError> {
    state
        .service
        .execute(caller, |p, ctx| {
            if let Some(threshold) = req.consensus_threshold {
                p.set_consensus_threshold(ctx, threshold)?;
            }
            if let Some(timeout) = req.attestation_timeout {
                p.set_attestation_timeout(ctx, timeout)?;
            }
            if let Some(threshold) = req.staleness_threshold {
                p.set_staleness_threshold(ctx, threshold)?;
            }
            if let Some(timeout) = req.redemption_timeout {
                p.set_redemption_timeout(ctx, timeout)?;
            }
            if let Some(factor) = req.tx_proof_difficulty_factor {
                p.set_tx_proof_difficulty_factor(ctx, factor)?;
            }
            Ok(())
        })
        .await?;
    Ok(Json(req))
}
