//! Health and summary endpoints

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::server::SharedApiState;
use crate::redemption::RedemptionStats;

/// GET /api/health
pub async fn handle_health(State(state): State<SharedApiState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "account-control",
        "version": env!("CARGO_PKG_VERSION"),
        "time": state.service.now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_minted_sats: u64,
    pub redemptions: RedemptionStats,
    pub expired_pauses: usize,
    pub overdue_redemptions: usize,
}

/// GET /api/stats
pub async fn handle_stats(State(state): State<SharedApiState>) -> Json<StatsResponse> {
    let stats = state
        .service
        .read(|p, now| StatsResponse {
            total_minted_sats: p.total_minted(),
            redemptions: p.redemption_stats(),
            expired_pauses: p.expired_pauses(now).len(),
            overdue_redemptions: p.overdue_redemptions(now).len(),
        })
        .await;
    Json(stats)
}
