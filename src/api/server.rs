//! API Server Module
//!
//! Application state, router assembly and server startup.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::middleware::{
    correlation_id_middleware, create_rate_limiter, rate_limit_middleware,
    security_headers_middleware, spawn_rate_limit_cleanup, RateLimitState,
};
use super::routes::{admin, health, oracle, redemptions, reserves};
use super::websocket::{ws_custodian_events_handler, ws_events_handler};
use crate::service::ProtocolService;

/// State shared by every handler
pub struct ApiState {
    pub service: ProtocolService,
    pub rate_limiter: RateLimitState,
}

pub type SharedApiState = Arc<ApiState>;

impl ApiState {
    pub fn new(service: ProtocolService) -> SharedApiState {
        Arc::new(Self {
            service,
            rate_limiter: create_rate_limiter(),
        })
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: SharedApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let reads = Router::new()
        .route("/api/health", get(health::handle_health))
        .route("/api/stats", get(health::handle_stats))
        .route("/api/reserves/:qc", get(reserves::handle_get_reserve))
        .route(
            "/api/reserves/:qc/attestation",
            get(reserves::handle_get_attestation),
        )
        .route(
            "/api/reserves/:qc/earliest-deadline",
            get(redemptions::handle_earliest_deadline),
        )
        .route("/api/redemptions/:id", get(redemptions::handle_get_redemption))
        .route("/ws/events", get(ws_events_handler))
        .route("/ws/events/:qc", get(ws_custodian_events_handler));

    let writes = Router::new()
        .route(
            "/api/reserves/:qc/attestations",
            post(reserves::handle_submit_attestation),
        )
        .route("/api/reserves/:qc/mint", post(reserves::handle_mint))
        .route("/api/reserves/:qc/status", post(reserves::handle_set_status))
        .route("/api/reserves/:qc/resume", post(reserves::handle_resume))
        .route(
            "/api/reserves/:qc/renew-credit",
            post(reserves::handle_renew_credit),
        )
        .route(
            "/api/reserves/:qc/clear-pause",
            post(reserves::handle_clear_pause),
        )
        .route(
            "/api/reserves/:qc/restore-credit",
            post(reserves::handle_restore_credit),
        )
        .route(
            "/api/reserves/:qc/wallets",
            post(reserves::handle_register_wallet),
        )
        .route(
            "/api/reserves/:qc/wallets/remove",
            post(reserves::handle_deregister_wallet),
        )
        .route("/api/reserves/:qc/redeem", post(reserves::handle_redeem))
        .route("/api/pause", post(reserves::handle_self_pause))
        // Oracle feed and arbiter corrections
        .route("/api/backing", post(oracle::handle_batch_set_backing))
        .route("/api/reserves/:qc/backing", post(oracle::handle_set_backing))
        .route(
            "/api/reserves/:qc/consensus",
            post(oracle::handle_record_consensus),
        )
        .route(
            "/api/reserves/:qc/override",
            post(oracle::handle_override_attestation),
        )
        .route(
            "/api/reserves/:qc/emergency-reserve",
            post(oracle::handle_emergency_set_reserve),
        )
        .route(
            "/api/reserves/:qc/reset-consensus",
            post(oracle::handle_reset_consensus),
        )
        // Governance
        .route("/api/roles", post(admin::handle_grant_role))
        .route("/api/roles/revoke", post(admin::handle_revoke_role))
        .route(
            "/api/reserves/:qc/authorize",
            post(admin::handle_authorize_reserve),
        )
        .route(
            "/api/reserves/:qc/deauthorize",
            post(admin::handle_deauthorize_reserve),
        )
        .route("/api/reserves/:qc/cap", post(admin::handle_set_minting_cap))
        .route("/api/pause/:scope", post(admin::handle_pause))
        .route("/api/unpause/:scope", post(admin::handle_unpause))
        .route("/api/parameters", post(admin::handle_set_parameters))
        .route("/api/redemptions", post(redemptions::handle_request_redemption))
        .route(
            "/api/redemptions/:id/fulfill",
            post(redemptions::handle_record_fulfillment),
        )
        .route(
            "/api/redemptions/:id/default",
            post(redemptions::handle_flag_default),
        )
        .route_layer(from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .merge(reads)
        .merge(writes)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(correlation_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// Idle rate limiter entries are pruned this often
const RATE_LIMIT_CLEANUP_PERIOD: Duration = Duration::from_secs(60);

/// Start the API server
pub async fn start_server(service: ProtocolService, port: u16) -> Result<(), std::io::Error> {
    let state = ApiState::new(service);
    let cleanup = spawn_rate_limit_cleanup(state.rate_limiter.clone(), RATE_LIMIT_CLEANUP_PERIOD);
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "Account control API listening");
    println!("Endpoints:");
    println!("  GET  /api/health                        - Health check");
    println!("  GET  /api/reserves/:qc                  - Custodian reserve view");
    println!("  POST /api/roles                         - Grant a role (owner)");
    println!("  POST /api/reserves/:qc/authorize        - Authorize a reserve (owner)");
    println!("  POST /api/reserves/:qc/attestations     - Submit an attested balance");
    println!("  POST /api/reserves/:qc/backing          - Set backing (oracle)");
    println!("  POST /api/reserves/:qc/mint             - Mint against a reserve");
    println!("  POST /api/pause/:scope                  - Engage a pause switch");
    println!("  POST /api/redemptions                   - Request a redemption");
    println!("  POST /api/redemptions/:id/fulfill       - Record an SPV-proven payment");
    println!("  WS   /ws/events                         - Committed protocol events");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let result = axum::serve(listener, app).await;
    cleanup.abort();
    result
}
