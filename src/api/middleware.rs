//! API Middleware - Caller Identity, Errors and Rate Limiting
//!
//! - Caller identity from the `x-caller` header
//! - Rate limiting per caller/IP on mutating endpoints
//! - Correlation IDs on every request
//! - Security headers
//! - JSON error responses mapped from protocol error classes

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

use crate::common::error::ErrorClass;
use crate::common::logging::generate_correlation_id;
use crate::service::ServiceError;
use crate::types::AccountId;

pub const CALLER_HEADER: &str = "x-caller";
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// ============================================================================
// Rate Limiting
// ============================================================================

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
    /// Burst allowance (extra requests allowed temporarily)
    pub burst: u32,
    /// Tracked clients; the longest-idle one is evicted past this
    pub max_clients: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
            burst: 10,
            max_clients: 10_000,
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    burst_tokens: u32,
}

/// In-memory rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: RwLock<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Check if a request is allowed for the given client ID
    pub async fn check(&self, client_id: &str) -> Result<(), RateLimitError> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        if !entries.contains_key(client_id) && entries.len() >= self.config.max_clients {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.window_start)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                entries.remove(&id);
            }
        }

        let entry = entries.entry(client_id.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start: now,
            burst_tokens: self.config.burst,
        });

        if now.duration_since(entry.window_start) >= self.config.window {
            entry.count = 0;
            entry.window_start = now;
            // Slowly replenish burst
            entry.burst_tokens = self.config.burst.min(entry.burst_tokens + 2);
        }

        if entry.count < self.config.max_requests {
            entry.count += 1;
            Ok(())
        } else if entry.burst_tokens > 0 {
            entry.burst_tokens -= 1;
            entry.count += 1;
            Ok(())
        } else {
            let retry_after = self
                .config
                .window
                .as_secs()
                .saturating_sub(now.duration_since(entry.window_start).as_secs());
            Err(RateLimitError::Exceeded { retry_after })
        }
    }

    /// Drop entries idle for two windows
    pub async fn cleanup(&self) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expiry = self.config.window * 2;

        entries.retain(|_, entry| now.duration_since(entry.window_start) < expiry);
    }
}

/// Run [`RateLimiter::cleanup`] every `period` until the task is aborted
pub fn spawn_rate_limit_cleanup(limiter: RateLimitState, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            limiter.cleanup().await;
            debug!("Rate limiter entries pruned");
        }
    })
}

#[derive(Debug)]
pub enum RateLimitError {
    Exceeded { retry_after: u64 },
}

/// Shared rate limiter state
pub type RateLimitState = Arc<RateLimiter>;

pub fn create_rate_limiter() -> RateLimitState {
    Arc::new(RateLimiter::new(RateLimitConfig::default()))
}

/// Extract client IP from request headers
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            return Some(value.split(',').next()?.trim().to_string());
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return Some(value.to_string());
        }
    }

    None
}

/// Rate limiting middleware, keyed by caller and falling back to client IP
pub async fn rate_limit_middleware(
    State(rate_limiter): State<RateLimitState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client_id = headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| extract_client_ip(&headers))
        .unwrap_or_else(|| "unknown".to_string());

    match rate_limiter.check(&client_id).await {
        Ok(()) => Ok(next.run(request).await),
        Err(RateLimitError::Exceeded { retry_after }) => Err(ApiError {
            status: StatusCode::TOO_MANY_REQUESTS,
            error: "Rate limit exceeded".to_string(),
            code: "RATE_LIMITED".to_string(),
            class: None,
            retry_after: Some(retry_after),
        }),
    }
}

// ============================================================================
// Caller Identity
// ============================================================================

/// Account a request acts as
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub AccountId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(CALLER_HEADER)
            .ok_or_else(|| {
                ApiError::new(
                    StatusCode::UNAUTHORIZED,
                    "MISSING_CALLER",
                    format!("{} header is required", CALLER_HEADER),
                )
            })?
            .to_str()
            .map_err(|_| ApiError::bad_request("INVALID_CALLER", "caller header is not ASCII"))?;

        value
            .parse::<AccountId>()
            .map(Caller)
            .map_err(|e| ApiError::bad_request("INVALID_CALLER", e.to_string()))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<ErrorClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            code: code.to_string(),
            class: None,
            retry_after: None,
        }
    }

    pub fn bad_request(code: &str, error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, error)
    }

    pub fn not_found(code: &str, error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, error)
    }
}

pub fn status_for_class(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Validation => StatusCode::BAD_REQUEST,
        ErrorClass::Authorization => StatusCode::FORBIDDEN,
        ErrorClass::Consistency => StatusCode::CONFLICT,
        ErrorClass::Proof => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Operational => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        let class = e.class();
        Self {
            status: status_for_class(class),
            error: e.to_string(),
            code: e.code().to_string(),
            class: Some(class),
            retry_after: None,
        }
    }
}

impl From<crate::common::error::ProtocolError> for ApiError {
    fn from(e: crate::common::error::ProtocolError) -> Self {
        ServiceError::from(e).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

// ============================================================================
// Correlation IDs and Security Headers
// ============================================================================

/// Tag every request with a correlation ID, echoed back in the response
pub async fn correlation_id_middleware(request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(generate_correlation_id);

    let span = tracing::info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Content-Security-Policy",
        HeaderValue::from_static("default-src 'self'"),
    );

    response
}

// ============================================================================
// Tests
// ============================================================================
