//! API Layer Module
//!
//! HTTP server, routes, middleware, and the WebSocket event feed.

pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use middleware::{spawn_rate_limit_cleanup, ApiError, Caller, RateLimitState, RateLimiter};
pub use server::{create_router, start_server, ApiState, SharedApiState};
