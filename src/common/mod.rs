//! Common Infrastructure Module
//!
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - The root error type

pub mod config;
pub mod error;
pub mod logging;

pub use config::{ConfigError, Network, ProtocolConfig};
pub use error::{ErrorClass, ProtocolError, Result};
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_mint_event, log_protocol_event,
    log_redemption_event, log_security_event, EventCategory, LogEvent, LogLevel, LoggingError,
};
