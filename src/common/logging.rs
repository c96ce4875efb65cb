//! Structured Logging
//!
//! JSON output in production, pretty output during development. Protocol
//! events, mints, redemptions and security decisions are logged as
//! [`LogEvent`] records so that log aggregation can index them by category.
//!
//! # Usage
//!
//! ```rust,ignore
//! use account_control::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, true)?;
//! ```

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::config::ProtocolConfig;
use crate::events::ProtocolEvent;
use crate::types::{AccountId, RedemptionId};

// ============================================================================
// Log Levels
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Oracle submissions and consensus
    Attestation,
    /// Mint, burn, backing and cap changes
    Ledger,
    /// Redemption lifecycle
    Redemption,
    /// Pause credits and pause switches
    Pause,
    /// Custodian status transitions
    Status,
    /// Capability checks and role changes
    Security,
    /// Startup, shutdown, keeper
    System,
}

impl EventCategory {
    pub fn of(event: &ProtocolEvent) -> Self {
        match event {
            ProtocolEvent::AttestationSubmitted { .. }
            | ProtocolEvent::AttestationsPurged { .. }
            | ProtocolEvent::ConsensusReached { .. }
            | ProtocolEvent::AttestationOverridden { .. }
            | ProtocolEvent::EmergencyReserveSet { .. }
            | ProtocolEvent::ConsensusReset { .. } => EventCategory::Attestation,
            ProtocolEvent::ReserveAuthorized { .. }
            | ProtocolEvent::ReserveDeauthorized { .. }
            | ProtocolEvent::MintingCapUpdated { .. }
            | ProtocolEvent::BackingUpdated { .. }
            | ProtocolEvent::Minted { .. }
            | ProtocolEvent::Redeemed { .. } => EventCategory::Ledger,
            ProtocolEvent::Paused { .. }
            | ProtocolEvent::Unpaused { .. }
            | ProtocolEvent::EmergencyPauseUsed { .. }
            | ProtocolEvent::PauseEnded { .. }
            | ProtocolEvent::EmergencyPauseCleared { .. }
            | ProtocolEvent::PauseCreditRenewed { .. }
            | ProtocolEvent::PauseCreditRestored { .. } => EventCategory::Pause,
            ProtocolEvent::QcStatusChanged { .. }
            | ProtocolEvent::WalletRegistered { .. }
            | ProtocolEvent::WalletDeregistered { .. } => EventCategory::Status,
            ProtocolEvent::RedemptionRequested { .. }
            | ProtocolEvent::RedemptionFulfilled { .. }
            | ProtocolEvent::RedemptionDefaulted { .. } => EventCategory::Redemption,
            ProtocolEvent::RoleGranted { .. } | ProtocolEvent::RoleRevoked { .. } => {
                EventCategory::Security
            }
        }
    }
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.as_filter().to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }

    fn emit(&self, level: LogLevel) {
        match level {
            LogLevel::Error => tracing::error!(target: "account_control::log", "{}", self.to_json()),
            LogLevel::Warn => tracing::warn!(target: "account_control::log", "{}", self.to_json()),
            LogLevel::Debug | LogLevel::Trace => {
                tracing::debug!(target: "account_control::log", "{}", self.to_json())
            }
            LogLevel::Info => tracing::info!(target: "account_control::log", "{}", self.to_json()),
        }
    }
}

// ============================================================================
// Event Helpers
// ============================================================================

/// Log a committed protocol event
pub fn log_protocol_event(event: &ProtocolEvent, correlation_id: Option<&str>) {
    let data = serde_json::to_value(event).unwrap_or(serde_json::Value::Null);
    let mut log = LogEvent::new(LogLevel::Info, EventCategory::of(event), event.name()).with_data(data);
    if let Some(id) = correlation_id {
        log = log.with_correlation_id(id);
    }
    log.emit(LogLevel::Info);
}

/// Log a mint attempt; `amount` is in token base units
pub fn log_mint_event(
    qc: &AccountId,
    recipient: &AccountId,
    amount: u128,
    error: Option<(&str, &str)>,
) {
    let success = error.is_none();
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Ledger, "mint").with_data(serde_json::json!({
        "qc": qc.to_string(),
        "recipient": recipient.to_string(),
        "amount": amount.to_string(),
        "success": success
    }));
    if let Some((code, message)) = error {
        event = event.with_error(code, message);
    }
    event.emit(level);
}

/// Log a redemption lifecycle step
pub fn log_redemption_event(
    event_type: &str,
    redemption_id: Option<&RedemptionId>,
    amount_sats: Option<u64>,
    btc_txid: Option<&str>,
    error: Option<(&str, &str)>,
) {
    let success = error.is_none();
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let id = redemption_id.map(|id| id.to_string());
    let mut event = LogEvent::new(level, EventCategory::Redemption, event_type).with_data(
        serde_json::json!({
            "redemption_id": id,
            "amount_sats": amount_sats,
            "btc_txid": btc_txid,
            "success": success
        }),
    );
    if let Some(id) = id {
        event = event.with_correlation_id(id);
    }
    if let Some((code, message)) = error {
        event = event.with_error(code, message);
    }
    event.emit(level);
}

/// Log a security-related decision
pub fn log_security_event(
    event_type: &str,
    success: bool,
    details: serde_json::Value,
    correlation_id: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Security, event_type).with_data(
        serde_json::json!({
            "success": success,
            "details": details
        }),
    );
    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }
    event.emit(level);
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the global subscriber
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.as_filter();
        EnvFilter::new(format!(
            "account_control={level},tower_http={level},axum={level}"
        ))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

pub fn init_from_config(config: &ProtocolConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), config.json_logs)
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Warn, EventCategory::Ledger, "mint")
            .with_correlation_id("req-1")
            .with_data(serde_json::json!({"amount_sats": 42}))
            .with_error("EXCEEDS_CAP", "cap reached");

        let json = event.to_json();
        assert!(json.contains("\"category\":\"ledger\""));
        assert!(json.contains("req-1"));
        assert!(json.contains("EXCEEDS_CAP"));
        assert!(json.contains("\"level\":\"WARN\""));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_event_categories() {
        let qc = AccountId::from_byte(1);
        assert_eq!(
            EventCategory::of(&ProtocolEvent::ConsensusReset { qc, discarded: 2 }),
            EventCategory::Attestation
        );
        assert_eq!(
            EventCategory::of(&ProtocolEvent::PauseCreditRenewed { qc }),
            EventCategory::Pause
        );
    }

    #[test]
    fn test_correlation_ids_unique() {
        assert_ne!(generate_correlation_id(), generate_correlation_id());
    }
}
