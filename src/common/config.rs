//! Environment-based Configuration
//!
//! Every protocol parameter can be set from an environment variable and
//! falls back to a network-appropriate default.
//!
//! # Environment Variables
//!
//! ## Network
//! - `ACCOUNT_CONTROL_NETWORK` - "mainnet", "testnet" or "regtest" (default: "regtest")
//! - `ACCOUNT_CONTROL_OWNER` - 0x-prefixed 20-byte owner account (required off regtest)
//! - `ACCOUNT_CONTROL_KEEPER` - account the keeper submits as (default: owner)
//!
//! ## Oracle
//! - `ACCOUNT_CONTROL_CONSENSUS_THRESHOLD` - attestations per round (default: 3)
//! - `ACCOUNT_CONTROL_ATTESTATION_TIMEOUT` - seconds (default: 21600)
//! - `ACCOUNT_CONTROL_STALENESS_THRESHOLD` - seconds (default: 86400)
//! - `ACCOUNT_CONTROL_MAX_PENDING_ATTESTATIONS` - per custodian (default: 32)
//!
//! ## Pauses and redemptions
//! - `ACCOUNT_CONTROL_PAUSE_DURATION` - seconds (default: 172800)
//! - `ACCOUNT_CONTROL_MIN_REDEMPTION_BUFFER` - seconds (default: 28800)
//! - `ACCOUNT_CONTROL_PAUSE_RENEWAL_PERIOD` - seconds (default: 7776000)
//! - `ACCOUNT_CONTROL_REDEMPTION_TIMEOUT` - seconds (default: 604800)
//!
//! ## SPV
//! - `ACCOUNT_CONTROL_DIFFICULTY_FACTOR` - headers of work required (default: 6, regtest 1)
//! - `ACCOUNT_CONTROL_CURRENT_EPOCH_DIFFICULTY` - required off regtest
//! - `ACCOUNT_CONTROL_PREVIOUS_EPOCH_DIFFICULTY` - defaults to current
//!
//! ## Service
//! - `ACCOUNT_CONTROL_API_PORT` - HTTP port (default: 8080)
//! - `ACCOUNT_CONTROL_DB_PATH` - SQLite path; in-memory store when unset
//! - `ACCOUNT_CONTROL_KEEPER_INTERVAL` - seconds between keeper ticks (default: 60)
//! - `ACCOUNT_CONTROL_LOG_LEVEL` - trace, debug, info, warn, error (default: "info")
//! - `ACCOUNT_CONTROL_JSON_LOGS` - "1" for JSON logs (default: on for mainnet)

use std::env;
use std::str::FromStr;
use thiserror::Error;

use crate::account_control::LedgerConfig;
use crate::oracle::OracleConfig;
use crate::pause_credit::PauseConfig;
use crate::protocol::ProtocolParams;
use crate::redemption::RedemptionConfig;
use crate::spv::difficulty::{MAINNET_POW_LIMIT_BITS, REGTEST_POW_LIMIT_BITS};
use crate::spv::SpvConfig;
use crate::types::AccountId;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Bitcoin network the custodians settle on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" | "dev" => Ok(Network::Regtest),
            _ => Err(ConfigError::InvalidValue(
                "ACCOUNT_CONTROL_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }

    /// Compact target that difficulty 1 refers to
    pub fn pow_limit_bits(&self) -> u32 {
        match self {
            Network::Mainnet | Network::Testnet => MAINNET_POW_LIMIT_BITS,
            Network::Regtest => REGTEST_POW_LIMIT_BITS,
        }
    }

    fn default_difficulty_factor(&self) -> u64 {
        match self {
            Network::Mainnet | Network::Testnet => 6,
            Network::Regtest => 1,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    pub network: Network,

    /// Initial holder of the owner role
    pub owner: AccountId,
    /// Keeper identity; granted the arbiter role at bootstrap
    pub keeper: AccountId,

    pub consensus_threshold: usize,
    pub attestation_timeout: u64,
    pub staleness_threshold: u64,
    pub max_pending_attestations: usize,

    pub pause_duration: u64,
    pub min_redemption_buffer: u64,
    pub pause_renewal_period: u64,
    pub redemption_timeout: u64,

    pub tx_proof_difficulty_factor: u64,
    pub current_epoch_difficulty: u64,
    pub previous_epoch_difficulty: u64,

    pub api_port: u16,
    /// SQLite database path; `None` keeps state in memory
    pub db_path: Option<String>,
    pub keeper_interval_secs: u64,

    pub log_level: String,
    pub json_logs: bool,
}

impl ProtocolConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("ACCOUNT_CONTROL_NETWORK")
            .unwrap_or_else(|_| "regtest".to_string())
            .parse()?;

        let owner = match env::var("ACCOUNT_CONTROL_OWNER") {
            Ok(value) => value.parse::<AccountId>().map_err(|e| {
                ConfigError::InvalidValue("ACCOUNT_CONTROL_OWNER".to_string(), e.to_string())
            })?,
            Err(_) if network == Network::Regtest => AccountId::from_byte(1),
            Err(_) => return Err(ConfigError::MissingEnvVar("ACCOUNT_CONTROL_OWNER".to_string())),
        };

        let keeper = match env::var("ACCOUNT_CONTROL_KEEPER") {
            Ok(value) => value.parse::<AccountId>().map_err(|e| {
                ConfigError::InvalidValue("ACCOUNT_CONTROL_KEEPER".to_string(), e.to_string())
            })?,
            Err(_) => owner,
        };

        let oracle = OracleConfig::default();
        let pause = PauseConfig::default();
        let redemption = RedemptionConfig::default();

        let current_epoch_difficulty = match env::var("ACCOUNT_CONTROL_CURRENT_EPOCH_DIFFICULTY") {
            Ok(value) => parse_value("ACCOUNT_CONTROL_CURRENT_EPOCH_DIFFICULTY", &value)?,
            Err(_) if network == Network::Regtest => 1,
            Err(_) => {
                return Err(ConfigError::MissingEnvVar(
                    "ACCOUNT_CONTROL_CURRENT_EPOCH_DIFFICULTY".to_string(),
                ))
            }
        };

        let json_logs = env::var("ACCOUNT_CONTROL_JSON_LOGS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(network == Network::Mainnet);

        Ok(Self {
            network,
            owner,
            keeper,
            consensus_threshold: var_or(
                "ACCOUNT_CONTROL_CONSENSUS_THRESHOLD",
                oracle.consensus_threshold,
            )?,
            attestation_timeout: var_or(
                "ACCOUNT_CONTROL_ATTESTATION_TIMEOUT",
                oracle.attestation_timeout,
            )?,
            staleness_threshold: var_or(
                "ACCOUNT_CONTROL_STALENESS_THRESHOLD",
                oracle.staleness_threshold,
            )?,
            max_pending_attestations: var_or(
                "ACCOUNT_CONTROL_MAX_PENDING_ATTESTATIONS",
                oracle.max_pending_attestations,
            )?,
            pause_duration: var_or("ACCOUNT_CONTROL_PAUSE_DURATION", pause.pause_duration)?,
            min_redemption_buffer: var_or(
                "ACCOUNT_CONTROL_MIN_REDEMPTION_BUFFER",
                pause.min_redemption_buffer,
            )?,
            pause_renewal_period: var_or(
                "ACCOUNT_CONTROL_PAUSE_RENEWAL_PERIOD",
                pause.renewal_period,
            )?,
            redemption_timeout: var_or(
                "ACCOUNT_CONTROL_REDEMPTION_TIMEOUT",
                redemption.redemption_timeout,
            )?,
            tx_proof_difficulty_factor: var_or(
                "ACCOUNT_CONTROL_DIFFICULTY_FACTOR",
                network.default_difficulty_factor(),
            )?,
            current_epoch_difficulty,
            previous_epoch_difficulty: var_or(
                "ACCOUNT_CONTROL_PREVIOUS_EPOCH_DIFFICULTY",
                current_epoch_difficulty,
            )?,
            api_port: var_or("ACCOUNT_CONTROL_API_PORT", 8080)?,
            db_path: env::var("ACCOUNT_CONTROL_DB_PATH").ok().filter(|p| !p.is_empty()),
            keeper_interval_secs: var_or("ACCOUNT_CONTROL_KEEPER_INTERVAL", 60)?,
            log_level: env::var("ACCOUNT_CONTROL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            json_logs,
        })
    }

    /// Reject values the protocol cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.owner.is_zero() {
            return Err(ConfigError::InvalidValue(
                "ACCOUNT_CONTROL_OWNER".to_string(),
                "owner cannot be the zero account".to_string(),
            ));
        }
        if self.keeper.is_zero() {
            return Err(ConfigError::InvalidValue(
                "ACCOUNT_CONTROL_KEEPER".to_string(),
                "keeper cannot be the zero account".to_string(),
            ));
        }

        for (name, value) in [
            ("ACCOUNT_CONTROL_CONSENSUS_THRESHOLD", self.consensus_threshold as u64),
            ("ACCOUNT_CONTROL_ATTESTATION_TIMEOUT", self.attestation_timeout),
            ("ACCOUNT_CONTROL_STALENESS_THRESHOLD", self.staleness_threshold),
            ("ACCOUNT_CONTROL_MAX_PENDING_ATTESTATIONS", self.max_pending_attestations as u64),
            ("ACCOUNT_CONTROL_PAUSE_DURATION", self.pause_duration),
            ("ACCOUNT_CONTROL_REDEMPTION_TIMEOUT", self.redemption_timeout),
            ("ACCOUNT_CONTROL_DIFFICULTY_FACTOR", self.tx_proof_difficulty_factor),
            ("ACCOUNT_CONTROL_CURRENT_EPOCH_DIFFICULTY", self.current_epoch_difficulty),
            ("ACCOUNT_CONTROL_KEEPER_INTERVAL", self.keeper_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
        }

        if self.max_pending_attestations < self.consensus_threshold {
            return Err(ConfigError::Inconsistent(format!(
                "max pending attestations {} below consensus threshold {}",
                self.max_pending_attestations, self.consensus_threshold
            )));
        }
        if self.pause_renewal_period < self.pause_duration {
            return Err(ConfigError::Inconsistent(
                "pause renewal period shorter than pause duration".to_string(),
            ));
        }
        if self.redemption_timeout <= self.pause_duration + self.min_redemption_buffer {
            return Err(ConfigError::Inconsistent(
                "redemption timeout leaves no room for a self-pause".to_string(),
            ));
        }

        Ok(())
    }

    /// Component parameters derived from this configuration
    pub fn protocol_params(&self) -> ProtocolParams {
        ProtocolParams {
            oracle: OracleConfig {
                consensus_threshold: self.consensus_threshold,
                attestation_timeout: self.attestation_timeout,
                staleness_threshold: self.staleness_threshold,
                max_pending_attestations: self.max_pending_attestations,
            },
            pause: PauseConfig {
                pause_duration: self.pause_duration,
                min_redemption_buffer: self.min_redemption_buffer,
                renewal_period: self.pause_renewal_period,
            },
            ledger: LedgerConfig {
                max_backing_age: self.staleness_threshold,
            },
            redemption: RedemptionConfig {
                redemption_timeout: self.redemption_timeout,
            },
            spv: SpvConfig {
                tx_proof_difficulty_factor: self.tx_proof_difficulty_factor,
                pow_limit_bits: self.network.pow_limit_bits(),
            },
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("=== Account Control Configuration ===");
        println!("Network: {:?}", self.network);
        println!("Owner: {}", self.owner);
        println!("Keeper: {}", self.keeper);
        println!(
            "Oracle: {} attestations, timeout {}s, stale after {}s",
            self.consensus_threshold, self.attestation_timeout, self.staleness_threshold
        );
        println!(
            "Pause: {}s window, {}s buffer, renew after {}s",
            self.pause_duration, self.min_redemption_buffer, self.pause_renewal_period
        );
        println!("Redemption Timeout: {}s", self.redemption_timeout);
        println!(
            "SPV: factor {}, epochs {}/{}",
            self.tx_proof_difficulty_factor,
            self.current_epoch_difficulty,
            self.previous_epoch_difficulty
        );
        println!("API Port: {}", self.api_port);
        println!(
            "Storage: {}",
            self.db_path.as_deref().unwrap_or("in-memory")
        );
        println!("Keeper Interval: {}s", self.keeper_interval_secs);
        println!("Log Level: {}", self.log_level);
        println!("=====================================");
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue(name.to_string(), format!("cannot parse {:?}", value))
    })
}

/// Parse a variable if set, else use the default
fn var_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_value(name, &value),
        Err(_) => Ok(default),
    }
}
