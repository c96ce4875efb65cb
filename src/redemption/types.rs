//! Redemption Types

use serde::{Deserialize, Serialize};

use crate::types::{AccountId, RedemptionId};

/// Redemption lifecycle; resolved states are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionStatus {
    /// Tokens burned, waiting for the custodian's Bitcoin payment
    Pending,
    /// Payment proven by SPV
    Fulfilled,
    /// Deadline passed without proven payment
    Defaulted,
}

impl Default for RedemptionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Defaulted => write!(f, "defaulted"),
        }
    }
}

/// Proven payment details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    /// Bitcoin txid, display order
    pub txid: String,
    /// Outputs credited to this redemption
    pub outputs: Vec<u32>,
    pub paid_sats: u64,
    pub fulfilled_at: u64,
}

/// A redemption request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: RedemptionId,
    pub requester: AccountId,
    pub qc: AccountId,
    pub amount_sats: u64,
    pub btc_address: String,
    pub requested_at: u64,
    pub deadline: u64,
    pub status: RedemptionStatus,
    pub fulfillment: Option<Fulfillment>,
    pub default_reason: Option<String>,
}

impl Redemption {
    pub fn is_pending(&self) -> bool {
        self.status == RedemptionStatus::Pending
    }

    pub fn is_overdue(&self, now: u64) -> bool {
        self.is_pending() && now > self.deadline
    }
}

/// Redemption parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionConfig {
    /// Seconds a custodian has to pay out
    pub redemption_timeout: u64,
}

impl Default for RedemptionConfig {
    fn default() -> Self {
        Self {
            redemption_timeout: 7 * 24 * 3600,
        }
    }
}

/// Counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionStats {
    pub total_requests: u64,
    pub pending: u64,
    pub fulfilled: u64,
    pub defaulted: u64,
    pub pending_sats: u64,
}
