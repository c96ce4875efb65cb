//! Protocol Events
//!
//! Emitted by committed transactions only; a reverted transaction leaves
//! no events behind.

use serde::{Deserialize, Serialize};

use crate::access::Role;
use crate::account_control::PauseScope;
use crate::qc_state::{QcStatus, StatusChangeReason};
use crate::types::{AccountId, RedemptionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    // Oracle
    AttestationSubmitted {
        qc: AccountId,
        attester: AccountId,
        balance: u64,
    },
    AttestationsPurged {
        qc: AccountId,
        count: usize,
    },
    ConsensusReached {
        qc: AccountId,
        balance: u64,
        attestations: usize,
    },
    AttestationOverridden {
        qc: AccountId,
        previous: u64,
        balance: u64,
    },
    EmergencyReserveSet {
        qc: AccountId,
        previous: Option<u64>,
        balance: u64,
    },
    ConsensusReset {
        qc: AccountId,
        discarded: usize,
    },

    // Ledger
    ReserveAuthorized {
        qc: AccountId,
        cap: u64,
    },
    ReserveDeauthorized {
        qc: AccountId,
    },
    MintingCapUpdated {
        qc: AccountId,
        previous: u64,
        cap: u64,
    },
    BackingUpdated {
        qc: AccountId,
        previous: u64,
        backing: u64,
    },
    Minted {
        qc: AccountId,
        recipient: AccountId,
        amount_sats: u64,
    },
    Redeemed {
        qc: AccountId,
        amount_sats: u64,
    },
    Paused {
        scope: PauseScope,
        by: AccountId,
    },
    Unpaused {
        scope: PauseScope,
        by: AccountId,
    },

    // Status
    QcStatusChanged {
        qc: AccountId,
        from: QcStatus,
        to: QcStatus,
        reason: StatusChangeReason,
    },
    WalletRegistered {
        qc: AccountId,
        wallet: String,
    },
    WalletDeregistered {
        qc: AccountId,
        wallet: String,
    },

    // Pause credits
    EmergencyPauseUsed {
        qc: AccountId,
        reason: String,
        pause_end_time: u64,
    },
    PauseEnded {
        qc: AccountId,
        early: bool,
    },
    EmergencyPauseCleared {
        qc: AccountId,
    },
    PauseCreditRenewed {
        qc: AccountId,
    },
    PauseCreditRestored {
        qc: AccountId,
    },

    // Redemptions
    RedemptionRequested {
        id: RedemptionId,
        requester: AccountId,
        qc: AccountId,
        amount_sats: u64,
        btc_address: String,
        deadline: u64,
    },
    RedemptionFulfilled {
        id: RedemptionId,
        txid: String,
        paid_sats: u64,
    },
    RedemptionDefaulted {
        id: RedemptionId,
        qc: AccountId,
        reason: String,
    },

    // Administration
    RoleGranted {
        role: Role,
        account: AccountId,
    },
    RoleRevoked {
        role: Role,
        account: AccountId,
    },
}

impl ProtocolEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::AttestationSubmitted { .. } => "attestation_submitted",
            ProtocolEvent::AttestationsPurged { .. } => "attestations_purged",
            ProtocolEvent::ConsensusReached { .. } => "consensus_reached",
            ProtocolEvent::AttestationOverridden { .. } => "attestation_overridden",
            ProtocolEvent::EmergencyReserveSet { .. } => "emergency_reserve_set",
            ProtocolEvent::ConsensusReset { .. } => "consensus_reset",
            ProtocolEvent::ReserveAuthorized { .. } => "reserve_authorized",
            ProtocolEvent::ReserveDeauthorized { .. } => "reserve_deauthorized",
            ProtocolEvent::MintingCapUpdated { .. } => "minting_cap_updated",
            ProtocolEvent::BackingUpdated { .. } => "backing_updated",
            ProtocolEvent::Minted { .. } => "minted",
            ProtocolEvent::Redeemed { .. } => "redeemed",
            ProtocolEvent::Paused { .. } => "paused",
            ProtocolEvent::Unpaused { .. } => "unpaused",
            ProtocolEvent::QcStatusChanged { .. } => "qc_status_changed",
            ProtocolEvent::WalletRegistered { .. } => "wallet_registered",
            ProtocolEvent::WalletDeregistered { .. } => "wallet_deregistered",
            ProtocolEvent::EmergencyPauseUsed { .. } => "emergency_pause_used",
            ProtocolEvent::PauseEnded { .. } => "pause_ended",
            ProtocolEvent::EmergencyPauseCleared { .. } => "emergency_pause_cleared",
            ProtocolEvent::PauseCreditRenewed { .. } => "pause_credit_renewed",
            ProtocolEvent::PauseCreditRestored { .. } => "pause_credit_restored",
            ProtocolEvent::RedemptionRequested { .. } => "redemption_requested",
            ProtocolEvent::RedemptionFulfilled { .. } => "redemption_fulfilled",
            ProtocolEvent::RedemptionDefaulted { .. } => "redemption_defaulted",
            ProtocolEvent::RoleGranted { .. } => "role_granted",
            ProtocolEvent::RoleRevoked { .. } => "role_revoked",
        }
    }

    /// Custodian the event concerns, if any
    pub fn qc(&self) -> Option<AccountId> {
        match self {
            ProtocolEvent::AttestationSubmitted { qc, .. }
            | ProtocolEvent::AttestationsPurged { qc, .. }
            | ProtocolEvent::ConsensusReached { qc, .. }
            | ProtocolEvent::AttestationOverridden { qc, .. }
            | ProtocolEvent::EmergencyReserveSet { qc, .. }
            | ProtocolEvent::ConsensusReset { qc, .. }
            | ProtocolEvent::ReserveAuthorized { qc, .. }
            | ProtocolEvent::ReserveDeauthorized { qc }
            | ProtocolEvent::MintingCapUpdated { qc, .. }
            | ProtocolEvent::BackingUpdated { qc, .. }
            | ProtocolEvent::Minted { qc, .. }
            | ProtocolEvent::Redeemed { qc, .. }
            | ProtocolEvent::QcStatusChanged { qc, .. }
            | ProtocolEvent::WalletRegistered { qc, .. }
            | ProtocolEvent::WalletDeregistered { qc, .. }
            | ProtocolEvent::EmergencyPauseUsed { qc, .. }
            | ProtocolEvent::PauseEnded { qc, .. }
            | ProtocolEvent::EmergencyPauseCleared { qc }
            | ProtocolEvent::PauseCreditRenewed { qc }
            | ProtocolEvent::PauseCreditRestored { qc }
            | ProtocolEvent::RedemptionRequested { qc, .. }
            | ProtocolEvent::RedemptionDefaulted { qc, .. } => Some(*qc),
            ProtocolEvent::Paused { .. }
            | ProtocolEvent::Unpaused { .. }
            | ProtocolEvent::RedemptionFulfilled { .. }
            | ProtocolEvent::RoleGranted { .. }
            | ProtocolEvent::RoleRevoked { .. } => None,
        }
    }
}
