//! QC State Machine
//!
//! Lifecycle status and wallet registry per custodian.
//!
//! ```text
//! Active <-> MintingPaused <-> Paused
//!    \            |             /
//!     +----> UnderReview <----+
//!                 |
//!              Revoked (terminal, reachable from every state)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::types::AccountId;

/// Custodian lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    Active,
    MintingPaused,
    Paused,
    UnderReview,
    Revoked,
}

impl QcStatus {
    /// New minting allowed
    pub fn can_mint(&self) -> bool {
        matches!(self, QcStatus::Active)
    }

    /// Outstanding and new redemptions serviceable
    pub fn can_fulfill(&self) -> bool {
        matches!(self, QcStatus::Active | QcStatus::MintingPaused)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QcStatus::Revoked)
    }

    /// Transition table
    pub fn can_transition_to(&self, next: QcStatus) -> bool {
        use QcStatus::*;
        matches!(
            (self, next),
            (Active, MintingPaused)
                | (Active, Paused)
                | (Active, UnderReview)
                | (Active, Revoked)
                | (MintingPaused, Active)
                | (MintingPaused, Paused)
                | (MintingPaused, UnderReview)
                | (MintingPaused, Revoked)
                | (Paused, Active)
                | (Paused, MintingPaused)
                | (Paused, UnderReview)
                | (Paused, Revoked)
                | (UnderReview, Active)
                | (UnderReview, Revoked)
        )
    }
}

impl fmt::Display for QcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QcStatus::Active => "active",
            QcStatus::MintingPaused => "minting_paused",
            QcStatus::Paused => "paused",
            QcStatus::UnderReview => "under_review",
            QcStatus::Revoked => "revoked",
        };
        f.write_str(s)
    }
}

/// Machine-readable reason attached to every status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChangeReason {
    Registered,
    Governance,
    SelfPause,
    PauseExpired,
    PauseResumedEarly,
    EmergencyClear,
    RedemptionDefault,
    Undercollateralized,
    Other(String),
}

impl StatusChangeReason {
    pub fn code(&self) -> &'static str {
        match self {
            StatusChangeReason::Registered => "REGISTERED",
            StatusChangeReason::Governance => "GOVERNANCE",
            StatusChangeReason::SelfPause => "SELF_PAUSE",
            StatusChangeReason::PauseExpired => "PAUSE_EXPIRED",
            StatusChangeReason::PauseResumedEarly => "PAUSE_RESUMED_EARLY",
            StatusChangeReason::EmergencyClear => "EMERGENCY_CLEAR",
            StatusChangeReason::RedemptionDefault => "REDEMPTION_DEFAULT",
            StatusChangeReason::Undercollateralized => "UNDERCOLLATERALIZED",
            StatusChangeReason::Other(_) => "OTHER",
        }
    }
}

/// Per-custodian lifecycle record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcRecord {
    pub status: QcStatus,
    pub reason: StatusChangeReason,
    pub status_changed_at: u64,
    pub registered_at: u64,
    pub wallets: BTreeSet<String>,
}

/// State machine errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("custodian {0} is not registered")]
    NotRegistered(AccountId),

    #[error("custodian {0} is already registered")]
    AlreadyRegistered(AccountId),

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: QcStatus, to: QcStatus },

    #[error("wallet {0} already registered")]
    WalletAlreadyRegistered(String),

    #[error("wallet {0} not registered")]
    WalletNotRegistered(String),

    #[error("custodian {qc} is {status}")]
    StatusForbids { qc: AccountId, status: QcStatus },
}

impl StatusError {
    pub fn code(&self) -> &'static str {
        match self {
            StatusError::NotRegistered(_) => "QC_NOT_REGISTERED",
            StatusError::AlreadyRegistered(_) => "QC_ALREADY_REGISTERED",
            StatusError::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            StatusError::WalletAlreadyRegistered(_) => "WALLET_ALREADY_REGISTERED",
            StatusError::WalletNotRegistered(_) => "WALLET_NOT_REGISTERED",
            StatusError::StatusForbids { .. } => "QC_STATUS_FORBIDS",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QcStateMachine {
    qcs: BTreeMap<AccountId, QcRecord>,
}

impl QcStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, qc: AccountId, now: u64) -> Result<(), StatusError> {
        if self.qcs.contains_key(&qc) {
            return Err(StatusError::AlreadyRegistered(qc));
        }
        self.qcs.insert(
            qc,
            QcRecord {
                status: QcStatus::Active,
                reason: StatusChangeReason::Registered,
                status_changed_at: now,
                registered_at: now,
                wallets: BTreeSet::new(),
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, qc: &AccountId) -> Option<QcRecord> {
        self.qcs.remove(qc)
    }

    /// Apply a validated transition, returning the previous status
    pub fn set_status(
        &mut self,
        qc: &AccountId,
        next: QcStatus,
        reason: StatusChangeReason,
        now: u64,
    ) -> Result<QcStatus, StatusError> {
        let record = self
            .qcs
            .get_mut(qc)
            .ok_or(StatusError::NotRegistered(*qc))?;

        let previous = record.status;
        if !previous.can_transition_to(next) {
            return Err(StatusError::InvalidTransition {
                from: previous,
                to: next,
            });
        }

        record.status = next;
        record.reason = reason;
        record.status_changed_at = now;
        Ok(previous)
    }

    pub fn status(&self, qc: &AccountId) -> Option<QcStatus> {
        self.qcs.get(qc).map(|r| r.status)
    }

    pub fn record(&self, qc: &AccountId) -> Option<&QcRecord> {
        self.qcs.get(qc)
    }

    /// Status of a registered custodian or `NotRegistered`
    pub fn require_status(&self, qc: &AccountId) -> Result<QcStatus, StatusError> {
        self.status(qc).ok_or(StatusError::NotRegistered(*qc))
    }

    pub fn register_wallet(&mut self, qc: &AccountId, wallet: String) -> Result<(), StatusError> {
        let record = self
            .qcs
            .get_mut(qc)
            .ok_or(StatusError::NotRegistered(*qc))?;
        if record.status.is_terminal() {
            return Err(StatusError::StatusForbids {
                qc: *qc,
                status: record.status,
            });
        }
        if !record.wallets.insert(wallet.clone()) {
            return Err(StatusError::WalletAlreadyRegistered(wallet));
        }
        Ok(())
    }

    pub fn deregister_wallet(&mut self, qc: &AccountId, wallet: &str) -> Result<(), StatusError> {
        let record = self
            .qcs
            .get_mut(qc)
            .ok_or(StatusError::NotRegistered(*qc))?;
        if !record.wallets.remove(wallet) {
            return Err(StatusError::WalletNotRegistered(wallet.to_string()));
        }
        Ok(())
    }

    pub fn wallets(&self, qc: &AccountId) -> Vec<String> {
        self.qcs
            .get(qc)
            .map(|r| r.wallets.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QC: AccountId = AccountId::from_byte(0x11);

    #[test]
    fn test_gates() {
        assert!(QcStatus::Active.can_mint());
        assert!(!QcStatus::MintingPaused.can_mint());
        assert!(QcStatus::MintingPaused.can_fulfill());
        assert!(!QcStatus::Paused.can_fulfill());
        assert!(!QcStatus::UnderReview.can_fulfill());
        assert!(!QcStatus::Revoked.can_mint());
        assert!(!QcStatus::Revoked.can_fulfill());
    }

    #[test]
    fn test_revoked_is_terminal() {
        use QcStatus::*;
        for next in [Active, MintingPaused, Paused, UnderReview, Revoked] {
            assert!(!Revoked.can_transition_to(next));
        }
        for from in [Active, MintingPaused, Paused, UnderReview] {
            assert!(from.can_transition_to(Revoked));
            assert!(!from.can_transition_to(from));
        }
    }

    #[test]
    fn test_under_review_exits() {
        assert!(QcStatus::UnderReview.can_transition_to(QcStatus::Active));
        assert!(!QcStatus::UnderReview.can_transition_to(QcStatus::Paused));
        assert!(!QcStatus::UnderReview.can_transition_to(QcStatus::MintingPaused));
    }

    #[test]
    fn test_set_status() {
        let mut sm = QcStateMachine::new();
        assert_eq!(
            sm.set_status(&QC, QcStatus::Paused, StatusChangeReason::Governance, 0),
            Err(StatusError::NotRegistered(QC))
        );

        sm.register(QC, 1).unwrap();
        assert_eq!(sm.register(QC, 2), Err(StatusError::AlreadyRegistered(QC)));

        let prev = sm
            .set_status(&QC, QcStatus::MintingPaused, StatusChangeReason::Governance, 5)
            .unwrap();
        assert_eq!(prev, QcStatus::Active);

        let record = sm.record(&QC).unwrap();
        assert_eq!(record.status, QcStatus::MintingPaused);
        assert_eq!(record.reason.code(), "GOVERNANCE");
        assert_eq!(record.status_changed_at, 5);

        sm.set_status(&QC, QcStatus::Revoked, StatusChangeReason::Other("fraud".into()), 6)
            .unwrap();
        assert_eq!(
            sm.set_status(&QC, QcStatus::Active, StatusChangeReason::Governance, 7),
            Err(StatusError::InvalidTransition {
                from: QcStatus::Revoked,
                to: QcStatus::Active
            })
        );
    }

    #[test]
    fn test_wallet_registry() {
        let mut sm = QcStateMachine::new();
        sm.register(QC, 0).unwrap();

        sm.register_wallet(&QC, "bc1qexample".into()).unwrap();
        assert!(matches!(
            sm.register_wallet(&QC, "bc1qexample".into()),
            Err(StatusError::WalletAlreadyRegistered(_))
        ));
        assert_eq!(sm.wallets(&QC), vec!["bc1qexample".to_string()]);

        sm.deregister_wallet(&QC, "bc1qexample").unwrap();
        assert!(matches!(
            sm.deregister_wallet(&QC, "bc1qexample"),
            Err(StatusError::WalletNotRegistered(_))
        ));
    }
}
