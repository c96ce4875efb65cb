//! Storage Trait Definitions
//!
//! The protocol is persisted as one snapshot after every committed
//! transaction. Stores also index reserves by custodian and redemptions by
//! id so that reads do not have to deserialize the whole snapshot; only the
//! index rows a transaction touched are rewritten.

use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::account_control::{PauseScope, Reserve};
use crate::events::ProtocolEvent;
use crate::protocol::ProtocolState;
use crate::redemption::Redemption;
use crate::types::{AccountId, RedemptionId};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Index rows touched by one commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChanges {
    pub reserves: BTreeSet<AccountId>,
    pub redemptions: BTreeSet<RedemptionId>,
}

impl StateChanges {
    /// Collect the custodians and redemptions named by committed events
    pub fn from_events(events: &[ProtocolEvent]) -> Self {
        let mut changes = Self::default();
        for event in events {
            if let Some(qc) = event.qc() {
                changes.reserves.insert(qc);
            }
            match event {
                ProtocolEvent::Paused {
                    scope: PauseScope::Reserve(qc),
                    ..
                }
                | ProtocolEvent::Unpaused {
                    scope: PauseScope::Reserve(qc),
                    ..
                } => {
                    changes.reserves.insert(*qc);
                }
                ProtocolEvent::RedemptionRequested { id, .. }
                | ProtocolEvent::RedemptionFulfilled { id, .. }
                | ProtocolEvent::RedemptionDefaulted { id, .. } => {
                    changes.redemptions.insert(*id);
                }
                _ => {}
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.reserves.is_empty() && self.redemptions.is_empty()
    }
}

/// Protocol state persistence
///
/// Implementations:
/// - `SqliteStateStore` - durable storage with SQLite
/// - `MemoryStateStore` - in-memory storage for tests and development
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replace the stored snapshot and refresh the index rows in `changes`
    async fn save_state(
        &self,
        state: &ProtocolState,
        changes: &StateChanges,
    ) -> StorageResult<()>;

    /// Latest snapshot, if one was ever saved
    async fn load_state(&self) -> StorageResult<Option<ProtocolState>>;

    async fn get_reserve(&self, qc: &AccountId) -> StorageResult<Option<Reserve>>;

    async fn get_redemption(&self, id: &RedemptionId) -> StorageResult<Option<Redemption>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changes_follow_events() {
        let qc = AccountId::from_byte(1);
        let other = AccountId::from_byte(2);
        let id = RedemptionId([9; 32]);

        let changes = StateChanges::from_events(&[
            ProtocolEvent::Paused {
                scope: PauseScope::Reserve(other),
                by: AccountId::from_byte(3),
            },
            ProtocolEvent::Paused {
                scope: PauseScope::System,
                by: AccountId::from_byte(3),
            },
            ProtocolEvent::RedemptionFulfilled {
                id,
                txid: "00".repeat(32),
                paid_sats: 1_000,
            },
            ProtocolEvent::Minted {
                qc,
                recipient: other,
                amount_sats: 5,
            },
        ]);

        assert_eq!(changes.reserves, BTreeSet::from([qc, other]));
        assert_eq!(changes.redemptions, BTreeSet::from([id]));
        assert!(StateChanges::from_events(&[]).is_empty());
    }
}
