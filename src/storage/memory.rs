//! In-Memory Storage
//!
//! Data is lost when the service restarts.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{StateChanges, StateStore, StorageResult};
use crate::account_control::Reserve;
use crate::protocol::ProtocolState;
use crate::redemption::Redemption;
use crate::types::{AccountId, RedemptionId};

#[derive(Clone, Default)]
pub struct MemoryStateStore {
    state: Arc<RwLock<Option<ProtocolState>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_state(
        &self,
        state: &ProtocolState,
        _changes: &StateChanges,
    ) -> StorageResult<()> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }

    async fn load_state(&self) -> StorageResult<Option<ProtocolState>> {
        Ok(self.state.read().await.clone())
    }

    async fn get_reserve(&self, qc: &AccountId) -> StorageResult<Option<Reserve>> {
        let state = self.state.read().await;
        Ok(state
            .as_ref()
            .and_then(|s| s.ledger.reserve(qc))
            .cloned())
    }

    async fn get_redemption(&self, id: &RedemptionId) -> StorageResult<Option<Redemption>> {
        let state = self.state.read().await;
        Ok(state
            .as_ref()
            .and_then(|s| s.redemptions.get_redemption(id))
            .cloned())
    }
}
