//! Protocol Service
//!
//! Async handle shared by the API and the keeper. Transactions are
//! serialized through a single write lock, stamped with the service clock,
//! and persisted once they commit. Committed events are fanned out to
//! subscribers.

use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error};

use crate::common::error::{ErrorClass, ProtocolError};
use crate::common::logging::{log_protocol_event, log_security_event};
use crate::context::{CallContext, Clock};
use crate::events::ProtocolEvent;
use crate::protocol::Protocol;
use crate::storage::{StateChanges, StateStore, StorageError};
use crate::types::AccountId;

#[derive(Clone)]
pub struct ProtocolService {
    protocol: Arc<RwLock<Protocol>>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn StateStore>>,
    events: broadcast::Sender<ProtocolEvent>,
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

impl ProtocolService {
    pub fn new(protocol: Protocol, clock: Arc<dyn Clock>, store: Option<Arc<dyn StateStore>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            protocol: Arc::new(RwLock::new(protocol)),
            clock,
            store,
            events,
        }
    }

    /// Receive every event committed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.events.subscribe()
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Run one transaction as `caller` and persist the result.
    ///
    /// `f` may chain several protocol calls; if any of them fails, or the
    /// store rejects the commit, the in-memory state is put back and the
    /// events are dropped, so memory and disk never disagree.
    pub async fn execute<T, F>(&self, caller: AccountId, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&mut Protocol, &CallContext) -> Result<T, ProtocolError> + Send,
        T: Send,
    {
        let mut protocol = self.protocol.write().await;
        let ctx = CallContext::new(caller, self.clock.now());
        let snapshot = protocol.state().clone();

        let value = match f(&mut protocol, &ctx) {
            Ok(value) => value,
            Err(e) => {
                let partial = protocol.drain_events();
                if !partial.is_empty() {
                    protocol.restore_state(snapshot, &partial);
                }
                if e.class() == ErrorClass::Authorization {
                    log_security_event(
                        "capability_denied",
                        false,
                        serde_json::json!({ "caller": caller.to_string(), "code": e.code() }),
                        None,
                    );
                }
                return Err(e.into());
            }
        };

        let events = protocol.drain_events();
        if let Some(store) = &self.store {
            let changes = StateChanges::from_events(&events);
            if let Err(e) = store.save_state(protocol.state(), &changes).await {
                error!(caller = %caller, error = %e, "Persisting commit failed, reverting");
                protocol.restore_state(snapshot, &events);
                return Err(e.into());
            }
            debug!(caller = %caller, reserves = changes.reserves.len(), "State persisted");
        }
        for event in events {
            log_protocol_event(&event, None);
            // No subscribers is fine
            let _ = self.events.send(event);
        }
        Ok(value)
    }

    /// Read-only access at the current time
    pub async fn read<T>(&self, f: impl FnOnce(&Protocol, u64) -> T) -> T {
        let protocol = self.protocol.read().await;
        f(&protocol, self.clock.now())
    }

    pub fn store(&self) -> Option<&Arc<dyn StateStore>> {
        self.store.as_ref()
    }
}

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Protocol(e) => e.code(),
            ServiceError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Protocol(e) => e.class(),
            ServiceError::Storage(_) => ErrorClass::Operational,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ManualClock;
    use crate::protocol::{Collaborators, ProtocolParams};
    use crate::spv::{NetworkAddressDecoder, StaticHeaderRelay};
    use crate::access::Role;
    use crate::account_control::Reserve;
    use crate::protocol::ProtocolState;
    use crate::redemption::Redemption;
    use crate::storage::{MemoryStateStore, StorageResult};
    use crate::token::InMemoryToken;
    use crate::types::{sats_to_tokens, RedemptionId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    const OWNER: AccountId = AccountId::from_byte(1);
    const QC: AccountId = AccountId::from_byte(2);

    /// Memory store whose writes can be switched off
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStateStore,
        failing: AtomicBool,
    }

    #[async_trait]
    impl StateStore for FlakyStore {
        async fn save_state(
            &self,
            state: &ProtocolState,
            changes: &StateChanges,
        ) -> StorageResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StorageError::Database("disk I/O error".to_string()));
            }
            self.inner.save_state(state, changes).await
        }

        async fn load_state(&self) -> StorageResult<Option<ProtocolState>> {
            self.inner.load_state().await
        }

        async fn get_reserve(&self, qc: &AccountId) -> StorageResult<Option<Reserve>> {
            self.inner.get_reserve(qc).await
        }

        async fn get_redemption(&self, id: &RedemptionId) -> StorageResult<Option<Redemption>> {
            self.inner.get_redemption(id).await
        }
    }

    fn service(store: Option<Arc<dyn StateStore>>) -> ProtocolService {
        let protocol = Protocol::new(
            OWNER,
            ProtocolParams::default(),
            Collaborators {
                token: Box::new(InMemoryToken::new()),
                relay: Arc::new(StaticHeaderRelay::new(1, 1)),
                decoder: Arc::new(NetworkAddressDecoder::new(bitcoin::Network::Bitcoin)),
            },
        );
        ProtocolService::new(protocol, Arc::new(ManualClock::new(500)), store)
    }

    #[tokio::test]
    async fn test_execute_persists_commits() {
        let store = Arc::new(MemoryStateStore::new());
        let svc = service(Some(store.clone()));

        svc.execute(OWNER, |p, ctx| p.authorize_reserve(ctx, QC, 1_000))
            .await
            .unwrap();

        let reserve = store.get_reserve(&QC).await.unwrap().unwrap();
        assert_eq!(reserve.cap, 1_000);
        assert_eq!(reserve.authorized_at, 500);
    }

    #[tokio::test]
    async fn test_failed_transaction_not_persisted() {
        let store = Arc::new(MemoryStateStore::new());
        let svc = service(Some(store.clone()));

        let err = svc
            .execute(QC, |p, ctx| p.authorize_reserve(ctx, QC, 1_000))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_CAPABILITY");
        assert_eq!(err.class(), ErrorClass::Authorization);
        assert!(store.load_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscribers_receive_committed_events() {
        let svc = service(None);
        let mut rx = svc.subscribe();

        svc.execute(OWNER, |p, ctx| p.authorize_reserve(ctx, QC, 1_000))
            .await
            .unwrap();
        let _ = svc
            .execute(QC, |p, ctx| p.authorize_reserve(ctx, QC, 1_000))
            .await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.name(), "reserve_authorized");
        assert_eq!(event.qc(), Some(QC));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_sees_commits() {
        let svc = service(None);
        svc.execute(OWNER, |p, ctx| p.authorize_reserve(ctx, QC, 1_000))
            .await
            .unwrap();

        let (authorized, now) = svc
            .read(|p, now| (p.is_reserve_authorized(&QC), now))
            .await;
        assert!(authorized);
        assert_eq!(now, 500);
    }

    #[tokio::test]
    async fn test_store_failure_reverts_commit() {
        let store = Arc::new(FlakyStore::default());
        store.failing.store(true, Ordering::SeqCst);
        let svc = service(Some(store.clone()));
        let mut rx = svc.subscribe();

        let err = svc
            .execute(OWNER, |p, ctx| p.authorize_reserve(ctx, QC, 1_000))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert_eq!(err.class(), ErrorClass::Operational);
        assert!(!svc.read(|p, _| p.is_reserve_authorized(&QC)).await);
        assert!(rx.try_recv().is_err());

        // Once the store recovers the same call goes through
        store.failing.store(false, Ordering::SeqCst);
        svc.execute(OWNER, |p, ctx| p.authorize_reserve(ctx, QC, 1_000))
            .await
            .unwrap();
        assert_eq!(rx.try_recv().unwrap().name(), "reserve_authorized");
        assert_eq!(store.get_reserve(&QC).await.unwrap().unwrap().cap, 1_000);
    }

    #[tokio::test]
    async fn test_store_failure_reverts_token_mint() {
        let store = Arc::new(FlakyStore::default());
        let svc = service(Some(store.clone()));
        svc.execute(OWNER, |p, ctx| {
            p.grant_role(ctx, Role::Oracle, OWNER)?;
            p.authorize_reserve(ctx, QC, 10_000)?;
            p.set_backing(ctx, QC, 10_000)
        })
        .await
        .unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let err = svc
            .execute(QC, |p, ctx| p.mint(ctx, QC, QC, sats_to_tokens(2_000)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");

        let (minted, supply) = svc
            .read(|p, _| (p.minted(&QC), p.token().total_supply()))
            .await;
        assert_eq!(minted, 0);
        assert_eq!(supply, 0);
        let persisted = store.load_state().await.unwrap().unwrap();
        assert_eq!(persisted.ledger.minted(&QC), 0);
    }

    #[tokio::test]
    async fn test_chained_calls_all_or_nothing() {
        let svc = service(None);
        let mut rx = svc.subscribe();

        let err = svc
            .execute(OWNER, |p, ctx| {
                p.authorize_reserve(ctx, QC, 1_000)?;
                p.set_minting_cap(ctx, QC, 0)
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_CAP");
        assert!(!svc.read(|p, _| p.is_reserve_authorized(&QC)).await);
        assert!(rx.try_recv().is_err());
    }
}
