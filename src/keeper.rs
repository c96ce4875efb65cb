//! Keeper
//!
//! Time never changes protocol state by itself. The keeper periodically
//! submits the transactions that time makes possible:
//!
//! - flag redemptions whose deadline has passed as defaulted
//! - close self-pauses whose window has elapsed

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::service::ProtocolService;
use crate::types::AccountId;

pub const DEFAULT_REASON: &str = "redemption deadline elapsed without proven payment";

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct KeeperStats {
    pub ticks: u64,
    pub defaults_flagged: u64,
    pub pauses_resumed: u64,
    pub errors: u64,
}

pub struct Keeper {
    service: ProtocolService,
    /// Account the keeper submits as; needs the arbiter role to flag defaults
    identity: AccountId,
    interval_secs: u64,
    stats: Arc<RwLock<KeeperStats>>,
    running: Arc<RwLock<bool>>,
}

impl Keeper {
    pub fn new(service: ProtocolService, identity: AccountId, interval_secs: u64) -> Self {
        Self {
            service,
            identity,
            interval_secs,
            stats: Arc::new(RwLock::new(KeeperStats::default())),
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// One pass over overdue redemptions and expired pauses
    pub async fn tick(&self) -> TickResult {
        let mut result = TickResult::default();

        let (overdue, expired) = self
            .service
            .read(|p, now| (p.overdue_redemptions(now), p.expired_pauses(now)))
            .await;
        result.overdue_found = overdue.len();

        for id in overdue {
            match self
                .service
                .execute(self.identity, |p, ctx| p.flag_default(ctx, id, DEFAULT_REASON))
                .await
            {
                Ok(_) => result.defaults_flagged += 1,
                Err(e) => {
                    warn!(redemption = %id, code = e.code(), error = %e, "Failed to flag default");
                    result.errors += 1;
                }
            }
        }

        for qc in expired {
            match self
                .service
                .execute(self.identity, |p, ctx| p.resume_if_expired(ctx, qc))
                .await
            {
                Ok(()) => result.pauses_resumed += 1,
                Err(e) => {
                    warn!(qc = %qc, code = e.code(), error = %e, "Failed to resume pause");
                    result.errors += 1;
                }
            }
        }

        let mut stats = self.stats.write().await;
        stats.ticks += 1;
        stats.defaults_flagged += result.defaults_flagged as u64;
        stats.pauses_resumed += result.pauses_resumed as u64;
        stats.errors += result.errors as u64;

        result
    }

    /// Run until [`Keeper::stop`] is called
    pub async fn run(&self) {
        *self.running.write().await = true;
        info!(
            interval_secs = self.interval_secs,
            identity = %self.identity,
            "Keeper started"
        );

        loop {
            if !*self.running.read().await {
                break;
            }

            let result = self.tick().await;
            if result.has_activity() {
                info!("[keeper] {}", result);
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(self.interval_secs)).await;
        }

        info!("Keeper stopped");
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    pub async fn stats(&self) -> KeeperStats {
        self.stats.read().await.clone()
    }
}

/// Result of a keeper tick
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickResult {
    pub overdue_found: usize,
    pub defaults_flagged: usize,
    pub pauses_resumed: usize,
    pub errors: usize,
}

impl TickResult {
    pub fn has_activity(&self) -> bool {
        self.overdue_found > 0 || self.pauses_resumed > 0 || self.errors > 0
    }
}

impl std::fmt::Display for TickResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "overdue: {}, defaulted: {}, resumed: {}, errors: {}",
            self.overdue_found, self.defaults_flagged, self.pauses_resumed, self.errors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Role;
    use crate::context::ManualClock;
    use crate::protocol::{Collaborators, Protocol, ProtocolParams};
    use crate::qc_state::QcStatus;
    use crate::redemption::RedemptionStatus;
    use crate::spv::{NetworkAddressDecoder, StaticHeaderRelay};
    use crate::token::InMemoryToken;
    use crate::types::sats_to_tokens;

    const OWNER: AccountId = AccountId::from_byte(1);
    const KEEPER: AccountId = AccountId::from_byte(2);
    const ORACLE: AccountId = AccountId::from_byte(3);
    const QC: AccountId = AccountId::from_byte(0xaa);
    const QC2: AccountId = AccountId::from_byte(0xab);
    const HOLDER: AccountId = AccountId::from_byte(0xbb);
    const ADDRESS: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";
    const T0: u64 = 1_700_000_000;
    const DAY: u64 = 24 * 3600;

    async fn setup() -> (ProtocolService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let protocol = Protocol::new(
            OWNER,
            ProtocolParams::default(),
            Collaborators {
                token: Box::new(InMemoryToken::new()),
                relay: Arc::new(StaticHeaderRelay::new(1, 1)),
                decoder: Arc::new(NetworkAddressDecoder::new(bitcoin::Network::Bitcoin)),
            },
        );
        let service = ProtocolService::new(protocol, clock.clone(), None);

        service
            .execute(OWNER, |p, ctx| {
                p.grant_role(ctx, Role::Arbiter, KEEPER)?;
                p.grant_role(ctx, Role::Oracle, ORACLE)?;
                p.authorize_reserve(ctx, QC, 100_000)?;
                p.authorize_reserve(ctx, QC2, 100_000)
            })
            .await
            .unwrap();
        service
            .execute(ORACLE, |p, ctx| p.set_backing(ctx, QC, 50_000))
            .await
            .unwrap();
        service
            .execute(QC, |p, ctx| {
                p.mint(ctx, QC, HOLDER, sats_to_tokens(10_000)).map(|_| ())
            })
            .await
            .unwrap();

        (service, clock)
    }

    #[tokio::test]
    async fn test_tick_idle() {
        let (service, _clock) = setup().await;
        let keeper = Keeper::new(service, KEEPER, 60);

        let result = keeper.tick().await;
        assert!(!result.has_activity());
        assert_eq!(keeper.stats().await.ticks, 1);
    }

    #[tokio::test]
    async fn test_tick_flags_overdue_redemption() {
        let (service, clock) = setup().await;
        let redemption = service
            .execute(HOLDER, |p, ctx| {
                p.request_redemption(ctx, QC, sats_to_tokens(1_000), ADDRESS)
            })
            .await
            .unwrap();

        let keeper = Keeper::new(service.clone(), KEEPER, 60);
        clock.set(redemption.deadline + 1);

        let result = keeper.tick().await;
        assert_eq!(result.defaults_flagged, 1);
        assert_eq!(result.errors, 0);

        let (status, qc_status) = service
            .read(|p, _| {
                (
                    p.get_redemption(&redemption.id).map(|r| r.status).ok(),
                    p.qc_status(&QC),
                )
            })
            .await;
        assert_eq!(status, Some(RedemptionStatus::Defaulted));
        assert_eq!(qc_status, Some(QcStatus::UnderReview));
    }

    #[tokio::test]
    async fn test_tick_resumes_expired_pause() {
        let (service, clock) = setup().await;
        let end = service
            .execute(QC2, |p, ctx| p.use_emergency_pause(ctx, "maintenance"))
            .await
            .unwrap();

        let keeper = Keeper::new(service.clone(), KEEPER, 60);
        assert_eq!(keeper.tick().await.pauses_resumed, 0);

        clock.set(end);
        assert_eq!(keeper.tick().await.pauses_resumed, 1);
        assert_eq!(
            service.read(|p, _| p.qc_status(&QC2)).await,
            Some(QcStatus::Active)
        );
        assert!(end < T0 + 3 * DAY);
    }

    #[tokio::test]
    async fn test_keeper_without_arbiter_counts_errors() {
        let (service, clock) = setup().await;
        let redemption = service
            .execute(HOLDER, |p, ctx| {
                p.request_redemption(ctx, QC, sats_to_tokens(1_000), ADDRESS)
            })
            .await
            .unwrap();

        let keeper = Keeper::new(service, ORACLE, 60);
        clock.set(redemption.deadline + 1);

        let result = keeper.tick().await;
        assert_eq!(result.defaults_flagged, 0);
        assert_eq!(result.errors, 1);
        assert_eq!(keeper.stats().await.errors, 1);
    }
}
