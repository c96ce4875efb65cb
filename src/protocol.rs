//! Protocol Facade
//!
//! The single entry point for every write and read. Each write runs as a
//! transaction:
//!
//! 1. the caller is checked against the capability table,
//! 2. component state is mutated,
//! 3. cross-component invariants are checked,
//! 4. the token call (if any) runs last.
//!
//! Any error restores the pre-call state and discards the events the call
//! emitted.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::access::{AccessControl, Operation, Role};
use crate::account_control::{AccountControl, LedgerConfig, LedgerError, PauseScope, Reserve};
use crate::common::error::{ProtocolError, Result};
use crate::context::CallContext;
use crate::events::ProtocolEvent;
use crate::oracle::{OracleConfig, ReserveAttestationRecord, ReserveOracle};
use crate::pause_credit::{PauseConfig, PauseCredit, PauseCreditManager};
use crate::qc_state::{QcRecord, QcStateMachine, QcStatus, StatusChangeReason, StatusError};
use crate::redemption::{
    Fulfillment, Redemption, RedemptionConfig, RedemptionError, RedemptionManager,
    RedemptionStats,
};
use crate::spv::{BitcoinAddressDecoder, BitcoinHeaderRelay, BitcoinTxInfo, SpvConfig, SpvProof};
use crate::token::{TokenError, WrappedToken};
use crate::types::{sats_to_tokens, tokens_to_sats, AccountId, RedemptionId};

/// Component parameters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
    pub oracle: OracleConfig,
    pub pause: PauseConfig,
    pub ledger: LedgerConfig,
    pub redemption: RedemptionConfig,
    pub spv: SpvConfig,
}

/// Everything a transaction may roll back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolState {
    pub access: AccessControl,
    pub oracle: ReserveOracle,
    pub qc_state: QcStateMachine,
    pub pause_credits: PauseCreditManager,
    pub ledger: AccountControl,
    pub redemptions: RedemptionManager,
}

impl ProtocolState {
    pub fn new(owner: AccountId, params: ProtocolParams) -> Self {
        let mut ledger_config = params.ledger;
        ledger_config.max_backing_age = params.oracle.staleness_threshold;

        Self {
            access: AccessControl::with_owner(owner),
            oracle: ReserveOracle::new(params.oracle),
            qc_state: QcStateMachine::new(),
            pause_credits: PauseCreditManager::new(params.pause),
            ledger: AccountControl::new(ledger_config),
            redemptions: RedemptionManager::new(params.redemption, params.spv),
        }
    }
}

/// External systems the protocol talks to
pub struct Collaborators {
    pub token: Box<dyn WrappedToken>,
    pub relay: Arc<dyn BitcoinHeaderRelay>,
    pub decoder: Arc<dyn BitcoinAddressDecoder>,
}

pub struct Protocol {
    state: ProtocolState,
    token: Box<dyn WrappedToken>,
    relay: Arc<dyn BitcoinHeaderRelay>,
    decoder: Arc<dyn BitcoinAddressDecoder>,
    events: Vec<ProtocolEvent>,
    entered: bool,
}

impl Protocol {
    pub fn new(owner: AccountId, params: ProtocolParams, collaborators: Collaborators) -> Self {
        Self::from_state(ProtocolState::new(owner, params), collaborators)
    }

    /// Resume from persisted state
    pub fn from_state(state: ProtocolState, collaborators: Collaborators) -> Self {
        Self {
            state,
            token: collaborators.token,
            relay: collaborators.relay,
            decoder: collaborators.decoder,
            events: Vec::new(),
            entered: false,
        }
    }

    pub fn state(&self) -> &ProtocolState {
        &self.state
    }

    pub fn token(&self) -> &dyn WrappedToken {
        self.token.as_ref()
    }

    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Take every committed event
    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Put back `state` after commits that could not be made durable.
    ///
    /// Token supply lives outside the snapshot, so the mints and burns
    /// recorded in `reverted` are undone with opposite token calls, newest
    /// first.
    pub fn restore_state(&mut self, state: ProtocolState, reverted: &[ProtocolEvent]) {
        self.state = state;
        self.events.clear();

        for event in reverted.iter().rev() {
            let result = match event {
                ProtocolEvent::Minted {
                    recipient,
                    amount_sats,
                    ..
                } => self.token.burn(recipient, sats_to_tokens(*amount_sats)),
                // Only the custodian itself may redeem, so it was the burner
                ProtocolEvent::Redeemed { qc, amount_sats } => {
                    self.token.mint(qc, sats_to_tokens(*amount_sats))
                }
                ProtocolEvent::RedemptionRequested {
                    requester,
                    amount_sats,
                    ..
                } => self.token.mint(requester, sats_to_tokens(*amount_sats)),
                _ => Ok(()),
            };
            if let Err(e) = result {
                error!(event = event.name(), code = e.code(), error = %e, "Token reversal failed");
            }
        }
        warn!(reverted = reverted.len(), "Protocol state restored");
    }

    // =========================================================================
    // Transaction machinery
    // =========================================================================

    fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.entered {
            return Err(ProtocolError::Reentrancy);
        }
        self.entered = true;

        let snapshot = self.state.clone();
        let mark = self.events.len();

        let result = match f(self) {
            Ok(value) => self.check_invariants().map(|_| value),
            Err(e) => Err(e),
        };
        self.entered = false;

        match result {
            Ok(value) => {
                for event in &self.events[mark..] {
                    debug!(event = event.name(), qc = ?event.qc(), "Event committed");
                }
                Ok(value)
            }
            Err(e) => {
                self.state = snapshot;
                self.events.truncate(mark);
                warn!(code = e.code(), error = %e, "Transaction reverted");
                Err(e)
            }
        }
    }

    /// Token call, made after every state effect is applied and checked
    fn interact<T>(
        &mut self,
        call: impl FnOnce(&mut dyn WrappedToken) -> std::result::Result<T, TokenError>,
    ) -> Result<T> {
        self.check_invariants()?;
        Ok(call(self.token.as_mut())?)
    }

    /// Ledger invariants plus agreement between status and ledger gates
    pub fn check_invariants(&self) -> Result<()> {
        self.state.ledger.check_invariants()?;

        for (qc, reserve) in self.state.ledger.reserves() {
            let status = self
                .state
                .qc_state
                .status(qc)
                .ok_or_else(|| {
                    LedgerError::InvariantViolation(format!("{} authorized but not registered", qc))
                })?;
            if reserve.minting_enabled != status.can_mint()
                || reserve.status_paused != !status.can_fulfill()
            {
                return Err(LedgerError::InvariantViolation(format!(
                    "{} gates out of sync with status {}",
                    qc, status
                ))
                .into());
            }
        }
        Ok(())
    }

    fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    fn authorize(&self, op: Operation, ctx: &CallContext, subject: Option<&AccountId>) -> Result<()> {
        Ok(self.state.access.authorize(op, ctx, subject)?)
    }

    /// Write a status change through to the ledger gates
    fn apply_status(
        &mut self,
        qc: AccountId,
        next: QcStatus,
        reason: StatusChangeReason,
        now: u64,
    ) -> Result<QcStatus> {
        let previous = self
            .state
            .qc_state
            .set_status(&qc, next, reason.clone(), now)?;
        if self.state.ledger.is_reserve_authorized(&qc) {
            self.state
                .ledger
                .sync_status(&qc, next.can_mint(), !next.can_fulfill())?;
        }
        self.emit(ProtocolEvent::QcStatusChanged {
            qc,
            from: previous,
            to: next,
            reason,
        });
        Ok(previous)
    }

    /// Feed an oracle value into the ledger when the reserve exists
    fn push_backing(&mut self, qc: AccountId, backing: u64, at: u64) -> Result<()> {
        if !self.state.ledger.is_reserve_authorized(&qc) {
            debug!(qc = %qc, "No reserve for oracle value");
            return Ok(());
        }
        let previous = self.state.ledger.set_backing(&qc, backing, at)?;
        self.emit(ProtocolEvent::BackingUpdated {
            qc,
            previous,
            backing,
        });
        Ok(())
    }

    // =========================================================================
    // Roles
    // =========================================================================

    pub fn grant_role(&mut self, ctx: &CallContext, role: Role, account: AccountId) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::ManageRoles, ctx, None)?;
            p.state.access.grant(role, account)?;
            p.emit(ProtocolEvent::RoleGranted { role, account });
            Ok(())
        })
    }

    /// Revoking an attester drops their pending attestations everywhere
    pub fn revoke_role(&mut self, ctx: &CallContext, role: Role, account: AccountId) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::ManageRoles, ctx, None)?;
            p.state.access.revoke(role, account)?;
            p.emit(ProtocolEvent::RoleRevoked { role, account });

            if role == Role::Attester {
                for qc in p.state.oracle.purge_attester(&account) {
                    p.emit(ProtocolEvent::AttestationsPurged { qc, count: 1 });
                }
            }
            Ok(())
        })
    }

    pub fn has_role(&self, role: Role, account: &AccountId) -> bool {
        self.state.access.has_role(role, account)
    }

    // =========================================================================
    // Reserve oracle
    // =========================================================================

    /// Returns the consensus balance when this submission completed a round
    pub fn submit_attestation(
        &mut self,
        ctx: &CallContext,
        qc: AccountId,
        balance: u128,
    ) -> Result<Option<u64>> {
        self.transact(|p| {
            p.authorize(Operation::SubmitAttestation, ctx, None)?;

            let ProtocolState { access, oracle, .. } = &mut p.state;
            let outcome = oracle.submit_attestation(qc, ctx.caller, balance, ctx.now, |a| {
                access.has_role(Role::Attester, a)
            })?;

            if outcome.purged > 0 {
                p.emit(ProtocolEvent::AttestationsPurged {
                    qc,
                    count: outcome.purged,
                });
            }
            p.emit(ProtocolEvent::AttestationSubmitted {
                qc,
                attester: ctx.caller,
                balance: balance as u64,
            });

            match outcome.consensus {
                Some((consensus, attestations)) => {
                    p.emit(ProtocolEvent::ConsensusReached {
                        qc,
                        balance: consensus,
                        attestations,
                    });
                    p.push_backing(qc, consensus, ctx.now)?;
                    Ok(Some(consensus))
                }
                None => Ok(None),
            }
        })
    }

    /// Finalize a round that already holds a quorum
    pub fn record_consensus_attestation(&mut self, ctx: &CallContext, qc: AccountId) -> Result<u64> {
        self.transact(|p| {
            p.authorize(Operation::RecordConsensusAttestation, ctx, None)?;

            let ProtocolState { access, oracle, .. } = &mut p.state;
            let (consensus, attestations) =
                oracle.try_finalize(qc, ctx.now, |a| access.has_role(Role::Attester, a))?;

            p.emit(ProtocolEvent::ConsensusReached {
                qc,
                balance: consensus,
                attestations,
            });
            p.push_backing(qc, consensus, ctx.now)?;
            Ok(consensus)
        })
    }

    pub fn override_attestation(&mut self, ctx: &CallContext, qc: AccountId, balance: u128) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::OverrideAttestation, ctx, None)?;
            let previous = p.state.oracle.override_attestation(qc, balance, ctx.now)?;
            let balance = balance as u64;
            p.emit(ProtocolEvent::AttestationOverridden {
                qc,
                previous,
                balance,
            });
            p.push_backing(qc, balance, ctx.now)
        })
    }

    pub fn emergency_set_reserve(&mut self, ctx: &CallContext, qc: AccountId, balance: u128) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::EmergencySetReserve, ctx, None)?;
            let previous = p.state.oracle.emergency_set_reserve(qc, balance, ctx.now)?;
            let balance = balance as u64;
            p.emit(ProtocolEvent::EmergencyReserveSet {
                qc,
                previous,
                balance,
            });
            p.push_backing(qc, balance, ctx.now)
        })
    }

    pub fn reset_consensus(&mut self, ctx: &CallContext, qc: AccountId) -> Result<usize> {
        self.transact(|p| {
            p.authorize(Operation::ResetConsensus, ctx, None)?;
            let discarded = p.state.oracle.reset_consensus(&qc)?;
            p.emit(ProtocolEvent::ConsensusReset { qc, discarded });
            Ok(discarded)
        })
    }

    pub fn set_consensus_threshold(&mut self, ctx: &CallContext, threshold: usize) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::SetOracleParameters, ctx, None)?;
            Ok(p.state.oracle.set_consensus_threshold(threshold)?)
        })
    }

    pub fn set_attestation_timeout(&mut self, ctx: &CallContext, timeout: u64) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::SetOracleParameters, ctx, None)?;
            Ok(p.state.oracle.set_attestation_timeout(timeout)?)
        })
    }

    /// Also bounds how old ledger backing may be at mint time
    pub fn set_staleness_threshold(&mut self, ctx: &CallContext, threshold: u64) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::SetOracleParameters, ctx, None)?;
            p.state.oracle.set_staleness_threshold(threshold)?;
            p.state.ledger.set_max_backing_age(threshold);
            Ok(())
        })
    }

    pub fn get_reserve_balance_and_staleness(&self, qc: &AccountId, now: u64) -> (u64, bool) {
        self.state.oracle.get_reserve_balance_and_staleness(qc, now)
    }

    pub fn pending_attestation_count(&self, qc: &AccountId, now: u64) -> usize {
        self.state.oracle.pending_attestation_count(qc, now)
    }

    pub fn attestation_record(&self, qc: &AccountId) -> Option<&ReserveAttestationRecord> {
        self.state.oracle.record(qc)
    }

    // =========================================================================
    // Custodian status
    // =========================================================================

    pub fn set_qc_status(
        &mut self,
        ctx: &CallContext,
        qc: AccountId,
        status: QcStatus,
        reason: StatusChangeReason,
    ) -> Result<QcStatus> {
        self.transact(|p| {
            p.authorize(Operation::SetQcStatus, ctx, None)?;
            p.apply_status(qc, status, reason, ctx.now)
        })
    }

    pub fn register_wallet(&mut self, ctx: &CallContext, qc: AccountId, wallet: &str) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::RegisterWallet, ctx, None)?;
            p.decoder.decode(wallet)?;
            p.state.qc_state.register_wallet(&qc, wallet.to_string())?;
            p.emit(ProtocolEvent::WalletRegistered {
                qc,
                wallet: wallet.to_string(),
            });
            Ok(())
        })
    }

    pub fn deregister_wallet(&mut self, ctx: &CallContext, qc: AccountId, wallet: &str) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::DeregisterWallet, ctx, None)?;
            p.state.qc_state.deregister_wallet(&qc, wallet)?;
            p.emit(ProtocolEvent::WalletDeregistered {
                qc,
                wallet: wallet.to_string(),
            });
            Ok(())
        })
    }

    pub fn qc_status(&self, qc: &AccountId) -> Option<QcStatus> {
        self.state.qc_state.status(qc)
    }

    pub fn qc_record(&self, qc: &AccountId) -> Option<&QcRecord> {
        self.state.qc_state.record(qc)
    }

    // =========================================================================
    // Pause credits
    // =========================================================================

    /// The calling custodian halts itself. Returns the pause end time.
    pub fn use_emergency_pause(&mut self, ctx: &CallContext, reason: &str) -> Result<u64> {
        self.transact(|p| {
            let qc = ctx.caller;
            p.authorize(Operation::UseEmergencyPause, ctx, Some(&qc))?;

            let status = p.state.qc_state.require_status(&qc)?;
            let earliest = p.state.redemptions.get_earliest_redemption_deadline(&qc);
            let pause_end_time =
                p.state
                    .pause_credits
                    .use_emergency_pause(&qc, reason, status, earliest, ctx.now)?;

            p.emit(ProtocolEvent::EmergencyPauseUsed {
                qc,
                reason: reason.to_string(),
                pause_end_time,
            });
            p.apply_status(qc, QcStatus::Paused, StatusChangeReason::SelfPause, ctx.now)?;
            Ok(pause_end_time)
        })
    }

    /// Permissionless close of an elapsed pause window
    pub fn resume_if_expired(&mut self, ctx: &CallContext, qc: AccountId) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::ResumeIfExpired, ctx, Some(&qc))?;
            p.state.pause_credits.resume_if_expired(&qc, ctx.now)?;
            p.emit(ProtocolEvent::PauseEnded { qc, early: false });
            p.reactivate(qc, StatusChangeReason::PauseExpired, ctx.now)
        })
    }

    pub fn resume_early(&mut self, ctx: &CallContext, qc: AccountId) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::ResumeEarly, ctx, Some(&qc))?;
            p.state.pause_credits.resume_early(&qc)?;
            p.emit(ProtocolEvent::PauseEnded { qc, early: true });
            p.reactivate(qc, StatusChangeReason::PauseResumedEarly, ctx.now)
        })
    }

    pub fn renew_pause_credit(&mut self, ctx: &CallContext, qc: AccountId) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::RenewPauseCredit, ctx, Some(&qc))?;
            let status = p.state.qc_state.require_status(&qc)?;
            p.state.pause_credits.renew_pause_credit(&qc, status, ctx.now)?;
            p.emit(ProtocolEvent::PauseCreditRenewed { qc });
            Ok(())
        })
    }

    pub fn emergency_clear_pause(&mut self, ctx: &CallContext, qc: AccountId) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::EmergencyClearPause, ctx, Some(&qc))?;
            p.state.pause_credits.emergency_clear_pause(&qc)?;
            p.emit(ProtocolEvent::EmergencyPauseCleared { qc });
            p.reactivate(qc, StatusChangeReason::EmergencyClear, ctx.now)
        })
    }

    pub fn emergency_restore_credit(&mut self, ctx: &CallContext, qc: AccountId) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::EmergencyRestoreCredit, ctx, Some(&qc))?;
            p.state.pause_credits.emergency_restore_credit(&qc)?;
            p.emit(ProtocolEvent::PauseCreditRestored { qc });
            Ok(())
        })
    }

    /// Paused custodians go back to Active; any other status was set by
    /// governance after the pause began and is left alone.
    fn reactivate(&mut self, qc: AccountId, reason: StatusChangeReason, now: u64) -> Result<()> {
        if self.state.qc_state.status(&qc) == Some(QcStatus::Paused) {
            self.apply_status(qc, QcStatus::Active, reason, now)?;
        }
        Ok(())
    }

    pub fn get_pause_info(&self, qc: &AccountId) -> Option<&PauseCredit> {
        self.state.pause_credits.get_pause_info(qc)
    }

    pub fn can_self_pause(&self, qc: &AccountId, now: u64) -> bool {
        match self.state.qc_state.status(qc) {
            Some(status) => self.state.pause_credits.can_self_pause(
                qc,
                status,
                self.state.redemptions.get_earliest_redemption_deadline(qc),
                now,
            ),
            None => false,
        }
    }

    pub fn expired_pauses(&self, now: u64) -> Vec<AccountId> {
        self.state.pause_credits.expired_pauses(now)
    }

    // =========================================================================
    // Reserve administration
    // =========================================================================

    /// Open a reserve, register the custodian Active and grant its pause credit
    pub fn authorize_reserve(&mut self, ctx: &CallContext, qc: AccountId, cap: u64) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::AuthorizeReserve, ctx, None)?;
            p.state.ledger.authorize_reserve(qc, cap, ctx.now)?;
            p.state.qc_state.register(qc, ctx.now)?;
            p.state.pause_credits.grant_initial_credit(qc);
            p.emit(ProtocolEvent::ReserveAuthorized { qc, cap });

            // A consensus may already exist from attestations made before authorization
            if let Some(record) = p.state.oracle.record(&qc) {
                let (balance, at) = (record.consensus_balance, record.timestamp);
                p.push_backing(qc, balance, at)?;
            }
            Ok(())
        })
    }

    pub fn deauthorize_reserve(&mut self, ctx: &CallContext, qc: AccountId) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::DeauthorizeReserve, ctx, None)?;
            if p.state.redemptions.has_unfulfilled_redemptions(&qc) {
                return Err(LedgerError::UnfulfilledRedemptions(qc).into());
            }
            p.state.ledger.deauthorize_reserve(&qc)?;
            p.state.qc_state.remove(&qc);
            p.state.pause_credits.remove(&qc);
            p.state.oracle.remove_custodian(&qc);
            p.emit(ProtocolEvent::ReserveDeauthorized { qc });
            Ok(())
        })
    }

    pub fn set_minting_cap(&mut self, ctx: &CallContext, qc: AccountId, cap: u64) -> Result<u64> {
        self.transact(|p| {
            p.authorize(Operation::SetMintingCap, ctx, None)?;
            let previous = p.state.ledger.set_minting_cap(&qc, cap)?;
            p.emit(ProtocolEvent::MintingCapUpdated { qc, previous, cap });
            Ok(previous)
        })
    }

    pub fn set_backing(&mut self, ctx: &CallContext, qc: AccountId, backing: u64) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::SetBacking, ctx, None)?;
            let previous = p.state.ledger.set_backing(&qc, backing, ctx.now)?;
            p.emit(ProtocolEvent::BackingUpdated {
                qc,
                previous,
                backing,
            });
            Ok(())
        })
    }

    pub fn batch_set_backing(&mut self, ctx: &CallContext, updates: &[(AccountId, u64)]) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::SetBacking, ctx, None)?;
            let previous: Vec<u64> = updates
                .iter()
                .map(|(qc, _)| p.state.ledger.backing(qc))
                .collect();
            p.state.ledger.batch_set_backing(updates, ctx.now)?;
            for ((qc, backing), previous) in updates.iter().zip(previous) {
                p.emit(ProtocolEvent::BackingUpdated {
                    qc: *qc,
                    previous,
                    backing: *backing,
                });
            }
            Ok(())
        })
    }

    // =========================================================================
    // Mint / redeem
    // =========================================================================

    /// Mint `amount` token base units against `qc`'s reserve. Returns the
    /// satoshis accounted.
    pub fn mint(
        &mut self,
        ctx: &CallContext,
        qc: AccountId,
        recipient: AccountId,
        amount: u128,
    ) -> Result<u64> {
        self.transact(|p| {
            p.authorize(Operation::Mint, ctx, Some(&qc))?;
            if recipient.is_zero() {
                return Err(LedgerError::ZeroAccount.into());
            }
            let sats = tokens_to_sats(amount)?;

            p.state.ledger.mint(&qc, sats, ctx.now)?;
            p.emit(ProtocolEvent::Minted {
                qc,
                recipient,
                amount_sats: sats,
            });

            p.interact(|token| token.mint(&recipient, amount))?;
            Ok(sats)
        })
    }

    /// The custodian burns its own tokens against its reserve
    pub fn redeem(&mut self, ctx: &CallContext, qc: AccountId, amount: u128) -> Result<u64> {
        self.transact(|p| {
            p.authorize(Operation::Redeem, ctx, Some(&qc))?;
            let sats = tokens_to_sats(amount)?;

            p.notify_redemption(qc, sats)?;
            p.emit(ProtocolEvent::Redeemed {
                qc,
                amount_sats: sats,
            });

            p.interact(|token| token.burn(&ctx.caller, amount))?;
            Ok(sats)
        })
    }

    fn notify_redemption(&mut self, qc: AccountId, sats: u64) -> Result<()> {
        Ok(self.state.ledger.redeem(&qc, sats)?)
    }

    pub fn pause(&mut self, ctx: &CallContext, scope: PauseScope) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::Pause, ctx, None)?;
            p.state.ledger.pause(scope)?;
            p.emit(ProtocolEvent::Paused {
                scope,
                by: ctx.caller,
            });
            Ok(())
        })
    }

    pub fn unpause(&mut self, ctx: &CallContext, scope: PauseScope) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::Unpause, ctx, None)?;
            p.state.ledger.unpause(scope)?;
            p.emit(ProtocolEvent::Unpaused {
                scope,
                by: ctx.caller,
            });
            Ok(())
        })
    }

    pub fn reserve(&self, qc: &AccountId) -> Option<&Reserve> {
        self.state.ledger.reserve(qc)
    }

    pub fn backing(&self, qc: &AccountId) -> u64 {
        self.state.ledger.backing(qc)
    }

    pub fn minted(&self, qc: &AccountId) -> u64 {
        self.state.ledger.minted(qc)
    }

    pub fn minting_cap(&self, qc: &AccountId) -> u64 {
        self.state.ledger.minting_cap(qc)
    }

    pub fn total_minted(&self) -> u64 {
        self.state.ledger.total_minted()
    }

    pub fn is_reserve_authorized(&self, qc: &AccountId) -> bool {
        self.state.ledger.is_reserve_authorized(qc)
    }

    pub fn can_operate(&self, qc: &AccountId) -> bool {
        self.state.ledger.can_operate(qc)
    }

    pub fn is_undercollateralized(&self, qc: &AccountId) -> bool {
        self.state.ledger.is_undercollateralized(qc)
    }

    // =========================================================================
    // Redemptions
    // =========================================================================

    /// Burn the caller's tokens and open a redemption against `qc`
    pub fn request_redemption(
        &mut self,
        ctx: &CallContext,
        qc: AccountId,
        amount: u128,
        btc_address: &str,
    ) -> Result<Redemption> {
        self.transact(|p| {
            p.authorize(Operation::RequestRedemption, ctx, None)?;

            let status = p.state.qc_state.require_status(&qc)?;
            if !status.can_fulfill() {
                return Err(StatusError::StatusForbids { qc, status }.into());
            }
            let sats = tokens_to_sats(amount)?;
            RedemptionManager::validate_amount(sats)?;
            p.decoder.decode(btc_address)?;

            p.notify_redemption(qc, sats)?;
            let redemption =
                p.state
                    .redemptions
                    .create(ctx.caller, qc, sats, btc_address, ctx.now)?;
            p.emit(ProtocolEvent::RedemptionRequested {
                id: redemption.id,
                requester: ctx.caller,
                qc,
                amount_sats: sats,
                btc_address: btc_address.to_string(),
                deadline: redemption.deadline,
            });

            p.interact(|token| token.burn(&ctx.caller, amount))?;
            Ok(redemption)
        })
    }

    /// Resolve a redemption with an SPV-proven Bitcoin payment
    pub fn record_fulfillment(
        &mut self,
        ctx: &CallContext,
        id: RedemptionId,
        btc_address: &str,
        expected_amount: u64,
        tx_info: &BitcoinTxInfo,
        proof: &SpvProof,
    ) -> Result<Fulfillment> {
        self.transact(|p| {
            p.authorize(Operation::RecordFulfillment, ctx, None)?;

            let relay = Arc::clone(&p.relay);
            let decoder = Arc::clone(&p.decoder);
            let fulfillment = p.state.redemptions.record_fulfillment(
                &id,
                btc_address,
                expected_amount,
                tx_info,
                proof,
                relay.as_ref(),
                decoder.as_ref(),
                ctx.now,
            )?;

            p.emit(ProtocolEvent::RedemptionFulfilled {
                id,
                txid: fulfillment.txid.clone(),
                paid_sats: fulfillment.paid_sats,
            });
            Ok(fulfillment)
        })
    }

    /// Mark an overdue redemption defaulted and put the custodian under review
    pub fn flag_default(&mut self, ctx: &CallContext, id: RedemptionId, reason: &str) -> Result<Redemption> {
        self.transact(|p| {
            p.authorize(Operation::FlagDefault, ctx, None)?;
            let redemption = p.state.redemptions.flag_default(&id, reason, ctx.now)?;
            p.emit(ProtocolEvent::RedemptionDefaulted {
                id,
                qc: redemption.qc,
                reason: reason.to_string(),
            });

            match p.state.qc_state.status(&redemption.qc) {
                Some(QcStatus::UnderReview) | Some(QcStatus::Revoked) | None => {}
                Some(_) => {
                    p.apply_status(
                        redemption.qc,
                        QcStatus::UnderReview,
                        StatusChangeReason::RedemptionDefault,
                        ctx.now,
                    )?;
                }
            }
            Ok(redemption)
        })
    }

    pub fn set_redemption_timeout(&mut self, ctx: &CallContext, timeout: u64) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::SetRedemptionParameters, ctx, None)?;
            Ok(p.state.redemptions.set_redemption_timeout(timeout)?)
        })
    }

    pub fn set_tx_proof_difficulty_factor(&mut self, ctx: &CallContext, factor: u64) -> Result<()> {
        self.transact(|p| {
            p.authorize(Operation::SetRedemptionParameters, ctx, None)?;
            Ok(p.state.redemptions.set_difficulty_factor(factor)?)
        })
    }

    pub fn get_redemption(&self, id: &RedemptionId) -> Result<&Redemption> {
        self.state
            .redemptions
            .get_redemption(id)
            .ok_or_else(|| RedemptionError::NotFound(*id).into())
    }

    pub fn get_earliest_redemption_deadline(&self, qc: &AccountId) -> Option<u64> {
        self.state.redemptions.get_earliest_redemption_deadline(qc)
    }

    pub fn has_unfulfilled_redemptions(&self, qc: &AccountId) -> bool {
        self.state.redemptions.has_unfulfilled_redemptions(qc)
    }

    pub fn overdue_redemptions(&self, now: u64) -> Vec<RedemptionId> {
        self.state.redemptions.overdue(now)
    }

    pub fn redemption_stats(&self) -> RedemptionStats {
        self.state.redemptions.stats()
    }
}
