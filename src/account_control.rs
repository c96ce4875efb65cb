//! Account Control Ledger
//!
//! Per-custodian minted, backing and cap accounting in satoshis.
//!
//! Invariants checked after every committed transaction:
//! - `minted <= cap` for every reserve
//! - `total_minted == sum(minted)`
//!
//! `minted <= backing` is enforced when minting. Backing is an unconditional
//! oracle feed and may later drop below minted; [`AccountControl::is_undercollateralized`]
//! reports that condition instead of rejecting the update.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::types::AccountId;

/// Ledger parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Seconds after which backing is too old to mint against
    pub max_backing_age: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_backing_age: 24 * 3600,
        }
    }
}

/// Ledger state of one authorized custodian
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub cap: u64,
    pub minted: u64,
    pub backing: u64,
    /// When backing was last written; `None` until the first feed
    pub backing_updated_at: Option<u64>,
    /// Reserve-level pause
    pub paused: bool,
    /// Mint gate pushed from the custodian's status
    pub minting_enabled: bool,
    /// Status-level pause pushed from the custodian's status
    pub status_paused: bool,
    pub authorized_at: u64,
}

impl Reserve {
    fn new(cap: u64, now: u64) -> Self {
        Self {
            cap,
            minted: 0,
            backing: 0,
            backing_updated_at: None,
            paused: false,
            minting_enabled: true,
            status_paused: false,
            authorized_at: now,
        }
    }

    pub fn is_backing_stale(&self, now: u64, max_age: u64) -> bool {
        match self.backing_updated_at {
            Some(at) => now.saturating_sub(at) > max_age,
            None => true,
        }
    }
}

/// Scope of a pause switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "qc", rename_all = "snake_case")]
pub enum PauseScope {
    System,
    Minting,
    Redemptions,
    Reserve(AccountId),
}

impl fmt::Display for PauseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseScope::System => f.write_str("system"),
            PauseScope::Minting => f.write_str("minting"),
            PauseScope::Redemptions => f.write_str("redemptions"),
            PauseScope::Reserve(qc) => write!(f, "reserve {}", qc),
        }
    }
}

/// Global pause switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPauses {
    pub system: bool,
    pub minting: bool,
    pub redemptions: bool,
}

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("zero account")]
    ZeroAccount,

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("minting cap must be non-zero")]
    InvalidCap,

    #[error("reserve {0} is not authorized")]
    NotAuthorized(AccountId),

    #[error("reserve {0} is already authorized")]
    AlreadyAuthorized(AccountId),

    #[error("system is paused")]
    SystemPaused,

    #[error("minting is paused")]
    MintingPaused,

    #[error("redemptions are paused")]
    RedemptionsPaused,

    #[error("reserve {0} is paused")]
    ReservePaused(AccountId),

    #[error("minting disabled by custodian status")]
    MintingDisabled,

    #[error("backing for {0} is stale")]
    StaleBacking(AccountId),

    #[error("mint would exceed cap: minted {minted} + {amount} > cap {cap}")]
    ExceedsCap { minted: u64, amount: u64, cap: u64 },

    #[error("mint would exceed backing: minted {minted} + {amount} > backing {backing}")]
    ExceedsBacking { minted: u64, amount: u64, backing: u64 },

    #[error("amount {amount} exceeds minted {minted}")]
    ExceedsMinted { amount: u64, minted: u64 },

    #[error("reserve {qc} still has {minted} minted")]
    OutstandingBalance { qc: AccountId, minted: u64 },

    #[error("reserve {0} has unfulfilled redemptions")]
    UnfulfilledRedemptions(AccountId),

    #[error("cap {cap} below minted {minted}")]
    CapBelowMinted { cap: u64, minted: u64 },

    #[error("{0} already paused")]
    AlreadyPaused(PauseScope),

    #[error("{0} not paused")]
    NotPaused(PauseScope),

    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::ZeroAccount => "ZERO_ACCOUNT",
            LedgerError::ZeroAmount => "ZERO_AMOUNT",
            LedgerError::InvalidCap => "INVALID_CAP",
            LedgerError::NotAuthorized(_) => "RESERVE_NOT_AUTHORIZED",
            LedgerError::AlreadyAuthorized(_) => "RESERVE_ALREADY_AUTHORIZED",
            LedgerError::SystemPaused => "SYSTEM_PAUSED",
            LedgerError::MintingPaused => "MINTING_PAUSED",
            LedgerError::RedemptionsPaused => "REDEMPTIONS_PAUSED",
            LedgerError::ReservePaused(_) => "RESERVE_PAUSED",
            LedgerError::MintingDisabled => "MINTING_DISABLED",
            LedgerError::StaleBacking(_) => "STALE_BACKING",
            LedgerError::ExceedsCap { .. } => "EXCEEDS_CAP",
            LedgerError::ExceedsBacking { .. } => "EXCEEDS_BACKING",
            LedgerError::ExceedsMinted { .. } => "EXCEEDS_MINTED",
            LedgerError::OutstandingBalance { .. } => "OUTSTANDING_BALANCE",
            LedgerError::UnfulfilledRedemptions(_) => "UNFULFILLED_REDEMPTIONS",
            LedgerError::CapBelowMinted { .. } => "CAP_BELOW_MINTED",
            LedgerError::AlreadyPaused(_) => "ALREADY_PAUSED",
            LedgerError::NotPaused(_) => "NOT_PAUSED",
            LedgerError::InvariantViolation(_) => "INVARIANT_VIOLATION",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountControl {
    config: LedgerConfig,
    reserves: BTreeMap<AccountId, Reserve>,
    total_minted: u64,
    pauses: SystemPauses,
}

impl AccountControl {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn set_max_backing_age(&mut self, max_age: u64) {
        self.config.max_backing_age = max_age;
    }

    fn reserve_mut(&mut self, qc: &AccountId) -> Result<&mut Reserve, LedgerError> {
        self.reserves
            .get_mut(qc)
            .ok_or(LedgerError::NotAuthorized(*qc))
    }

    // =========================================================================
    // Reserve administration
    // =========================================================================

    pub fn authorize_reserve(&mut self, qc: AccountId, cap: u64, now: u64) -> Result<(), LedgerError> {
        if qc.is_zero() {
            return Err(LedgerError::ZeroAccount);
        }
        if cap == 0 {
            return Err(LedgerError::InvalidCap);
        }
        if self.reserves.contains_key(&qc) {
            return Err(LedgerError::AlreadyAuthorized(qc));
        }
        self.reserves.insert(qc, Reserve::new(cap, now));
        Ok(())
    }

    pub fn deauthorize_reserve(&mut self, qc: &AccountId) -> Result<Reserve, LedgerError> {
        let reserve = self
            .reserves
            .get(qc)
            .ok_or(LedgerError::NotAuthorized(*qc))?;
        if reserve.minted != 0 {
            return Err(LedgerError::OutstandingBalance {
                qc: *qc,
                minted: reserve.minted,
            });
        }
        self.reserves
            .remove(qc)
            .ok_or(LedgerError::NotAuthorized(*qc))
    }

    /// Returns the previous cap
    pub fn set_minting_cap(&mut self, qc: &AccountId, cap: u64) -> Result<u64, LedgerError> {
        if cap == 0 {
            return Err(LedgerError::InvalidCap);
        }
        let reserve = self.reserve_mut(qc)?;
        if cap < reserve.minted {
            return Err(LedgerError::CapBelowMinted {
                cap,
                minted: reserve.minted,
            });
        }
        Ok(std::mem::replace(&mut reserve.cap, cap))
    }

    /// Push status-derived gates
    pub fn sync_status(
        &mut self,
        qc: &AccountId,
        minting_enabled: bool,
        status_paused: bool,
    ) -> Result<(), LedgerError> {
        let reserve = self.reserve_mut(qc)?;
        reserve.minting_enabled = minting_enabled;
        reserve.status_paused = status_paused;
        Ok(())
    }

    // =========================================================================
    // Backing feed
    // =========================================================================

    /// Unconditional overwrite; allowed while paused
    pub fn set_backing(&mut self, qc: &AccountId, backing: u64, now: u64) -> Result<u64, LedgerError> {
        let reserve = self.reserve_mut(qc)?;
        reserve.backing_updated_at = Some(now);
        Ok(std::mem::replace(&mut reserve.backing, backing))
    }

    /// All-or-nothing batch overwrite
    pub fn batch_set_backing(&mut self, updates: &[(AccountId, u64)], now: u64) -> Result<(), LedgerError> {
        if let Some((qc, _)) = updates.iter().find(|(qc, _)| !self.reserves.contains_key(qc)) {
            return Err(LedgerError::NotAuthorized(*qc));
        }
        for (qc, backing) in updates {
            self.set_backing(qc, *backing, now)?;
        }
        Ok(())
    }

    // =========================================================================
    // Mint / redeem
    // =========================================================================

    /// Gate and account a mint of `amount` satoshis
    pub fn mint(&mut self, qc: &AccountId, amount: u64, now: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let pauses = self.pauses;
        let max_age = self.config.max_backing_age;
        let reserve = self.reserve_mut(qc)?;

        if pauses.system {
            return Err(LedgerError::SystemPaused);
        }
        if pauses.minting {
            return Err(LedgerError::MintingPaused);
        }
        if reserve.paused {
            return Err(LedgerError::ReservePaused(*qc));
        }
        if !reserve.minting_enabled || reserve.status_paused {
            return Err(LedgerError::MintingDisabled);
        }
        if reserve.is_backing_stale(now, max_age) {
            return Err(LedgerError::StaleBacking(*qc));
        }

        let new_minted = reserve
            .minted
            .checked_add(amount)
            .ok_or(LedgerError::ExceedsCap {
                minted: reserve.minted,
                amount,
                cap: reserve.cap,
            })?;
        if new_minted > reserve.cap {
            return Err(LedgerError::ExceedsCap {
                minted: reserve.minted,
                amount,
                cap: reserve.cap,
            });
        }
        if new_minted > reserve.backing {
            return Err(LedgerError::ExceedsBacking {
                minted: reserve.minted,
                amount,
                backing: reserve.backing,
            });
        }

        reserve.minted = new_minted;
        self.total_minted = self.total_minted.saturating_add(amount);
        Ok(())
    }

    /// Decrement minted for a burn or redemption
    pub fn redeem(&mut self, qc: &AccountId, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let pauses = self.pauses;
        let reserve = self.reserve_mut(qc)?;

        if pauses.system {
            return Err(LedgerError::SystemPaused);
        }
        if pauses.redemptions {
            return Err(LedgerError::RedemptionsPaused);
        }
        if amount > reserve.minted {
            return Err(LedgerError::ExceedsMinted {
                amount,
                minted: reserve.minted,
            });
        }

        reserve.minted -= amount;
        self.total_minted = self.total_minted.saturating_sub(amount);
        Ok(())
    }

    // =========================================================================
    // Pauses
    // =========================================================================

    pub fn pause(&mut self, scope: PauseScope) -> Result<(), LedgerError> {
        let flag = self.pause_flag(scope)?;
        if *flag {
            return Err(LedgerError::AlreadyPaused(scope));
        }
        *flag = true;
        Ok(())
    }

    pub fn unpause(&mut self, scope: PauseScope) -> Result<(), LedgerError> {
        let flag = self.pause_flag(scope)?;
        if !*flag {
            return Err(LedgerError::NotPaused(scope));
        }
        *flag = false;
        Ok(())
    }

    fn pause_flag(&mut self, scope: PauseScope) -> Result<&mut bool, LedgerError> {
        Ok(match scope {
            PauseScope::System => &mut self.pauses.system,
            PauseScope::Minting => &mut self.pauses.minting,
            PauseScope::Redemptions => &mut self.pauses.redemptions,
            PauseScope::Reserve(qc) => &mut self.reserve_mut(&qc)?.paused,
        })
    }

    pub fn pauses(&self) -> SystemPauses {
        self.pauses
    }

    pub fn redemptions_paused(&self) -> bool {
        self.pauses.system || self.pauses.redemptions
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn reserve(&self, qc: &AccountId) -> Option<&Reserve> {
        self.reserves.get(qc)
    }

    pub fn reserves(&self) -> impl Iterator<Item = (&AccountId, &Reserve)> {
        self.reserves.iter()
    }

    pub fn backing(&self, qc: &AccountId) -> u64 {
        self.reserves.get(qc).map(|r| r.backing).unwrap_or(0)
    }

    pub fn minted(&self, qc: &AccountId) -> u64 {
        self.reserves.get(qc).map(|r| r.minted).unwrap_or(0)
    }

    pub fn minting_cap(&self, qc: &AccountId) -> u64 {
        self.reserves.get(qc).map(|r| r.cap).unwrap_or(0)
    }

    pub fn total_minted(&self) -> u64 {
        self.total_minted
    }

    pub fn is_reserve_authorized(&self, qc: &AccountId) -> bool {
        self.reserves.contains_key(qc)
    }

    /// Authorized and not halted at any level
    pub fn can_operate(&self, qc: &AccountId) -> bool {
        match self.reserves.get(qc) {
            Some(r) => !self.pauses.system && !r.paused && !r.status_paused,
            None => false,
        }
    }

    pub fn is_undercollateralized(&self, qc: &AccountId) -> bool {
        self.reserves
            .get(qc)
            .map(|r| r.minted > r.backing)
            .unwrap_or(false)
    }

    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        let mut sum: u128 = 0;
        for (qc, reserve) in &self.reserves {
            if reserve.minted > reserve.cap {
                return Err(LedgerError::InvariantViolation(format!(
                    "{} minted {} above cap {}",
                    qc, reserve.minted, reserve.cap
                )));
            }
            sum += reserve.minted as u128;
        }
        if sum != self.total_minted as u128 {
            return Err(LedgerError::InvariantViolation(format!(
                "total minted {} != sum {}",
                self.total_minted, sum
            )));
        }
        Ok(())
    }
}
