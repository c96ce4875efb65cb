//! Pause Credits
//!
//! Each custodian holds one renewable right to halt itself for a bounded
//! window. A pause may not be used to step over an imminent redemption
//! deadline, and expiry only takes effect when someone submits
//! `resume_if_expired`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::qc_state::QcStatus;
use crate::types::AccountId;

/// Pause timing parameters, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseConfig {
    pub pause_duration: u64,
    pub min_redemption_buffer: u64,
    pub renewal_period: u64,
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            pause_duration: 48 * 3600,
            min_redemption_buffer: 8 * 3600,
            renewal_period: 90 * 24 * 3600,
        }
    }
}

/// Per-custodian pause credit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseCredit {
    pub has_credit: bool,
    pub last_used: Option<u64>,
    /// Earliest time a consumed credit may be renewed
    pub credit_renew_time: u64,
    pub is_paused: bool,
    pub pause_end_time: u64,
    pub reason: String,
}

/// Pause errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PauseError {
    #[error("custodian {0} has no pause credit record")]
    UnknownCustodian(AccountId),

    #[error("no pause credit available")]
    NoCreditAvailable,

    #[error("custodian already paused")]
    AlreadyPaused,

    #[error("custodian is not paused")]
    NotPaused,

    #[error("pause ends at {pause_end_time}")]
    PauseNotExpired { pause_end_time: u64 },

    #[error("custodian must be active, is {0}")]
    QcNotActive(QcStatus),

    #[error("redemption deadline {deadline} falls within pause window ending {window_end}")]
    WouldBreachRedemptionDeadline { deadline: u64, window_end: u64 },

    #[error("pause reason must not be empty")]
    EmptyReason,

    #[error("credit renewal available at {renew_time}")]
    RenewalPeriodNotElapsed { renew_time: u64 },

    #[error("pause credit already available")]
    CreditAlreadyAvailable,
}

impl PauseError {
    pub fn code(&self) -> &'static str {
        match self {
            PauseError::UnknownCustodian(_) => "UNKNOWN_CUSTODIAN",
            PauseError::NoCreditAvailable => "NO_CREDIT_AVAILABLE",
            PauseError::AlreadyPaused => "ALREADY_PAUSED",
            PauseError::NotPaused => "NOT_PAUSED",
            PauseError::PauseNotExpired { .. } => "PAUSE_NOT_EXPIRED",
            PauseError::QcNotActive(_) => "QC_NOT_ACTIVE",
            PauseError::WouldBreachRedemptionDeadline { .. } => "WOULD_BREACH_REDEMPTION_DEADLINE",
            PauseError::EmptyReason => "EMPTY_REASON",
            PauseError::RenewalPeriodNotElapsed { .. } => "RENEWAL_PERIOD_NOT_ELAPSED",
            PauseError::CreditAlreadyAvailable => "CREDIT_ALREADY_AVAILABLE",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PauseCreditManager {
    config: PauseConfig,
    credits: BTreeMap<AccountId, PauseCredit>,
}

impl PauseCreditManager {
    pub fn new(config: PauseConfig) -> Self {
        Self {
            config,
            credits: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &PauseConfig {
        &self.config
    }

    /// Initial credit on authorization
    pub fn grant_initial_credit(&mut self, qc: AccountId) {
        self.credits.insert(
            qc,
            PauseCredit {
                has_credit: true,
                ..PauseCredit::default()
            },
        );
    }

    pub fn remove(&mut self, qc: &AccountId) {
        self.credits.remove(qc);
    }

    pub fn get_pause_info(&self, qc: &AccountId) -> Option<&PauseCredit> {
        self.credits.get(qc)
    }

    fn credit_mut(&mut self, qc: &AccountId) -> Result<&mut PauseCredit, PauseError> {
        self.credits
            .get_mut(qc)
            .ok_or(PauseError::UnknownCustodian(*qc))
    }

    /// Explain why a self-pause would be refused
    pub fn check_self_pause(
        &self,
        qc: &AccountId,
        status: QcStatus,
        earliest_deadline: Option<u64>,
        now: u64,
    ) -> Result<(), PauseError> {
        let credit = self
            .credits
            .get(qc)
            .ok_or(PauseError::UnknownCustodian(*qc))?;

        if credit.is_paused {
            return Err(PauseError::AlreadyPaused);
        }
        if !credit.has_credit {
            return Err(PauseError::NoCreditAvailable);
        }
        if status != QcStatus::Active {
            return Err(PauseError::QcNotActive(status));
        }
        if let Some(deadline) = earliest_deadline {
            let window_end = now
                .saturating_add(self.config.pause_duration)
                .saturating_add(self.config.min_redemption_buffer);
            if deadline <= window_end {
                return Err(PauseError::WouldBreachRedemptionDeadline {
                    deadline,
                    window_end,
                });
            }
        }
        Ok(())
    }

    pub fn can_self_pause(
        &self,
        qc: &AccountId,
        status: QcStatus,
        earliest_deadline: Option<u64>,
        now: u64,
    ) -> bool {
        self.check_self_pause(qc, status, earliest_deadline, now).is_ok()
    }

    /// Consume the credit and open a pause window. Returns the window end.
    pub fn use_emergency_pause(
        &mut self,
        qc: &AccountId,
        reason: &str,
        status: QcStatus,
        earliest_deadline: Option<u64>,
        now: u64,
    ) -> Result<u64, PauseError> {
        if reason.trim().is_empty() {
            return Err(PauseError::EmptyReason);
        }
        self.check_self_pause(qc, status, earliest_deadline, now)?;

        let config = self.config;
        let credit = self.credit_mut(qc)?;
        credit.has_credit = false;
        credit.last_used = Some(now);
        credit.credit_renew_time = now.saturating_add(config.renewal_period);
        credit.is_paused = true;
        credit.pause_end_time = now.saturating_add(config.pause_duration);
        credit.reason = reason.to_string();

        Ok(credit.pause_end_time)
    }

    /// Close an elapsed pause window
    pub fn resume_if_expired(&mut self, qc: &AccountId, now: u64) -> Result<(), PauseError> {
        let credit = self.credit_mut(qc)?;
        if !credit.is_paused {
            return Err(PauseError::NotPaused);
        }
        if now < credit.pause_end_time {
            return Err(PauseError::PauseNotExpired {
                pause_end_time: credit.pause_end_time,
            });
        }
        clear(credit);
        Ok(())
    }

    /// The custodian ends its own pause before the window closes
    pub fn resume_early(&mut self, qc: &AccountId) -> Result<(), PauseError> {
        let credit = self.credit_mut(qc)?;
        if !credit.is_paused {
            return Err(PauseError::NotPaused);
        }
        clear(credit);
        Ok(())
    }

    pub fn renew_pause_credit(
        &mut self,
        qc: &AccountId,
        status: QcStatus,
        now: u64,
    ) -> Result<(), PauseError> {
        let credit = self.credit_mut(qc)?;
        if credit.has_credit {
            return Err(PauseError::CreditAlreadyAvailable);
        }
        if now < credit.credit_renew_time {
            return Err(PauseError::RenewalPeriodNotElapsed {
                renew_time: credit.credit_renew_time,
            });
        }
        if status != QcStatus::Active {
            return Err(PauseError::QcNotActive(status));
        }
        credit.has_credit = true;
        Ok(())
    }

    /// Emergency council escape hatch, regardless of expiry
    pub fn emergency_clear_pause(&mut self, qc: &AccountId) -> Result<(), PauseError> {
        let credit = self.credit_mut(qc)?;
        if !credit.is_paused {
            return Err(PauseError::NotPaused);
        }
        clear(credit);
        Ok(())
    }

    pub fn emergency_restore_credit(&mut self, qc: &AccountId) -> Result<(), PauseError> {
        let credit = self.credit_mut(qc)?;
        if credit.has_credit {
            return Err(PauseError::CreditAlreadyAvailable);
        }
        credit.has_credit = true;
        credit.credit_renew_time = 0;
        Ok(())
    }

    /// Custodians whose pause window has elapsed but not been closed
    pub fn expired_pauses(&self, now: u64) -> Vec<AccountId> {
        self.credits
            .iter()
            .filter(|(_, c)| c.is_paused && now >= c.pause_end_time)
            .map(|(qc, _)| *qc)
            .collect()
    }
}

fn clear(credit: &mut PauseCredit) {
    credit.is_paused = false;
    credit.pause_end_time = 0;
    credit.reason.clear();
}
