//! Redemption Manager
//!
//! Owns redemption requests and resolves them either by SPV-proven
//! payment or by default after the deadline. Every output credited to a
//! fulfillment is recorded so one Bitcoin payment cannot settle two
//! redemptions.

use borsh::BorshSerialize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use super::types::{Fulfillment, Redemption, RedemptionConfig, RedemptionStats, RedemptionStatus};
use crate::spv::{
    match_payment, BitcoinAddressDecoder, BitcoinHeaderRelay, BitcoinTxInfo, OutputRef, SpvConfig,
    SpvError, SpvProof, SpvVerifier,
};
use crate::spv::merkle::sha256;
use crate::types::{AccountId, RedemptionId, DUST_THRESHOLD_SATS};

/// Redemption errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedemptionError {
    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("amount {amount} below dust threshold {dust}")]
    BelowDust { amount: u64, dust: u64 },

    #[error("redemption {0} not found")]
    NotFound(RedemptionId),

    #[error("redemption {id} is {status}")]
    NotPending {
        id: RedemptionId,
        status: RedemptionStatus,
    },

    #[error("address does not match the redemption request")]
    AddressMismatch,

    #[error("expected amount {provided} does not match requested {requested}")]
    AmountMismatch { provided: u64, requested: u64 },

    #[error("transaction pays {paid} sats, {expected} required")]
    InsufficientPayment { paid: u64, expected: u64 },

    #[error("matching outputs of {txid} already fulfilled another redemption")]
    OutputsAlreadyConsumed { txid: String },

    #[error("deadline {deadline} not reached")]
    DeadlineNotReached { deadline: u64 },

    #[error("default reason must not be empty")]
    EmptyReason,

    #[error("redemption timeout must be non-zero")]
    InvalidTimeout,

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Spv(#[from] SpvError),
}

impl RedemptionError {
    pub fn code(&self) -> &'static str {
        match self {
            RedemptionError::ZeroAmount => "ZERO_AMOUNT",
            RedemptionError::BelowDust { .. } => "BELOW_DUST",
            RedemptionError::NotFound(_) => "REDEMPTION_NOT_FOUND",
            RedemptionError::NotPending { .. } => "REDEMPTION_NOT_PENDING",
            RedemptionError::AddressMismatch => "ADDRESS_MISMATCH",
            RedemptionError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            RedemptionError::InsufficientPayment { .. } => "INSUFFICIENT_PAYMENT",
            RedemptionError::OutputsAlreadyConsumed { .. } => "OUTPUTS_ALREADY_CONSUMED",
            RedemptionError::DeadlineNotReached { .. } => "DEADLINE_NOT_REACHED",
            RedemptionError::EmptyReason => "EMPTY_REASON",
            RedemptionError::InvalidTimeout => "INVALID_REDEMPTION_TIMEOUT",
            RedemptionError::Encoding(_) => "ENCODING_ERROR",
            RedemptionError::Spv(e) => e.code(),
        }
    }
}

#[derive(BorshSerialize)]
struct RedemptionIdPreimage<'a> {
    requester: &'a AccountId,
    qc: &'a AccountId,
    amount_sats: u64,
    btc_address: &'a str,
    nonce: u64,
}

/// Redemption store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedemptionManager {
    config: RedemptionConfig,
    spv: SpvVerifier,
    redemptions: BTreeMap<RedemptionId, Redemption>,
    consumed_outputs: BTreeSet<OutputRef>,
    nonce: u64,
}

impl RedemptionManager {
    pub fn new(config: RedemptionConfig, spv: SpvConfig) -> Self {
        Self {
            config,
            spv: SpvVerifier::new(spv),
            ..Self::default()
        }
    }

    pub fn config(&self) -> &RedemptionConfig {
        &self.config
    }

    pub fn verifier(&self) -> &SpvVerifier {
        &self.spv
    }

    pub fn set_redemption_timeout(&mut self, timeout: u64) -> Result<(), RedemptionError> {
        if timeout == 0 {
            return Err(RedemptionError::InvalidTimeout);
        }
        self.config.redemption_timeout = timeout;
        Ok(())
    }

    pub fn set_difficulty_factor(&mut self, factor: u64) -> Result<(), RedemptionError> {
        Ok(self.spv.set_difficulty_factor(factor)?)
    }

    /// Validate a requested amount before any state changes
    pub fn validate_amount(amount_sats: u64) -> Result<(), RedemptionError> {
        if amount_sats == 0 {
            return Err(RedemptionError::ZeroAmount);
        }
        if amount_sats < DUST_THRESHOLD_SATS {
            return Err(RedemptionError::BelowDust {
                amount: amount_sats,
                dust: DUST_THRESHOLD_SATS,
            });
        }
        Ok(())
    }

    /// Create a pending redemption. The caller has already checked the
    /// custodian's status and decoded the address.
    pub fn create(
        &mut self,
        requester: AccountId,
        qc: AccountId,
        amount_sats: u64,
        btc_address: &str,
        now: u64,
    ) -> Result<Redemption, RedemptionError> {
        Self::validate_amount(amount_sats)?;

        let preimage = RedemptionIdPreimage {
            requester: &requester,
            qc: &qc,
            amount_sats,
            btc_address,
            nonce: self.nonce,
        };
        let encoded =
            borsh::to_vec(&preimage).map_err(|e| RedemptionError::Encoding(e.to_string()))?;
        let id = RedemptionId(sha256(&encoded));
        self.nonce += 1;

        let redemption = Redemption {
            id,
            requester,
            qc,
            amount_sats,
            btc_address: btc_address.to_string(),
            requested_at: now,
            deadline: now.saturating_add(self.config.redemption_timeout),
            status: RedemptionStatus::Pending,
            fulfillment: None,
            default_reason: None,
        };
        self.redemptions.insert(id, redemption.clone());

        Ok(redemption)
    }

    fn pending_mut(&mut self, id: &RedemptionId) -> Result<&mut Redemption, RedemptionError> {
        let redemption = self
            .redemptions
            .get_mut(id)
            .ok_or(RedemptionError::NotFound(*id))?;
        if !redemption.is_pending() {
            return Err(RedemptionError::NotPending {
                id: *id,
                status: redemption.status,
            });
        }
        Ok(redemption)
    }

    /// Resolve a redemption with an SPV-proven payment
    #[allow(clippy::too_many_arguments)]
    pub fn record_fulfillment(
        &mut self,
        id: &RedemptionId,
        btc_address: &str,
        expected_amount: u64,
        tx_info: &BitcoinTxInfo,
        proof: &SpvProof,
        relay: &dyn BitcoinHeaderRelay,
        decoder: &dyn BitcoinAddressDecoder,
        now: u64,
    ) -> Result<Fulfillment, RedemptionError> {
        let redemption = self.pending_mut(id)?;
        if redemption.btc_address != btc_address {
            return Err(RedemptionError::AddressMismatch);
        }
        if redemption.amount_sats != expected_amount {
            return Err(RedemptionError::AmountMismatch {
                provided: expected_amount,
                requested: redemption.amount_sats,
            });
        }

        let destination = decoder.decode(btc_address)?;
        let verified = self.spv.verify(relay, tx_info, proof)?;
        let txid = verified.txid.to_string();

        let consumed = &self.consumed_outputs;
        let payment = match_payment(
            &verified.transaction.output,
            &destination.script_pubkey,
            |vout| {
                consumed.contains(&OutputRef {
                    txid: txid.clone(),
                    vout,
                })
            },
        );

        if payment.total_sats < expected_amount {
            if !payment.consumed.is_empty() {
                return Err(RedemptionError::OutputsAlreadyConsumed { txid });
            }
            return Err(RedemptionError::InsufficientPayment {
                paid: payment.total_sats,
                expected: expected_amount,
            });
        }

        for vout in &payment.outputs {
            self.consumed_outputs.insert(OutputRef {
                txid: txid.clone(),
                vout: *vout,
            });
        }

        let fulfillment = Fulfillment {
            txid,
            outputs: payment.outputs,
            paid_sats: payment.total_sats,
            fulfilled_at: now,
        };

        let redemption = self.pending_mut(id)?;
        redemption.status = RedemptionStatus::Fulfilled;
        redemption.fulfillment = Some(fulfillment.clone());

        Ok(fulfillment)
    }

    /// Resolve an overdue redemption as defaulted
    pub fn flag_default(
        &mut self,
        id: &RedemptionId,
        reason: &str,
        now: u64,
    ) -> Result<Redemption, RedemptionError> {
        if reason.trim().is_empty() {
            return Err(RedemptionError::EmptyReason);
        }
        let redemption = self.pending_mut(id)?;
        if now <= redemption.deadline {
            return Err(RedemptionError::DeadlineNotReached {
                deadline: redemption.deadline,
            });
        }

        redemption.status = RedemptionStatus::Defaulted;
        redemption.default_reason = Some(reason.to_string());
        Ok(redemption.clone())
    }

    pub fn get_redemption(&self, id: &RedemptionId) -> Option<&Redemption> {
        self.redemptions.get(id)
    }

    pub fn redemptions(&self) -> impl Iterator<Item = &Redemption> {
        self.redemptions.values()
    }

    pub fn get_earliest_redemption_deadline(&self, qc: &AccountId) -> Option<u64> {
        self.redemptions
            .values()
            .filter(|r| r.qc == *qc && r.is_pending())
            .map(|r| r.deadline)
            .min()
    }

    pub fn has_unfulfilled_redemptions(&self, qc: &AccountId) -> bool {
        self.redemptions
            .values()
            .any(|r| r.qc == *qc && r.is_pending())
    }

    pub fn overdue(&self, now: u64) -> Vec<RedemptionId> {
        self.redemptions
            .values()
            .filter(|r| r.is_overdue(now))
            .map(|r| r.id)
            .collect()
    }

    pub fn stats(&self) -> RedemptionStats {
        let mut stats = RedemptionStats::default();
        for r in self.redemptions.values() {
            stats.total_requests += 1;
            match r.status {
                RedemptionStatus::Pending => {
                    stats.pending += 1;
                    stats.pending_sats = stats.pending_sats.saturating_add(r.amount_sats);
                }
                RedemptionStatus::Fulfilled => stats.fulfilled += 1,
                RedemptionStatus::Defaulted => stats.defaulted += 1,
            }
        }
        stats
    }
}
