//! Common Error Types
//!
//! Every component has its own error enum with a stable `code()`.
//! [`ProtocolError`] is the single error returned by protocol entry points
//! and groups those codes into classes that callers can act on.

use serde::Serialize;
use thiserror::Error;

use crate::access::AccessError;
use crate::account_control::LedgerError;
use crate::oracle::OracleError;
use crate::pause_credit::PauseError;
use crate::qc_state::StatusError;
use crate::redemption::RedemptionError;
use crate::spv::SpvError;
use crate::token::TokenError;
use crate::types::{IdentityError, UnitError};

/// Broad failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed or out-of-range input
    Validation,
    /// Missing capability, wrong status, or paused
    Authorization,
    /// Would break an accounting rule
    Consistency,
    /// Bitcoin proof rejected
    Proof,
    /// Unknown entity
    NotFound,
    /// Collaborator or runtime failure
    Operational,
}

/// Root error type for protocol entry points
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Pause(#[from] PauseError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Redemption(#[from] RedemptionError),

    #[error(transparent)]
    Spv(#[from] SpvError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A protocol entry point was invoked while another was executing
    #[error("reentrant call rejected")]
    Reentrancy,
}

impl ProtocolError {
    /// Machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Access(e) => e.code(),
            ProtocolError::Oracle(e) => e.code(),
            ProtocolError::Status(e) => e.code(),
            ProtocolError::Pause(e) => e.code(),
            ProtocolError::Ledger(e) => e.code(),
            ProtocolError::Redemption(e) => e.code(),
            ProtocolError::Spv(e) => e.code(),
            ProtocolError::Token(e) => e.code(),
            ProtocolError::Unit(e) => e.code(),
            ProtocolError::Identity(_) => "INVALID_IDENTIFIER",
            ProtocolError::Reentrancy => "REENTRANCY",
        }
    }

    pub fn class(&self) -> ErrorClass {
        use ErrorClass::*;
        match self {
            ProtocolError::Access(_) => Authorization,

            ProtocolError::Oracle(e) => match e {
                OracleError::ZeroAccount
                | OracleError::BalanceOutOfRange(_)
                | OracleError::InvalidParameter(_) => Validation,
                OracleError::NoRecord(_) => NotFound,
                OracleError::DuplicateAttestation(_)
                | OracleError::TooManyPendingAttestations { .. }
                | OracleError::QuorumNotMet { .. }
                | OracleError::NothingPending(_) => Consistency,
            },

            ProtocolError::Status(e) => match e {
                StatusError::NotRegistered(_) => NotFound,
                StatusError::StatusForbids { .. } => Authorization,
                _ => Consistency,
            },

            ProtocolError::Pause(e) => match e {
                PauseError::UnknownCustodian(_) => NotFound,
                PauseError::EmptyReason => Validation,
                PauseError::QcNotActive(_) => Authorization,
                _ => Consistency,
            },

            ProtocolError::Ledger(e) => match e {
                LedgerError::ZeroAccount | LedgerError::ZeroAmount | LedgerError::InvalidCap => {
                    Validation
                }
                LedgerError::NotAuthorized(_)
                | LedgerError::SystemPaused
                | LedgerError::MintingPaused
                | LedgerError::RedemptionsPaused
                | LedgerError::ReservePaused(_)
                | LedgerError::MintingDisabled => Authorization,
                LedgerError::StaleBacking(_) => Proof,
                _ => Consistency,
            },

            ProtocolError::Redemption(e) => match e {
                RedemptionError::ZeroAmount
                | RedemptionError::BelowDust { .. }
                | RedemptionError::AddressMismatch
                | RedemptionError::AmountMismatch { .. }
                | RedemptionError::EmptyReason
                | RedemptionError::InvalidTimeout => Validation,
                RedemptionError::NotFound(_) => NotFound,
                RedemptionError::InsufficientPayment { .. }
                | RedemptionError::OutputsAlreadyConsumed { .. } => Proof,
                RedemptionError::Spv(spv) => spv_class(spv),
                RedemptionError::Encoding(_) => Operational,
                RedemptionError::NotPending { .. } | RedemptionError::DeadlineNotReached { .. } => {
                    Consistency
                }
            },

            ProtocolError::Spv(e) => spv_class(e),
            ProtocolError::Token(TokenError::InsufficientBalance { .. }) => Consistency,
            ProtocolError::Token(_) => Operational,
            ProtocolError::Unit(_) | ProtocolError::Identity(_) => Validation,
            ProtocolError::Reentrancy => Operational,
        }
    }
}

fn spv_class(e: &SpvError) -> ErrorClass {
    if e.is_address_error() || matches!(e, SpvError::InvalidDifficultyFactor) {
        ErrorClass::Validation
    } else {
        ErrorClass::Proof
    }
}

/// Result type alias using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;

    #[test]
    fn test_codes_pass_through() {
        let err: ProtocolError = LedgerError::ExceedsBacking {
            minted: 0,
            amount: 60,
            backing: 50,
        }
        .into();
        assert_eq!(err.code(), "EXCEEDS_BACKING");
        assert_eq!(err.class(), ErrorClass::Consistency);

        let err: ProtocolError = RedemptionError::Spv(SpvError::InvalidCoinbaseProof).into();
        assert_eq!(err.code(), "INVALID_COINBASE_PROOF");
        assert_eq!(err.class(), ErrorClass::Proof);
    }

    #[test]
    fn test_classes() {
        let unauthorized: ProtocolError = AccessError::ZeroAccount.into();
        assert_eq!(unauthorized.class(), ErrorClass::Authorization);

        let paused: ProtocolError = LedgerError::SystemPaused.into();
        assert_eq!(paused.class(), ErrorClass::Authorization);

        let missing: ProtocolError = StatusError::NotRegistered(AccountId::from_byte(1)).into();
        assert_eq!(missing.class(), ErrorClass::NotFound);

        let dust: ProtocolError = RedemptionError::BelowDust { amount: 1, dust: 546 }.into();
        assert_eq!(dust.class(), ErrorClass::Validation);

        assert_eq!(ProtocolError::Reentrancy.code(), "REENTRANCY");
    }
}
