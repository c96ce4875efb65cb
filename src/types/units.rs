//! Unit Conversion Utilities
//!
//! The wrapped token carries 18 decimals; the ledger accounts in satoshis.
//! Conversion from token units to satoshis is exact: any sub-satoshi
//! remainder is rejected rather than rounded, so a mint can never credit
//! more (or less) backing than the caller asked for.

use thiserror::Error;

/// Satoshis per Bitcoin
pub const SATS_PER_BTC: u64 = 100_000_000;

/// Token base units per satoshi (18 - 8 decimals)
pub const TOKEN_UNITS_PER_SAT: u128 = 10_000_000_000;

/// Minimum meaningful payment output value
pub const DUST_THRESHOLD_SATS: u64 = 546;

/// Unit conversion errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("amount {amount} is not a whole number of satoshis (remainder {remainder})")]
    NonIntegralAmount { amount: u128, remainder: u128 },

    #[error("amount {0} exceeds the satoshi ledger range")]
    Overflow(u128),
}

impl UnitError {
    pub fn code(&self) -> &'static str {
        match self {
            UnitError::NonIntegralAmount { .. } => "NON_INTEGRAL_AMOUNT",
            UnitError::Overflow(_) => "AMOUNT_OVERFLOW",
        }
    }
}

/// Convert token base units to satoshis, rejecting any remainder
pub fn tokens_to_sats(amount: u128) -> Result<u64, UnitError> {
    let remainder = amount % TOKEN_UNITS_PER_SAT;
    if remainder != 0 {
        return Err(UnitError::NonIntegralAmount { amount, remainder });
    }
    u64::try_from(amount / TOKEN_UNITS_PER_SAT).map_err(|_| UnitError::Overflow(amount))
}

/// Convert satoshis to token base units
pub fn sats_to_tokens(sats: u64) -> u128 {
    sats as u128 * TOKEN_UNITS_PER_SAT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_conversion() {
        assert_eq!(tokens_to_sats(0), Ok(0));
        assert_eq!(tokens_to_sats(TOKEN_UNITS_PER_SAT), Ok(1));
        assert_eq!(tokens_to_sats(sats_to_tokens(SATS_PER_BTC)), Ok(SATS_PER_BTC));
    }

    #[test]
    fn test_remainder_rejected() {
        let amount = TOKEN_UNITS_PER_SAT * 40 + 1;
        assert_eq!(
            tokens_to_sats(amount),
            Err(UnitError::NonIntegralAmount {
                amount,
                remainder: 1
            })
        );

        // Just below one satoshi is still a remainder, never rounded down to zero
        assert!(tokens_to_sats(TOKEN_UNITS_PER_SAT - 1).is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        let amount = (u64::MAX as u128 + 1) * TOKEN_UNITS_PER_SAT;
        assert_eq!(tokens_to_sats(amount), Err(UnitError::Overflow(amount)));
    }
}
