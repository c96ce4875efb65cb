//! Shared Types
//!
//! Identifiers and unit conversions used by every component.

pub mod identity;
pub mod units;

pub use identity::{AccountId, IdentityError, RedemptionId};
pub use units::{
    sats_to_tokens, tokens_to_sats, UnitError, DUST_THRESHOLD_SATS, SATS_PER_BTC,
    TOKEN_UNITS_PER_SAT,
};
