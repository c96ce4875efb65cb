//! Wrapped Token
//!
//! The protocol only needs mint and burn on the 18-decimal token. The
//! token is treated as untrusted: it is always the last call of a
//! transaction, after all ledger effects are applied.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::types::AccountId;

/// Token errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance: have {balance}, need {needed}")]
    InsufficientBalance { balance: u128, needed: u128 },

    #[error("token supply overflow")]
    SupplyOverflow,

    #[error("zero account")]
    ZeroAccount,

    #[error("token call failed: {0}")]
    CallFailed(String),
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::InsufficientBalance { .. } => "INSUFFICIENT_TOKEN_BALANCE",
            TokenError::SupplyOverflow => "TOKEN_SUPPLY_OVERFLOW",
            TokenError::ZeroAccount => "ZERO_ACCOUNT",
            TokenError::CallFailed(_) => "TOKEN_CALL_FAILED",
        }
    }
}

/// Token operations used by the protocol
pub trait WrappedToken: Send + Sync + fmt::Debug {
    fn mint(&mut self, to: &AccountId, amount: u128) -> Result<(), TokenError>;

    /// Burn from a holder's balance
    fn burn(&mut self, from: &AccountId, amount: u128) -> Result<(), TokenError>;

    fn balance_of(&self, account: &AccountId) -> u128;

    fn total_supply(&self) -> u128;
}

/// In-process token ledger
#[derive(Debug, Default, Clone)]
pub struct InMemoryToken {
    balances: HashMap<AccountId, u128>,
    total_supply: u128,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WrappedToken for InMemoryToken {
    fn mint(&mut self, to: &AccountId, amount: u128) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::ZeroAccount);
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow)?;
        *self.balances.entry(*to).or_insert(0) += amount;
        self.total_supply = supply;
        Ok(())
    }

    fn burn(&mut self, from: &AccountId, amount: u128) -> Result<(), TokenError> {
        let balance = self.balances.get(from).copied().unwrap_or(0);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                balance,
                needed: amount,
            });
        }
        self.balances.insert(*from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    fn balance_of(&self, account: &AccountId) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }
}
