//! Header Relay
//!
//! Source of the trusted difficulty epochs that SPV proofs are measured
//! against. The relay itself is maintained elsewhere.

use std::sync::atomic::{AtomicU64, Ordering};

/// Supplier of current and previous epoch difficulty
#[cfg_attr(test, mockall::automock)]
pub trait BitcoinHeaderRelay: Send + Sync {
    fn current_epoch_difficulty(&self) -> u128;
    fn previous_epoch_difficulty(&self) -> u128;
}

/// Relay with operator-set epochs
#[derive(Debug, Default)]
pub struct StaticHeaderRelay {
    current: AtomicU64,
    previous: AtomicU64,
}

impl StaticHeaderRelay {
    pub fn new(current: u64, previous: u64) -> Self {
        Self {
            current: AtomicU64::new(current),
            previous: AtomicU64::new(previous),
        }
    }

    /// Roll to a new epoch; the old current becomes previous
    pub fn advance_epoch(&self, difficulty: u64) {
        let old = self.current.swap(difficulty, Ordering::SeqCst);
        self.previous.store(old, Ordering::SeqCst);
    }
}

impl BitcoinHeaderRelay for StaticHeaderRelay {
    fn current_epoch_difficulty(&self) -> u128 {
        self.current.load(Ordering::SeqCst) as u128
    }

    fn previous_epoch_difficulty(&self) -> u128 {
        self.previous.load(Ordering::SeqCst) as u128
    }
}
