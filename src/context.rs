//! Call Context and Clocks
//!
//! Every state-changing entry point receives the caller identity and the
//! current time explicitly. Nothing in the protocol reads the wall clock on
//! its own; the service layer samples a [`Clock`] once per transaction.

use crate::types::AccountId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Caller identity and block time for a single transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: AccountId,
    /// Unix timestamp in seconds
    pub now: u64,
}

impl CallContext {
    pub fn new(caller: AccountId, now: u64) -> Self {
        Self { caller, now }
    }
}

/// Time source
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Manually advanced clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
