//! Redemptions
//!
//! # Flow
//!
//! ```text
//! 1. Holder requests redemption        -> tokens burned, ledger minted reduced,
//!                                         Pending with deadline
//! 2. Custodian pays on Bitcoin
//! 3. Anyone submits tx + SPV proof     -> Fulfilled, paying outputs consumed
//! 4. Deadline passes without proof     -> arbiter flags Defaulted,
//!                                         custodian escalated to UnderReview
//! ```

pub mod manager;
pub mod types;

pub use manager::{RedemptionError, RedemptionManager};
pub use types::{Fulfillment, Redemption, RedemptionConfig, RedemptionStats, RedemptionStatus};
