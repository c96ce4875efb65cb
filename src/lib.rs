//! QC Account Control
//!
//! Accounting core for a wrapped Bitcoin token whose supply is backed by
//! reserves held by Qualified Custodians (QCs).
//!
//! ## Components
//!
//! 1. **Reserve Oracle** - multi-attester median consensus on custodian balances
//! 2. **QC State Machine** - custodian lifecycle and the capabilities each status grants
//! 3. **Pause Credits** - one renewable self-pause per custodian
//! 4. **Account Control** - per-custodian caps, backing and minted totals
//! 5. **Redemption Manager** - burn-and-redeem requests resolved by SPV proofs
//! 6. **SPV Verifier** - Bitcoin inclusion and proof-of-work checks
//!
//! [`protocol::Protocol`] ties the components together and is the only way
//! to change state. Every entry point is atomic: on error nothing changes.
//!
//! ## Service
//!
//! [`service::ProtocolService`] wraps the protocol for concurrent use by the
//! HTTP API and the [`keeper::Keeper`], persisting each commit to a
//! [`storage::StateStore`].

pub mod access;
pub mod account_control;
pub mod api;
pub mod common;
pub mod context;
pub mod events;
pub mod keeper;
pub mod oracle;
pub mod pause_credit;
pub mod protocol;
pub mod qc_state;
pub mod redemption;
pub mod service;
pub mod spv;
pub mod storage;
pub mod token;
pub mod types;

// Re-exports: protocol facade
pub use protocol::{Collaborators, Protocol, ProtocolParams, ProtocolState};

// Re-exports: errors and configuration
pub use common::{ConfigError, ErrorClass, Network, ProtocolConfig, ProtocolError};

// Re-exports: call context and clocks
pub use context::{CallContext, Clock, ManualClock, SystemClock};

// Re-exports: identifiers and units
pub use types::{sats_to_tokens, tokens_to_sats, AccountId, RedemptionId};

// Re-exports: components
pub use access::Role;
pub use events::ProtocolEvent;
pub use qc_state::QcStatus;
pub use redemption::{Redemption, RedemptionStatus};

// Re-exports: service layer
pub use keeper::{Keeper, KeeperStats, TickResult};
pub use service::{ProtocolService, ServiceError};
pub use storage::{MemoryStateStore, SqliteStateStore, StateChanges, StateStore};
