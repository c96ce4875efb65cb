//! Bitcoin SPV
//!
//! Proof-of-inclusion and proof-of-work checks for redemption payments.
//!
//! - `proof`: transaction vectors and proof inputs
//! - `merkle`: double-SHA256 merkle inclusion
//! - `difficulty`: compact targets and difficulty
//! - `verifier`: the full check against a header relay
//! - `payment`: output matching with dust floor
//! - `address`, `relay`: collaborator interfaces

pub mod address;
pub mod difficulty;
pub mod merkle;
pub mod payment;
pub mod proof;
pub mod relay;
pub mod verifier;

use thiserror::Error;

pub use address::{BitcoinAddressDecoder, DecodedAddress, NetworkAddressDecoder, ScriptType};
pub use payment::{match_payment, OutputRef, PaymentMatch};
pub use proof::{BitcoinTxInfo, SpvProof};
pub use relay::{BitcoinHeaderRelay, StaticHeaderRelay};
pub use verifier::{SpvConfig, SpvVerifier, VerifiedTransaction};

/// SPV verification errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpvError {
    #[error("invalid bitcoin address: {0}")]
    InvalidAddress(String),

    #[error("unsupported script type for address {0}")]
    UnsupportedScriptType(String),

    #[error("malformed input vector: {0}")]
    MalformedInputVector(String),

    #[error("malformed output vector: {0}")]
    MalformedOutputVector(String),

    #[error("header chain length {0} is not a non-zero multiple of 80")]
    InvalidHeaderChainLength(usize),

    #[error("merkle proof length {0} is not a multiple of 32")]
    MalformedMerkleProof(usize),

    #[error("tx proof depth {tx_depth} differs from coinbase proof depth {coinbase_depth}")]
    MerkleDepthMismatch {
        tx_depth: usize,
        coinbase_depth: usize,
    },

    #[error("transaction merkle proof does not match header")]
    InvalidTxMerkleProof,

    #[error("coinbase merkle proof does not match header")]
    InvalidCoinbaseProof,

    #[error("first header difficulty {observed} matches neither relay epoch")]
    UnknownDifficultyEpoch { observed: String },

    #[error("header {index} does not link to its predecessor")]
    InvalidHeaderChain { index: usize },

    #[error("header {index} does not meet its target")]
    InsufficientHeaderWork { index: usize },

    #[error("accumulated difficulty {observed} below required {required}")]
    InsufficientAccumulatedDifficulty { observed: String, required: String },

    #[error("difficulty factor must be non-zero")]
    InvalidDifficultyFactor,
}

impl SpvError {
    pub fn code(&self) -> &'static str {
        match self {
            SpvError::InvalidAddress(_) => "INVALID_BTC_ADDRESS",
            SpvError::UnsupportedScriptType(_) => "UNSUPPORTED_SCRIPT_TYPE",
            SpvError::MalformedInputVector(_) => "MALFORMED_INPUT_VECTOR",
            SpvError::MalformedOutputVector(_) => "MALFORMED_OUTPUT_VECTOR",
            SpvError::InvalidHeaderChainLength(_) => "INVALID_HEADER_CHAIN_LENGTH",
            SpvError::MalformedMerkleProof(_) => "MALFORMED_MERKLE_PROOF",
            SpvError::MerkleDepthMismatch { .. } => "MERKLE_DEPTH_MISMATCH",
            SpvError::InvalidTxMerkleProof => "INVALID_TX_MERKLE_PROOF",
            SpvError::InvalidCoinbaseProof => "INVALID_COINBASE_PROOF",
            SpvError::UnknownDifficultyEpoch { .. } => "UNKNOWN_DIFFICULTY_EPOCH",
            SpvError::InvalidHeaderChain { .. } => "INVALID_HEADER_CHAIN",
            SpvError::InsufficientHeaderWork { .. } => "INSUFFICIENT_HEADER_WORK",
            SpvError::InsufficientAccumulatedDifficulty { .. } => {
                "INSUFFICIENT_ACCUMULATED_DIFFICULTY"
            }
            SpvError::InvalidDifficultyFactor => "INVALID_DIFFICULTY_FACTOR",
        }
    }

    /// Address problems are caller input errors; everything else is a bad proof
    pub fn is_address_error(&self) -> bool {
        matches!(
            self,
            SpvError::InvalidAddress(_) | SpvError::UnsupportedScriptType(_)
        )
    }
}
