//! SPV Verification
//!
//! Checks that a transaction is well formed, included in the first header
//! of a linked header chain, and buried under enough accumulated work
//! measured against the relay's difficulty epochs.

use bitcoin::block::Header;
use bitcoin::consensus::encode::{deserialize, deserialize_partial};
use bitcoin::hashes::Hash;
use bitcoin::{absolute, transaction, BlockHash, Transaction, TxIn, TxOut, Txid};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use super::difficulty::{bits_to_target, difficulty_for_target, hash_meets_target};
use super::merkle::{parse_proof, sha256, verify_inclusion};
use super::proof::{BitcoinTxInfo, SpvProof};
use super::relay::BitcoinHeaderRelay;
use super::SpvError;

/// Serialized header size
pub const HEADER_SIZE: usize = 80;

/// Verifier parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpvConfig {
    /// Required confirmations, expressed as a multiple of epoch difficulty
    pub tx_proof_difficulty_factor: u64,
    /// Compact bits of the network's proof-of-work limit
    pub pow_limit_bits: u32,
}

impl Default for SpvConfig {
    fn default() -> Self {
        Self {
            tx_proof_difficulty_factor: 6,
            pow_limit_bits: super::difficulty::MAINNET_POW_LIMIT_BITS,
        }
    }
}

/// A transaction that passed every SPV check
#[derive(Debug, Clone)]
pub struct VerifiedTransaction {
    pub txid: Txid,
    pub transaction: Transaction,
    pub block_hash: BlockHash,
    pub accumulated_difficulty: U256,
}

/// Stateless proof checker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpvVerifier {
    config: SpvConfig,
}

impl SpvVerifier {
    pub fn new(config: SpvConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpvConfig {
        &self.config
    }

    pub fn set_difficulty_factor(&mut self, factor: u64) -> Result<(), SpvError> {
        if factor == 0 {
            return Err(SpvError::InvalidDifficultyFactor);
        }
        self.config.tx_proof_difficulty_factor = factor;
        Ok(())
    }

    /// Decode the transaction vectors, rejecting anything that does not
    /// re-encode to exactly the bytes supplied.
    pub fn parse_transaction(&self, tx_info: &BitcoinTxInfo) -> Result<Transaction, SpvError> {
        let input = decode_vector::<TxIn>(&tx_info.input_vector)
            .map_err(SpvError::MalformedInputVector)?;
        let output = decode_vector::<TxOut>(&tx_info.output_vector)
            .map_err(SpvError::MalformedOutputVector)?;

        Ok(Transaction {
            version: transaction::Version(i32::from_le_bytes(tx_info.version)),
            lock_time: absolute::LockTime::from_consensus(u32::from_le_bytes(tx_info.locktime)),
            input,
            output,
        })
    }

    /// Full inclusion and work check
    pub fn verify(
        &self,
        relay: &dyn BitcoinHeaderRelay,
        tx_info: &BitcoinTxInfo,
        proof: &SpvProof,
    ) -> Result<VerifiedTransaction, SpvError> {
        let transaction = self.parse_transaction(tx_info)?;
        let txid = transaction.compute_txid();

        let headers = parse_headers(&proof.bitcoin_headers)?;
        let merkle_root = headers[0].merkle_root.to_byte_array();

        if proof.merkle_proof.len() != proof.coinbase_proof.len() {
            return Err(SpvError::MerkleDepthMismatch {
                tx_depth: proof.merkle_proof.len() / 32,
                coinbase_depth: proof.coinbase_proof.len() / 32,
            });
        }
        let tx_siblings = parse_proof(&proof.merkle_proof)?;
        let coinbase_siblings = parse_proof(&proof.coinbase_proof)?;

        if !verify_inclusion(
            &txid.to_byte_array(),
            &tx_siblings,
            proof.tx_index_in_block,
            &merkle_root,
        ) {
            return Err(SpvError::InvalidTxMerkleProof);
        }

        let coinbase_txid = sha256(&proof.coinbase_preimage);
        if !verify_inclusion(&coinbase_txid, &coinbase_siblings, 0, &merkle_root) {
            return Err(SpvError::InvalidCoinbaseProof);
        }

        let accumulated_difficulty = self.evaluate_proof_difficulty(relay, &headers)?;

        Ok(VerifiedTransaction {
            txid,
            transaction,
            block_hash: headers[0].block_hash(),
            accumulated_difficulty,
        })
    }

    /// Match the first header to a known epoch and require the chain to
    /// accumulate `factor` times that difficulty.
    fn evaluate_proof_difficulty(
        &self,
        relay: &dyn BitcoinHeaderRelay,
        headers: &[Header],
    ) -> Result<U256, SpvError> {
        let pow_limit = self.config.pow_limit_bits;

        let first_target = bits_to_target(headers[0].bits.to_consensus())
            .ok_or(SpvError::InsufficientHeaderWork { index: 0 })?;
        let first_difficulty = difficulty_for_target(&first_target, pow_limit);

        let current = U256::from(relay.current_epoch_difficulty());
        let previous = U256::from(relay.previous_epoch_difficulty());

        let requested = if !first_difficulty.is_zero() && first_difficulty == current {
            current
        } else if !first_difficulty.is_zero() && first_difficulty == previous {
            previous
        } else {
            return Err(SpvError::UnknownDifficultyEpoch {
                observed: first_difficulty.to_string(),
            });
        };

        let mut accumulated = U256::zero();
        for (index, header) in headers.iter().enumerate() {
            if index > 0 && header.prev_blockhash != headers[index - 1].block_hash() {
                return Err(SpvError::InvalidHeaderChain { index });
            }

            let target = bits_to_target(header.bits.to_consensus())
                .ok_or(SpvError::InsufficientHeaderWork { index })?;
            if !hash_meets_target(&header.block_hash().to_byte_array(), &target) {
                return Err(SpvError::InsufficientHeaderWork { index });
            }

            accumulated = accumulated.saturating_add(difficulty_for_target(&target, pow_limit));
        }

        let required =
            requested.saturating_mul(U256::from(self.config.tx_proof_difficulty_factor));
        if accumulated < required {
            return Err(SpvError::InsufficientAccumulatedDifficulty {
                observed: accumulated.to_string(),
                required: required.to_string(),
            });
        }

        Ok(accumulated)
    }
}

/// Decode a varint-prefixed vector that must be non-empty and fully consumed
fn decode_vector<T>(bytes: &[u8]) -> Result<Vec<T>, String>
where
    Vec<T>: bitcoin::consensus::Decodable,
{
    let (items, used): (Vec<T>, usize) =
        deserialize_partial(bytes).map_err(|e| e.to_string())?;
    if items.is_empty() {
        return Err("empty vector".to_string());
    }
    if used != bytes.len() {
        return Err(format!("{} trailing bytes", bytes.len() - used));
    }
    Ok(items)
}

/// Split a header chain into parsed headers
fn parse_headers(bytes: &[u8]) -> Result<Vec<Header>, SpvError> {
    if bytes.is_empty() || bytes.len() % HEADER_SIZE != 0 {
        return Err(SpvError::InvalidHeaderChainLength(bytes.len()));
    }
    bytes
        .chunks_exact(HEADER_SIZE)
        .map(|chunk| deserialize::<Header>(chunk))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| SpvError::InvalidHeaderChainLength(bytes.len()))
}
