//! Shared harness for integration tests
//!
//! Builds a protocol on regtest parameters with real collaborators and mines
//! minimum-difficulty headers so SPV proofs can be produced in-process.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use account_control::access::Role;
use account_control::spv::difficulty::{bits_to_target, hash_meets_target, REGTEST_POW_LIMIT_BITS};
use account_control::spv::merkle::{build_proof, compute_merkle_root, sha256};
use account_control::spv::{
    BitcoinTxInfo, NetworkAddressDecoder, SpvConfig, SpvProof, StaticHeaderRelay,
};
use account_control::token::InMemoryToken;
use account_control::{
    sats_to_tokens, AccountId, CallContext, Collaborators, Protocol, ProtocolParams,
};
use bitcoin::block::{Header, Version as BlockVersion};
use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::hashes::Hash;
use bitcoin::{
    absolute, transaction, Address, Amount, BlockHash, CompactTarget, OutPoint, ScriptBuf,
    Sequence, Transaction, TxIn, TxMerkleNode, TxOut, WPubkeyHash, Witness,
};

pub const OWNER: AccountId = AccountId::from_byte(0x01);
pub const COUNCIL: AccountId = AccountId::from_byte(0x02);
pub const ARBITER: AccountId = AccountId::from_byte(0x03);
pub const ORACLE: AccountId = AccountId::from_byte(0x04);
pub const MANAGER: AccountId = AccountId::from_byte(0x05);
pub const ATTESTERS: [AccountId; 6] = [
    AccountId::from_byte(0x11),
    AccountId::from_byte(0x12),
    AccountId::from_byte(0x13),
    AccountId::from_byte(0x14),
    AccountId::from_byte(0x15),
    AccountId::from_byte(0x16),
];
pub const QC: AccountId = AccountId::from_byte(0xaa);
pub const QC2: AccountId = AccountId::from_byte(0xab);
pub const HOLDER: AccountId = AccountId::from_byte(0xbb);

pub const T0: u64 = 1_700_000_000;
pub const HOUR: u64 = 3600;
pub const DAY: u64 = 24 * HOUR;
pub const BTC: u64 = 100_000_000;

/// Proofs need three headers of work at regtest difficulty 1
pub const DIFFICULTY_FACTOR: u64 = 3;

pub fn params() -> ProtocolParams {
    ProtocolParams {
        spv: SpvConfig {
            tx_proof_difficulty_factor: DIFFICULTY_FACTOR,
            pow_limit_bits: REGTEST_POW_LIMIT_BITS,
        },
        ..ProtocolParams::default()
    }
}

pub fn ctx(caller: AccountId, now: u64) -> CallContext {
    CallContext::new(caller, now)
}

/// Protocol with every operator role granted and nothing authorized
pub fn protocol() -> Protocol {
    let mut p = Protocol::new(
        OWNER,
        params(),
        Collaborators {
            token: Box::new(InMemoryToken::new()),
            relay: Arc::new(StaticHeaderRelay::new(1, 1)),
            decoder: Arc::new(NetworkAddressDecoder::new(bitcoin::Network::Regtest)),
        },
    );

    let owner = ctx(OWNER, T0);
    p.grant_role(&owner, Role::EmergencyCouncil, COUNCIL).unwrap();
    p.grant_role(&owner, Role::Arbiter, ARBITER).unwrap();
    p.grant_role(&owner, Role::Oracle, ORACLE).unwrap();
    p.grant_role(&owner, Role::QcManager, MANAGER).unwrap();
    for attester in ATTESTERS {
        p.grant_role(&owner, Role::Attester, attester).unwrap();
    }
    p
}

/// Protocol with `qc` authorized, backed and holding `minted` sats of
/// tokens minted to HOLDER
pub fn funded_protocol(qc: AccountId, cap: u64, backing: u64, minted: u64) -> Protocol {
    let mut p = protocol();
    p.authorize_reserve(&ctx(OWNER, T0), qc, cap).unwrap();
    p.set_backing(&ctx(ORACLE, T0), qc, backing).unwrap();
    if minted > 0 {
        p.mint(&ctx(qc, T0), qc, HOLDER, sats_to_tokens(minted)).unwrap();
    }
    p
}

/// Regtest P2WPKH address for a synthetic key hash
pub fn address(tag: u8) -> String {
    let script = ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([tag; 20]));
    Address::from_script(&script, bitcoin::Network::Regtest)
        .unwrap()
        .to_string()
}

/// Redemption destination used by most tests
pub fn address_x() -> String {
    address(0x58)
}

pub fn address_y() -> String {
    address(0x59)
}

pub fn script_for(address: &str) -> ScriptBuf {
    Address::from_str(address)
        .unwrap()
        .require_network(bitcoin::Network::Regtest)
        .unwrap()
        .script_pubkey()
}

fn transaction(tag: u8, outputs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::from_bytes(vec![0x01, tag]),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs,
    }
}

/// Split a transaction into its legacy-serialized fields
pub fn split(tx: &Transaction) -> BitcoinTxInfo {
    let mut input_vector = serialize(&VarInt(tx.input.len() as u64));
    for txin in &tx.input {
        input_vector.extend(serialize(txin));
    }
    let mut output_vector = serialize(&VarInt(tx.output.len() as u64));
    for txout in &tx.output {
        output_vector.extend(serialize(txout));
    }
    BitcoinTxInfo {
        version: tx.version.0.to_le_bytes(),
        input_vector,
        output_vector,
        locktime: tx.lock_time.to_consensus_u32().to_le_bytes(),
    }
}

fn mine(prev: BlockHash, merkle_root: [u8; 32], time: u32) -> Header {
    let target = bits_to_target(REGTEST_POW_LIMIT_BITS).unwrap();
    let mut header = Header {
        version: BlockVersion::ONE,
        prev_blockhash: prev,
        merkle_root: TxMerkleNode::from_byte_array(merkle_root),
        time,
        bits: CompactTarget::from_consensus(REGTEST_POW_LIMIT_BITS),
        nonce: 0,
    };
    while !hash_meets_target(&header.block_hash().to_byte_array(), &target) {
        header.nonce += 1;
    }
    header
}

/// A payment transaction mined in a block with `confirmations` headers
pub struct MinedPayment {
    pub tx: Transaction,
    pub tx_info: BitcoinTxInfo,
    pub proof: SpvProof,
}

/// Mine a block whose second transaction pays `payments` (address, sats)
pub fn mined_payment(payments: &[(&str, u64)], confirmations: usize) -> MinedPayment {
    let coinbase = transaction(
        0xc0,
        vec![TxOut {
            value: Amount::from_sat(50 * BTC),
            script_pubkey: ScriptBuf::from_bytes(vec![0x51]),
        }],
    );
    let payment = transaction(
        0x01,
        payments
            .iter()
            .map(|(address, sats)| TxOut {
                value: Amount::from_sat(*sats),
                script_pubkey: script_for(address),
            })
            .collect(),
    );

    let leaves = [
        coinbase.compute_txid().to_byte_array(),
        payment.compute_txid().to_byte_array(),
    ];
    let root = compute_merkle_root(&leaves).unwrap();

    let mut headers = Vec::new();
    let mut prev = BlockHash::all_zeros();
    for i in 0..confirmations {
        let merkle = if i == 0 { root } else { [i as u8; 32] };
        let header = mine(prev, merkle, T0 as u32 + i as u32);
        prev = header.block_hash();
        headers.extend(serialize(&header));
    }

    MinedPayment {
        tx_info: split(&payment),
        proof: SpvProof {
            merkle_proof: build_proof(&leaves, 1).unwrap().concat(),
            tx_index_in_block: 1,
            bitcoin_headers: headers,
            coinbase_preimage: sha256(&serialize(&coinbase)),
            coinbase_proof: build_proof(&leaves, 0).unwrap().concat(),
        },
        tx: payment,
    }
}
