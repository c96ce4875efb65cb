//! Bitcoin Address Decoding
//!
//! Addresses are resolved to the locking script a payment must carry.
//! Encoding details belong to the `bitcoin` crate.

use bitcoin::{Address, AddressType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::SpvError;

/// Supported output script types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

/// A decoded destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    pub script_type: ScriptType,
    pub script_pubkey: Vec<u8>,
}

/// Address-to-script resolution
#[cfg_attr(test, mockall::automock)]
pub trait BitcoinAddressDecoder: Send + Sync {
    fn decode(&self, address: &str) -> Result<DecodedAddress, SpvError>;
}

/// Decoder bound to one Bitcoin network
#[derive(Debug, Clone, Copy)]
pub struct NetworkAddressDecoder {
    network: bitcoin::Network,
}

impl NetworkAddressDecoder {
    pub fn new(network: bitcoin::Network) -> Self {
        Self { network }
    }
}

impl BitcoinAddressDecoder for NetworkAddressDecoder {
    fn decode(&self, address: &str) -> Result<DecodedAddress, SpvError> {
        let parsed = Address::from_str(address.trim())
            .map_err(|e| SpvError::InvalidAddress(e.to_string()))?
            .require_network(self.network)
            .map_err(|e| SpvError::InvalidAddress(e.to_string()))?;

        let script_type = match parsed.address_type() {
            Some(AddressType::P2pkh) => ScriptType::P2pkh,
            Some(AddressType::P2sh) => ScriptType::P2sh,
            Some(AddressType::P2wpkh) => ScriptType::P2wpkh,
            Some(AddressType::P2wsh) => ScriptType::P2wsh,
            Some(AddressType::P2tr) => ScriptType::P2tr,
            _ => return Err(SpvError::UnsupportedScriptType(address.to_string())),
        };

        Ok(DecodedAddress {
            script_type,
            script_pubkey: parsed.script_pubkey().to_bytes(),
        })
    }
}
