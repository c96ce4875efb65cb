//! SPV Proof Inputs
//!
//! Transient inputs to fulfillment: the transaction split into its
//! consensus fields, and the inclusion/work proof. Byte fields travel as hex
//! in JSON.

use serde::{Deserialize, Serialize};

/// A legacy-serialized Bitcoin transaction split into its four fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinTxInfo {
    /// 4-byte little-endian version
    #[serde(with = "hex_array")]
    pub version: [u8; 4],
    /// Varint input count followed by the inputs
    #[serde(with = "hex_vec")]
    pub input_vector: Vec<u8>,
    /// Varint output count followed by the outputs
    #[serde(with = "hex_vec")]
    pub output_vector: Vec<u8>,
    /// 4-byte little-endian locktime
    #[serde(with = "hex_array")]
    pub locktime: [u8; 4],
}

impl BitcoinTxInfo {
    /// Concatenated legacy serialization
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(8 + self.input_vector.len() + self.output_vector.len());
        out.extend_from_slice(&self.version);
        out.extend_from_slice(&self.input_vector);
        out.extend_from_slice(&self.output_vector);
        out.extend_from_slice(&self.locktime);
        out
    }
}

/// Inclusion and proof-of-work evidence for a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpvProof {
    /// Sibling hashes from the transaction to the merkle root
    #[serde(with = "hex_vec")]
    pub merkle_proof: Vec<u8>,
    /// Position of the transaction in its block
    pub tx_index_in_block: u64,
    /// Concatenated 80-byte headers, the first containing the transaction
    #[serde(with = "hex_vec")]
    pub bitcoin_headers: Vec<u8>,
    /// Single SHA256 of the block's coinbase transaction
    #[serde(with = "hex_array")]
    pub coinbase_preimage: [u8; 32],
    /// Sibling hashes from the coinbase to the merkle root
    #[serde(with = "hex_vec")]
    pub coinbase_proof: Vec<u8>,
}

pub(crate) mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes =
            hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {} bytes, got {}", N, len)))
    }
}
