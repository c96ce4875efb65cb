//! Identity Types
//!
//! Fixed-width identifiers used as primary keys across the protocol:
//! 20-byte account identities (custodians, attesters, holders) and
//! 32-byte redemption identifiers.

use borsh::BorshSerialize;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], IdentityError> {
    let hex_str = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(hex_str).map_err(|e| IdentityError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(IdentityError::InvalidLength {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// 20-byte account identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshSerialize)]
pub struct AccountId(pub [u8; 20]);

impl AccountId {
    pub const ZERO: AccountId = AccountId([0u8; 20]);

    /// Convenience constructor for fixtures and genesis accounts
    pub const fn from_byte(b: u8) -> Self {
        AccountId([b; 20])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

impl FromStr for AccountId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<20>(s).map(AccountId)
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 32-byte redemption identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RedemptionId(pub [u8; 32]);

impl RedemptionId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for RedemptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for RedemptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RedemptionId({})", self)
    }
}

impl FromStr for RedemptionId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<32>(s).map(RedemptionId)
    }
}

impl Serialize for RedemptionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RedemptionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parse() {
        let id: AccountId = "0x0101010101010101010101010101010101010101".parse().unwrap();
        assert_eq!(id, AccountId::from_byte(1));

        // Prefix is optional
        let id: AccountId = "0202020202020202020202020202020202020202".parse().unwrap();
        assert_eq!(id, AccountId::from_byte(2));
    }

    #[test]
    fn test_account_id_invalid_length() {
        let result = "0x0101".parse::<AccountId>();
        assert_eq!(
            result,
            Err(IdentityError::InvalidLength {
                expected: 20,
                got: 2
            })
        );
        assert!("0xzz".parse::<AccountId>().is_err());
    }

    #[test]
    fn test_account_id_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(AccountId::from_byte(7), 42u64);

        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("0x0707"));

        let back: std::collections::BTreeMap<AccountId, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(&AccountId::from_byte(7)), Some(&42));
    }

    #[test]
    fn test_zero_account() {
        assert!(AccountId::ZERO.is_zero());
        assert!(!AccountId::from_byte(1).is_zero());
    }
}
