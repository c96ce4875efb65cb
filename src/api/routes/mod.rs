//! API Routes Module
//!
//! Route handlers organized by domain:
//! - health: health check and summary counters
//! - reserves: custodian reserve views, attestations, minting, status and pauses
//! - redemptions: redemption lifecycle
//! - oracle: backing feed and arbiter corrections
//! - admin: roles, reserve authorization, pause switches and parameters

pub mod admin;
pub mod health;
pub mod oracle;
pub mod redemptions;
pub mod reserves;

use super::middleware::ApiError;
use crate::types::{AccountId, IdentityError, RedemptionId};

pub(crate) fn parse_account(raw: &str) -> Result<AccountId, ApiError> {
    raw.parse()
        .map_err(|e: IdentityError| ApiError::bad_request("INVALID_ACCOUNT", e.to_string()))
}

pub(crate) fn parse_redemption_id(raw: &str) -> Result<RedemptionId, ApiError> {
    raw.parse()
        .map_err(|e: IdentityError| ApiError::bad_request("INVALID_REDEMPTION_ID", e.to_string()))
}

/// Token amounts exceed JSON's safe integer range and travel as decimal strings
pub(crate) mod token_amount {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.trim().parse::<u128>().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_parse_account() {
        assert!(parse_account("0x1111111111111111111111111111111111111111").is_ok());
        let err = parse_account("0x11").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "INVALID_ACCOUNT");
    }

    #[test]
    fn test_token_amount_from_string() {
        #[derive(serde::Deserialize)]
        struct Body {
            #[serde(with = "token_amount")]
            amount: u128,
        }

        let body: Body = serde_json::from_str(r#"{"amount":"100000000000000000000"}"#).unwrap();
        assert_eq!(body.amount, 100_000_000_000_000_000_000);
        assert!(serde_json::from_str::<Body>(r#"{"amount":"-1"}"#).is_err());
    }
}
