//! Payment Matching
//!
//! Sums the outputs of a verified transaction that pay a given locking
//! script. Outputs below the dust floor never count toward a payment.

use bitcoin::TxOut;
use serde::{Deserialize, Serialize};

use crate::types::DUST_THRESHOLD_SATS;

/// A specific transaction output, in display txid form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub txid: String,
    pub vout: u32,
}

/// Outputs of one transaction that pay the expected script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentMatch {
    /// Total value of counted outputs
    pub total_sats: u64,
    /// Indices of counted outputs
    pub outputs: Vec<u32>,
    /// Matching outputs excluded because `is_consumed` said so
    pub consumed: Vec<u32>,
    /// Matching outputs excluded as dust
    pub dust: Vec<u32>,
}

/// Collect outputs paying `script_pubkey`, skipping dust and anything
/// `is_consumed` reports as already spent on another redemption.
pub fn match_payment(
    outputs: &[TxOut],
    script_pubkey: &[u8],
    is_consumed: impl Fn(u32) -> bool,
) -> PaymentMatch {
    let mut result = PaymentMatch::default();

    for (index, out) in outputs.iter().enumerate() {
        let vout = index as u32;
        if out.script_pubkey.as_bytes() != script_pubkey {
            continue;
        }

        let value = out.value.to_sat();
        if value < DUST_THRESHOLD_SATS {
            result.dust.push(vout);
            continue;
        }
        if is_consumed(vout) {
            result.consumed.push(vout);
            continue;
        }

        result.total_sats = result.total_sats.saturating_add(value);
        result.outputs.push(vout);
    }

    result
}
