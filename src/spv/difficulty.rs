//! Proof-of-Work Arithmetic
//!
//! Compact `bits` decoding, per-header work checks and difficulty relative
//! to a network's maximum target.

use primitive_types::U256;

/// Mainnet proof-of-work limit (difficulty 1)
pub const MAINNET_POW_LIMIT_BITS: u32 = 0x1d00ffff;

/// Regtest proof-of-work limit
pub const REGTEST_POW_LIMIT_BITS: u32 = 0x207fffff;

/// Convert compact bits to a 256-bit target.
///
/// Returns `None` for negative or overflowing encodings and for a zero
/// target, none of which a valid header can carry.
pub fn bits_to_target(bits: u32) -> Option<U256> {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 && mantissa != 0 {
        return None;
    }

    let target = if exponent <= 3 {
        U256::from(mantissa >> (8 * (3 - exponent)))
    } else {
        // Mantissa occupies at most 23 bits; anything shifted past 256 overflows
        if exponent > 32 {
            return None;
        }
        U256::from(mantissa) << (8 * (exponent - 3))
    };

    if target.is_zero() {
        None
    } else {
        Some(target)
    }
}

/// Interpret a hash in internal byte order as a little-endian integer
pub fn hash_to_u256(hash: &[u8; 32]) -> U256 {
    U256::from_little_endian(hash)
}

/// Check if a block hash meets the target
pub fn hash_meets_target(hash: &[u8; 32], target: &U256) -> bool {
    hash_to_u256(hash) <= *target
}

/// Difficulty of `target` relative to the limit encoded by `pow_limit_bits`
pub fn difficulty_for_target(target: &U256, pow_limit_bits: u32) -> U256 {
    let limit = bits_to_target(pow_limit_bits).unwrap_or_else(U256::zero);
    if target.is_zero() {
        return U256::zero();
    }
    limit / *target
}
