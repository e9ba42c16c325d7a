//! Cryptographic sortition: decides, from a VRF output alone, whether a
//! voter is part of the committee for a given (round, step) and how many of
//! that committee's weighted votes it casts.

use num_bigint::BigUint;
use num_traits::Zero;

/// `true` if a 64-byte VRF output makes this voter eligible to vote, given
/// the total voting weight `voters` currently registered and a `threshold`
/// representing the fraction of the committee this step expects to see
/// (scaled the same way as `voters`).
///
/// Implements the inequality `vrf_output * voters < threshold * 2^512`:
/// both sides are compared as unbounded integers so the 512-bit output
/// space is used evenly regardless of how `voters`/`threshold` are scaled.
pub fn is_eligible(vrf_output: &[u8; 64], voters: u64, threshold: u64) -> bool {
    if voters == 0 {
        return false;
    }
    let output = BigUint::from_bytes_be(vrf_output);
    let lhs = output * BigUint::from(voters);
    let two_pow_512 = BigUint::from(1u8) << 512usize;
    let rhs = BigUint::from(threshold) * two_pow_512;
    lhs < rhs
}

/// Expected number of votes this VRF output is worth, used to weight a
/// voter's ballot once it has cleared `is_eligible`. Computed as
/// `floor(vrf_output * voters * committee_size / 2^512)`, clamped to at
/// least 1 for any output that passed eligibility.
pub fn weight(vrf_output: &[u8; 64], voters: u64, committee_size: u32) -> u32 {
    let output = BigUint::from_bytes_be(vrf_output);
    let two_pow_512 = BigUint::from(1u8) << 512usize;
    let numerator = output * BigUint::from(voters) * BigUint::from(committee_size);
    let quotient = numerator / two_pow_512;
    if quotient.is_zero() {
        1
    } else {
        quotient.min(BigUint::from(u32::MAX)).to_string().parse::<u32>().unwrap_or(u32::MAX).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_output_is_always_eligible() {
        let output = [0u8; 64];
        assert!(is_eligible(&output, 100, 50));
    }

    #[test]
    fn all_ff_output_is_never_eligible_below_full_threshold() {
        let output = [0xff; 64];
        assert!(!is_eligible(&output, 100, 99));
    }

    #[test]
    fn zero_voters_is_never_eligible() {
        assert!(!is_eligible(&[0u8; 64], 0, 50));
    }

    #[test]
    fn weight_is_at_least_one_when_eligible() {
        let output = [0u8; 64];
        assert!(weight(&output, 100, 30) >= 1);
    }
}
