// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shamir secret sharing over GF(2^8).
//!
//! Each secret byte is the constant term of an independent random polynomial
//! of degree `threshold - 1`. Share `x` carries the evaluations at `x`
//! (x in 1..=255). Any `threshold` shares reconstruct the secret by Lagrange
//! interpolation at zero; fewer reveal nothing about it.

use std::collections::HashSet;

use ring::rand::{SecureRandom, SystemRandom};

use super::CryptoError;

/// One share of a split secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Evaluation point (never zero).
    pub index: u8,
    /// Evaluations, one per secret byte.
    pub value: Vec<u8>,
}

/// Multiplication in GF(2^8) with the AES reduction polynomial (0x11b).
fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            product ^= a;
        }
        let carry = a & 0x80 != 0;
        a <<= 1;
        if carry {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    product
}

/// Multiplicative inverse (a^254). `a` must be non-zero.
fn gf_inv(a: u8) -> u8 {
    let mut result = 1u8;
    let mut base = a;
    let mut exp = 254u8;
    while exp != 0 {
        if exp & 1 != 0 {
            result = gf_mul(result, base);
        }
        base = gf_mul(base, base);
        exp >>= 1;
    }
    result
}

/// Split `secret` into `shares` shares, any `threshold` of which recover it.
pub fn split(secret: &[u8], threshold: usize, shares: usize) -> Result<Vec<Share>, CryptoError> {
    if threshold == 0 || threshold > shares || shares > u8::MAX as usize {
        return Err(CryptoError::InvalidThreshold { threshold, shares });
    }

    // coefficients[b * (threshold - 1) + k] is the (k+1)-th coefficient for byte b
    let degree = threshold - 1;
    let mut coefficients = vec![0u8; secret.len() * degree];
    if !coefficients.is_empty() {
        SystemRandom::new()
            .fill(&mut coefficients)
            .map_err(|_| CryptoError::Rng)?;
    }

    let result = (1..=shares as u8)
        .map(|x| {
            let value = secret
                .iter()
                .enumerate()
                .map(|(b, &constant)| {
                    let coeffs = &coefficients[b * degree..(b + 1) * degree];
                    // Horner, highest degree first
                    let mut acc = 0u8;
                    for &c in coeffs.iter().rev() {
                        acc = gf_mul(acc, x) ^ c;
                    }
                    gf_mul(acc, x) ^ constant
                })
                .collect();
            Share { index: x, value }
        })
        .collect();

    Ok(result)
}

/// Reconstruct a secret from shares. The caller supplies at least the
/// threshold number of shares; extra shares are harmless.
pub fn combine(shares: &[Share]) -> Result<Vec<u8>, CryptoError> {
    let first = shares.first().ok_or(CryptoError::NoShares)?;
    let len = first.value.len();

    let mut seen = HashSet::new();
    for share in shares {
        if share.index == 0 {
            return Err(CryptoError::ZeroShareIndex);
        }
        if !seen.insert(share.index) {
            return Err(CryptoError::DuplicateShare(share.index));
        }
        if share.value.len() != len {
            return Err(CryptoError::ShareLengthMismatch);
        }
    }

    // Lagrange basis at zero: l_i = prod_{j != i} x_j / (x_j - x_i)
    let basis: Vec<u8> = shares
        .iter()
        .map(|si| {
            shares
                .iter()
                .filter(|sj| sj.index != si.index)
                .fold(1u8, |acc, sj| {
                    gf_mul(acc, gf_mul(sj.index, gf_inv(sj.index ^ si.index)))
                })
        })
        .collect();

    let secret = (0..len)
        .map(|b| {
            shares
                .iter()
                .zip(&basis)
                .fold(0u8, |acc, (share, &l)| acc ^ gf_mul(share.value[b], l))
        })
        .collect();

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn field_inverse_is_correct() {
        for a in 1..=255u8 {
            assert_eq!(gf_mul(a, gf_inv(a)), 1, "inverse of {a}");
        }
    }

    #[test]
    fn any_threshold_subset_recovers_secret() {
        let shares = split(SECRET, 3, 5).unwrap();
        assert_eq!(shares.len(), 5);

        for (a, b, c) in [(0, 1, 2), (0, 2, 4), (1, 3, 4), (4, 3, 2)] {
            let subset = vec![shares[a].clone(), shares[b].clone(), shares[c].clone()];
            assert_eq!(combine(&subset).unwrap(), SECRET);
        }
        assert_eq!(combine(&shares).unwrap(), SECRET);
    }

    #[test]
    fn below_threshold_does_not_recover_secret() {
        let shares = split(SECRET, 3, 5).unwrap();
        let recovered = combine(&shares[..2]).unwrap();
        assert_ne!(recovered, SECRET);
    }

    #[test]
    fn threshold_one_shares_equal_secret() {
        let shares = split(SECRET, 1, 3).unwrap();
        for share in &shares {
            assert_eq!(share.value, SECRET);
        }
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(matches!(split(SECRET, 0, 3), Err(CryptoError::InvalidThreshold { .. })));
        assert!(matches!(split(SECRET, 4, 3), Err(CryptoError::InvalidThreshold { .. })));
        assert!(matches!(split(SECRET, 2, 256), Err(CryptoError::InvalidThreshold { .. })));
    }

    #[test]
    fn malformed_share_sets_are_rejected() {
        let shares = split(SECRET, 2, 3).unwrap();
        assert_eq!(combine(&[]), Err(CryptoError::NoShares));
        assert_eq!(
            combine(&[shares[0].clone(), shares[0].clone()]),
            Err(CryptoError::DuplicateShare(1))
        );
        let mut short = shares[1].clone();
        short.value.pop();
        assert_eq!(
            combine(&[shares[0].clone(), short]),
            Err(CryptoError::ShareLengthMismatch)
        );
        let zero = Share { index: 0, value: SECRET.to_vec() };
        assert_eq!(combine(&[zero]), Err(CryptoError::ZeroShareIndex));
    }
}
