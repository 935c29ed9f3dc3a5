// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ChaCha20-Poly1305 AEAD for content payloads.
//!
//! Every payload gets a fresh random 256-bit data key, so random 96-bit
//! nonces never repeat under the same key.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, CHACHA20_POLY1305};
use ring::rand::{SecureRandom, SystemRandom};

use super::CryptoError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// Fill a fixed-size array from the system RNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| CryptoError::Rng)?;
    Ok(buf)
}

fn cipher(key: &[u8]) -> Result<LessSafeKey, CryptoError> {
    let unbound = UnboundKey::new(&CHACHA20_POLY1305, key).map_err(|_| CryptoError::InvalidKey)?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypt `plaintext` under `key` with a random nonce.
///
/// Returns `(nonce, ciphertext_with_tag)`.
pub fn seal(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CryptoError> {
    let nonce = random_bytes::<NONCE_LEN>()?;
    let mut in_out = plaintext.to_vec();
    cipher(key)?
        .seal_in_place_append_tag(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::Authentication)?;
    Ok((nonce, in_out))
}

/// Decrypt and authenticate `ciphertext`.
pub fn open(key: &[u8], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce: [u8; NONCE_LEN] = nonce
        .try_into()
        .map_err(|_| CryptoError::InvalidNonce(nonce.len()))?;
    let mut in_out = ciphertext.to_vec();
    let plaintext = cipher(key)?
        .open_in_place(Nonce::assume_unique_for_key(nonce), Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::Authentication)?;
    Ok(plaintext.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let key = random_bytes::<KEY_LEN>().unwrap();
        let (nonce, ct) = seal(&key, b"secret payload", b"aad").unwrap();
        assert_ne!(&ct[..], b"secret payload");
        let pt = open(&key, &nonce, &ct, b"aad").unwrap();
        assert_eq!(pt, b"secret payload");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = random_bytes::<KEY_LEN>().unwrap();
        let (nonce, mut ct) = seal(&key, b"secret payload", b"aad").unwrap();
        ct[0] ^= 0x01;
        assert_eq!(open(&key, &nonce, &ct, b"aad"), Err(CryptoError::Authentication));
    }

    #[test]
    fn wrong_aad_or_key_fails() {
        let key = random_bytes::<KEY_LEN>().unwrap();
        let other = random_bytes::<KEY_LEN>().unwrap();
        let (nonce, ct) = seal(&key, b"x", b"aad").unwrap();
        assert!(open(&key, &nonce, &ct, b"other").is_err());
        assert!(open(&other, &nonce, &ct, b"aad").is_err());
    }

    #[test]
    fn short_nonce_is_rejected() {
        let key = random_bytes::<KEY_LEN>().unwrap();
        assert_eq!(open(&key, &[0u8; 5], b"", b""), Err(CryptoError::InvalidNonce(5)));
    }
}
