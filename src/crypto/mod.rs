// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client-side cryptography.
//!
//! - `aead` - ChaCha20-Poly1305 payload encryption (ring)
//! - `shamir` - threshold splitting of data keys over GF(256)

pub mod aead;
pub mod shamir;

pub use aead::{random_bytes, KEY_LEN, NONCE_LEN};
pub use shamir::Share;

/// Errors raised by the cryptographic primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("system random number generator failed")]
    Rng,

    #[error("invalid key length")]
    InvalidKey,

    #[error("invalid nonce length: {0}")]
    InvalidNonce(usize),

    #[error("authentication tag mismatch")]
    Authentication,

    #[error("invalid threshold {threshold} for {shares} shares")]
    InvalidThreshold { threshold: usize, shares: usize },

    #[error("no shares supplied")]
    NoShares,

    #[error("shares have different lengths")]
    ShareLengthMismatch,

    #[error("duplicate share index {0}")]
    DuplicateShare(u8),

    #[error("share index 0 is not allowed")]
    ZeroShareIndex,
}
