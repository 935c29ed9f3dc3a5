// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet key loading.
//!
//! The gateway wallet key is provisioned as a PEM file (SEC1 or PKCS#8,
//! secp256k1) and converted to an alloy signer at startup.

use std::path::Path;

use alloy::signers::local::PrivateKeySigner;
use k256::SecretKey;

use super::LedgerError;

/// Parse a PEM private key to a hex string (64 characters, no 0x prefix).
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, LedgerError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid UTF-8: {}", e)))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid PEM: {}", e)))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|e| LedgerError::InvalidPrivateKey(format!("Invalid key format: {}", e)))?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}

/// Create a signer from a hex-encoded private key (with or without 0x).
pub fn signer_from_hex(private_key: &str) -> Result<PrivateKeySigner, LedgerError> {
    private_key
        .trim()
        .parse::<PrivateKeySigner>()
        .map_err(|e| LedgerError::InvalidPrivateKey(e.to_string()))
}

/// Create a signer from PEM-encoded private key bytes.
pub fn signer_from_pem(pem_bytes: &[u8]) -> Result<PrivateKeySigner, LedgerError> {
    let hex_key = pem_to_hex(pem_bytes)?;
    signer_from_hex(&hex_key)
}

/// Load the signer configured at `path`.
pub fn load_signer(path: impl AsRef<Path>) -> Result<PrivateKeySigner, LedgerError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        LedgerError::InvalidPrivateKey(format!("cannot read {}: {}", path.display(), e))
    })?;
    let signer = signer_from_pem(&bytes)?;
    tracing::info!(address = %signer.address(), "Wallet key loaded");
    Ok(signer)
}
