// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identifier types shared across the pipeline.
//!
//! Identities are EVM addresses. Content, blob and chunk identifiers are
//! 32-byte values rendered as `0x`-prefixed hex; blob and chunk ids are
//! SHA-256 content addresses of the bytes they name.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Wallet identity (EVM address).
pub type Identity = Address;

/// Address of the registry contract a session key is scoped to.
pub type PackageId = Address;

/// Error returned when a textual identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct IdParseError(pub String);

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub B256);

        impl $name {
            /// Wrap raw bytes.
            pub fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(B256::from(bytes))
            }

            /// Raw 32-byte value.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0 .0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", alloy::hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                B256::from_str(s.trim())
                    .map(Self)
                    .map_err(|e| IdParseError(format!("{s}: {e}")))
            }
        }
    };
}

digest_id!(
    /// Identifier of a piece of published content (ledger record key).
    ContentId
);

digest_id!(
    /// Content address of a blob: SHA-256 of its manifest.
    BlobId
);

digest_id!(
    /// Content address of a single stored chunk.
    ChunkId
);

impl ContentId {
    /// Generate a fresh random content id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        bytes[16..].copy_from_slice(Uuid::new_v4().as_bytes());
        Self::from_bytes(bytes)
    }
}

impl ChunkId {
    /// Content address of `bytes`.
    pub fn digest(bytes: &[u8]) -> Self {
        Self::from_bytes(content_address(bytes))
    }
}

impl From<BlobId> for ChunkId {
    // The manifest of a blob is stored as a chunk under the blob's own id.
    fn from(blob_id: BlobId) -> Self {
        ChunkId(blob_id.0)
    }
}

/// SHA-256 of `bytes`.
pub fn content_address(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_as_prefixed_hex_and_parse_back() {
        let id = ChunkId::digest(b"hello");
        let text = id.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<ChunkId>().unwrap(), id);
    }

    #[test]
    fn digest_matches_known_sha256() {
        let id = ChunkId::digest(b"");
        assert_eq!(
            id.to_string(),
            "0xe3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn generated_content_ids_are_distinct() {
        assert_ne!(ContentId::generate(), ContentId::generate());
    }

    #[test]
    fn invalid_id_is_rejected() {
        assert!("0x1234".parse::<BlobId>().is_err());
        assert!("not-hex".parse::<ContentId>().is_err());
    }

    #[test]
    fn serde_uses_hex_string() {
        let id = BlobId::from_bytes([7u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: BlobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
