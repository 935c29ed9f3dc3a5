// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blob encoding.
//!
//! A blob body is the concatenation of its files, split into fixed-size
//! chunks. Each chunk is stored under the SHA-256 of its bytes. The
//! manifest lists file lengths and chunk ids; the SHA-256 of the serialized
//! manifest is the blob id, and the manifest itself is stored as one more
//! sliver under that id.
//!
//! Placement is round-robin: sliver `s` goes to nodes `(s + r) % n` for
//! `r in 0..replication`.

use std::sync::Arc;

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};

use crate::types::{content_address, BlobId, ChunkId};

/// Current manifest format.
pub const MANIFEST_VERSION: u8 = 1;

/// Blob manifest, stored alongside the chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u8,
    /// Body size in bytes.
    pub size: u64,
    /// SHA-256 of the reassembled body.
    pub content_hash: B256,
    pub chunk_size: u32,
    /// Length of each file, in body order.
    pub files: Vec<u64>,
    pub chunks: Vec<ChunkId>,
}

/// Manifest validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest does not hash to blob id {0}")]
    IdMismatch(BlobId),

    #[error("malformed manifest: {0}")]
    Malformed(String),

    #[error("chunk {index} does not match {expected}")]
    ChunkMismatch { index: usize, expected: ChunkId },

    #[error("body does not match manifest content hash")]
    ContentMismatch,
}

impl Manifest {
    /// Canonical serialized form; the blob id is its hash.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Every field serializes infallibly.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn blob_id(&self) -> BlobId {
        BlobId::from_bytes(content_address(&self.to_bytes()))
    }

    /// Parse manifest bytes fetched for `blob_id`, verifying the address.
    pub fn decode(blob_id: &BlobId, bytes: &[u8]) -> Result<Self, ManifestError> {
        if content_address(bytes) != *blob_id.as_bytes() {
            return Err(ManifestError::IdMismatch(*blob_id));
        }
        let manifest: Manifest =
            serde_json::from_slice(bytes).map_err(|e| ManifestError::Malformed(e.to_string()))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ManifestError::Malformed(format!(
                "unsupported version {}",
                manifest.version
            )));
        }
        if manifest.files.iter().sum::<u64>() != manifest.size {
            return Err(ManifestError::Malformed("file lengths do not add up".into()));
        }
        Ok(manifest)
    }

    /// Check a fetched chunk against its id.
    pub fn verify_chunk(&self, index: usize, bytes: &[u8]) -> Result<(), ManifestError> {
        let expected = self
            .chunks
            .get(index)
            .copied()
            .ok_or_else(|| ManifestError::Malformed(format!("no chunk {index}")))?;
        if ChunkId::digest(bytes) != expected {
            return Err(ManifestError::ChunkMismatch { index, expected });
        }
        Ok(())
    }

    /// Verify the reassembled body and split it back into files.
    pub fn split_files(&self, body: &[u8]) -> Result<Vec<Vec<u8>>, ManifestError> {
        if body.len() as u64 != self.size || content_address(body) != self.content_hash.0 {
            return Err(ManifestError::ContentMismatch);
        }
        let mut files = Vec::with_capacity(self.files.len());
        let mut offset = 0usize;
        for len in &self.files {
            let end = offset + *len as usize;
            files.push(body[offset..end].to_vec());
            offset = end;
        }
        Ok(files)
    }
}

/// A unit of storage: one chunk or the manifest.
#[derive(Debug, Clone)]
pub struct Sliver {
    pub id: ChunkId,
    pub bytes: Arc<[u8]>,
}

/// Output of encoding: what to store and where. Pure data, no I/O.
#[derive(Debug, Clone)]
pub struct EncodedPlan {
    blob_id: BlobId,
    manifest: Manifest,
    slivers: Vec<Sliver>,
    placements: Vec<Vec<usize>>,
    node_count: usize,
}

impl EncodedPlan {
    /// Encode `files` for `node_count` nodes.
    ///
    /// `chunk_size` and `node_count` must be non-zero; `replication` is
    /// clamped to `1..=node_count`.
    pub fn encode(files: &[&[u8]], chunk_size: usize, replication: usize, node_count: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let node_count = node_count.max(1);
        let replication = replication.clamp(1, node_count);

        let body: Vec<u8> = files.concat();
        let mut slivers: Vec<Sliver> = body
            .chunks(chunk_size)
            .map(|chunk| Sliver {
                id: ChunkId::digest(chunk),
                bytes: Arc::from(chunk),
            })
            .collect();

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            size: body.len() as u64,
            content_hash: B256::from(content_address(&body)),
            chunk_size: chunk_size as u32,
            files: files.iter().map(|f| f.len() as u64).collect(),
            chunks: slivers.iter().map(|s| s.id).collect(),
        };
        let manifest_bytes = manifest.to_bytes();
        let blob_id = BlobId::from_bytes(content_address(&manifest_bytes));
        slivers.push(Sliver {
            id: ChunkId::from(blob_id),
            bytes: Arc::from(manifest_bytes),
        });

        let placements = (0..slivers.len())
            .map(|s| (0..replication).map(|r| (s + r) % node_count).collect())
            .collect();

        Self {
            blob_id,
            manifest,
            slivers,
            placements,
            node_count,
        }
    }

    pub fn blob_id(&self) -> BlobId {
        self.blob_id
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Body size in bytes.
    pub fn size(&self) -> u64 {
        self.manifest.size
    }

    pub fn slivers(&self) -> &[Sliver] {
        &self.slivers
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Nodes holding sliver `index`.
    pub fn placement(&self, index: usize) -> &[usize] {
        self.placements.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sliver indices assigned to `node`.
    pub fn assignments(&self, node: usize) -> Vec<usize> {
        self.placements
            .iter()
            .enumerate()
            .filter(|(_, nodes)| nodes.contains(&node))
            .map(|(s, _)| s)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_deterministic_and_content_addressed() {
        let a = EncodedPlan::encode(&[b"hello world".as_slice()], 4, 2, 3);
        let b = EncodedPlan::encode(&[b"hello world".as_slice()], 4, 2, 3);
        assert_eq!(a.blob_id(), b.blob_id());
        assert_eq!(a.manifest().blob_id(), a.blob_id());

        let c = EncodedPlan::encode(&[b"hello worle".as_slice()], 4, 2, 3);
        assert_ne!(a.blob_id(), c.blob_id());
    }

    #[test]
    fn chunks_and_manifest_are_placed_round_robin() {
        let plan = EncodedPlan::encode(&[[7u8; 10].as_slice()], 4, 2, 3);
        // 3 chunks + manifest
        assert_eq!(plan.slivers().len(), 4);
        assert_eq!(plan.placement(0), &[0, 1]);
        assert_eq!(plan.placement(2), &[2, 0]);
        assert_eq!(plan.placement(3), &[0, 1]);
        assert_eq!(plan.assignments(2), vec![1, 2]);
        assert_eq!(plan.slivers()[3].id, ChunkId::from(plan.blob_id()));
    }

    #[test]
    fn replication_is_clamped_to_node_count() {
        let plan = EncodedPlan::encode(&[b"x".as_slice()], 4, 9, 2);
        assert_eq!(plan.placement(0).len(), 2);
    }

    #[test]
    fn manifest_round_trip_splits_files() {
        let plan = EncodedPlan::encode(&[b"abc".as_slice(), b"".as_slice(), b"defgh".as_slice()], 3, 1, 1);
        let manifest_bytes = &plan.slivers().last().unwrap().bytes;
        let manifest = Manifest::decode(&plan.blob_id(), manifest_bytes).unwrap();

        let body: Vec<u8> = plan.slivers()[..plan.slivers().len() - 1]
            .iter()
            .enumerate()
            .flat_map(|(i, s)| {
                manifest.verify_chunk(i, &s.bytes).unwrap();
                s.bytes.to_vec()
            })
            .collect();
        let files = manifest.split_files(&body).unwrap();
        assert_eq!(files, vec![b"abc".to_vec(), vec![], b"defgh".to_vec()]);
    }

    #[test]
    fn tampering_is_detected() {
        let plan = EncodedPlan::encode(&[b"abcdef".as_slice()], 3, 1, 1);
        let mut manifest_bytes = plan.slivers().last().unwrap().bytes.to_vec();
        manifest_bytes[0] ^= 1;
        assert_eq!(
            Manifest::decode(&plan.blob_id(), &manifest_bytes),
            Err(ManifestError::IdMismatch(plan.blob_id()))
        );

        let manifest = plan.manifest();
        assert!(matches!(
            manifest.verify_chunk(0, b"abX"),
            Err(ManifestError::ChunkMismatch { index: 0, .. })
        ));
        assert_eq!(
            manifest.split_files(b"abcdeX"),
            Err(ManifestError::ContentMismatch)
        );
    }

    #[test]
    fn empty_input_has_only_a_manifest() {
        let plan = EncodedPlan::encode(&[], 8, 1, 2);
        assert_eq!(plan.slivers().len(), 1);
        assert_eq!(plan.size(), 0);
    }
}
