// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Blob Storage
//!
//! Client for a content-addressed blob network with a four-stage write
//! protocol:
//!
//! ```text
//! encode (pure) ──► register (ledger tx) ──► upload (node quorum) ──► certify (ledger tx)
//! ```
//!
//! A blob is durable only once certified. Registered or uploaded blobs are
//! inert but still reserve paid storage; the optional [`UploadJournal`]
//! keeps track of them.
//!
//! ## Layout
//!
//! - `handle` - [`BlobHandle`] and the [`BlobStatus`] state machine
//! - `plan` - chunking, manifests and node placement
//! - `node` - storage node RPC
//! - `client` - the [`StorageClient`] driving the protocol and verified reads
//! - `cache` - LRU of verified blob contents
//! - `journal` - redb-backed upload journal

pub mod cache;
pub mod client;
pub mod handle;
pub mod journal;
#[cfg(any(test, feature = "dev"))]
pub mod memory;
pub mod node;
pub mod plan;

pub use cache::BlobCache;
pub use client::{StorageClient, StorageConfig};
pub use handle::{BlobHandle, BlobStatus, InvalidTransition};
pub use journal::{JournalEntry, JournalError, UploadJournal};
#[cfg(any(test, feature = "dev"))]
pub use memory::InMemoryStorageNode;
pub use node::{ChunkStat, HttpStorageNode, NodeError, StorageNode, StoreResponse};
pub use plan::{EncodedPlan, Manifest, ManifestError};
