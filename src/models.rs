// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the gateway. Addresses and identifiers
//! travel as `0x`-prefixed hex strings, binary payloads as standard base64.
//!
//! ## Model Categories
//!
//! - **Sessions**: unsigned session keys and their completion
//! - **Content**: upload, metadata, retrieval
//! - **Uploads**: journaled uploads that never finished

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use alloy::primitives::Bytes;

use crate::content::UploadStage;
use crate::ledger::ContentRecord;
use crate::session::{SessionKey, UnsignedSessionKey};
use crate::storage::{BlobStatus, JournalEntry};
use crate::types::{BlobId, ContentId, Identity};

// =============================================================================
// Session Models
// =============================================================================

/// Request a session key for `owner`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    #[schema(value_type = String, example = "0x742d35Cc6634C0532925a3b844Bc9e7595f4aB12")]
    pub owner: Identity,
    /// Lifetime in minutes.
    pub ttl_minutes: u32,
}

/// An unsigned session key plus the exact message the wallet must sign.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session: UnsignedSessionKey,
    pub personal_message: String,
    pub expires_at: DateTime<Utc>,
}

/// Attach the wallet's signature to an unsigned key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteSessionRequest {
    pub session: UnsignedSessionKey,
    /// 65-byte EIP-191 signature, hex.
    #[schema(value_type = String)]
    pub signature: Bytes,
}

// =============================================================================
// Content Models
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadContentRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Plaintext, base64.
    pub data: String,
    #[schema(value_type = Vec<String>)]
    pub recipients: Vec<Identity>,
    pub threshold: u32,
    #[serde(default)]
    pub epochs: Option<u32>,
    #[serde(default)]
    pub deletable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadContentResponse {
    #[schema(value_type = String)]
    pub content_id: ContentId,
    #[schema(value_type = String)]
    pub blob_id: BlobId,
    #[schema(value_type = String)]
    pub creator: Identity,
    /// Stages completed, in order.
    pub stages: Vec<UploadStage>,
}

/// Public view of a content record. The sealed key is never exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContentMetadata {
    #[schema(value_type = String)]
    pub content_id: ContentId,
    #[schema(value_type = String)]
    pub blob_id: BlobId,
    #[schema(value_type = String)]
    pub creator: Identity,
    pub title: String,
    pub description: String,
    #[schema(value_type = Vec<String>)]
    pub recipients: Vec<Identity>,
    pub threshold: u32,
}

impl From<ContentRecord> for ContentMetadata {
    fn from(record: ContentRecord) -> Self {
        Self {
            content_id: record.content_id,
            blob_id: record.blob_id,
            creator: record.creator,
            title: record.title,
            description: record.description,
            recipients: record.policy.recipients().iter().copied().collect(),
            threshold: record.policy.threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetrieveContentRequest {
    #[schema(value_type = String)]
    pub requester: Identity,
    pub session: SessionKey,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetrieveContentResponse {
    #[schema(value_type = String)]
    pub content_id: ContentId,
    /// Plaintext, base64.
    pub data: String,
}

// =============================================================================
// Upload Journal Models
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IncompleteUpload {
    #[schema(value_type = String)]
    pub blob_id: BlobId,
    #[schema(value_type = String)]
    pub content_id: ContentId,
    #[schema(value_type = String)]
    pub owner: Identity,
    pub status: BlobStatus,
    pub epochs: u32,
    /// Whether the content record landed.
    pub published: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<JournalEntry> for IncompleteUpload {
    fn from(entry: JournalEntry) -> Self {
        Self {
            blob_id: entry.blob_id,
            content_id: entry.content_id,
            owner: entry.owner,
            status: entry.status,
            epochs: entry.epochs,
            published: entry.published,
            updated_at: entry.updated_at,
        }
    }
}
