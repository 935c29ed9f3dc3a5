// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blob lifecycle state machine.
//!
//! ```text
//! Registered ──upload──► Uploaded ──certify──► Certified
//! ```
//!
//! Only the immediate successor is accepted; every other transition is an
//! [`InvalidTransition`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ledger::BlobRegistration;
use crate::types::{BlobId, Identity};

/// Write-protocol status of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BlobStatus {
    Registered,
    Uploaded,
    Certified,
}

impl BlobStatus {
    /// The only state this one may advance to.
    pub fn successor(self) -> Option<BlobStatus> {
        match self {
            BlobStatus::Registered => Some(BlobStatus::Uploaded),
            BlobStatus::Uploaded => Some(BlobStatus::Certified),
            BlobStatus::Certified => None,
        }
    }

    pub fn can_advance_to(self, next: BlobStatus) -> bool {
        self.successor() == Some(next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BlobStatus::Registered => "registered",
            BlobStatus::Uploaded => "uploaded",
            BlobStatus::Certified => "certified",
        }
    }
}

impl std::fmt::Display for BlobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid blob transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: BlobStatus,
    pub to: BlobStatus,
}

/// A registered blob and its write-protocol status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobHandle {
    blob_id: BlobId,
    owner: Identity,
    epochs: u32,
    deletable: bool,
    size: u64,
    status: BlobStatus,
}

impl BlobHandle {
    /// Handle for a freshly registered blob.
    pub fn registered(
        blob_id: BlobId,
        owner: Identity,
        epochs: u32,
        deletable: bool,
        size: u64,
    ) -> Self {
        Self {
            blob_id,
            owner,
            epochs,
            deletable,
            size,
            status: BlobStatus::Registered,
        }
    }

    /// Rebuild a handle from the ledger view.
    pub fn from_registration(registration: &BlobRegistration) -> Self {
        Self {
            blob_id: registration.blob_id,
            owner: registration.owner,
            epochs: registration.epochs,
            deletable: registration.deletable,
            size: registration.size,
            status: registration.status,
        }
    }

    pub fn blob_id(&self) -> BlobId {
        self.blob_id
    }

    pub fn owner(&self) -> Identity {
        self.owner
    }

    pub fn epochs(&self) -> u32 {
        self.epochs
    }

    pub fn deletable(&self) -> bool {
        self.deletable
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn status(&self) -> BlobStatus {
        self.status
    }

    /// Move to `next`, which must be the successor of the current status.
    pub fn advance(self, next: BlobStatus) -> Result<Self, InvalidTransition> {
        if !self.status.can_advance_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(Self {
            status: next,
            ..self
        })
    }
}
