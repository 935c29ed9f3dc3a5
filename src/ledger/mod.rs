// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger integration.
//!
//! The pipeline talks to the ledger through two narrow seams:
//!
//! - [`LedgerReader`] - read-only queries and simulation-only calls
//!   (blob registration status, content records, `seal_approve`)
//! - [`TransactionSigner`] - the wallet capability: signs personal messages
//!   for session keys and signs and executes ledger transactions
//!
//! `evm` binds both to an EVM registry contract with alloy. `memory` is an
//! in-process ledger for sandbox mode and tests.

pub mod evm;
#[cfg(any(test, feature = "dev"))]
pub mod memory;
pub mod signing;

use std::fmt;
use std::time::Duration;

use alloy::primitives::{Bytes, Signature};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::policy::{AccessPolicy, PolicyProofTx};
use crate::storage::BlobStatus;
use crate::types::{BlobId, ContentId, Identity};

pub use evm::{EvmLedger, EvmSigner, LedgerNetwork};
#[cfg(any(test, feature = "dev"))]
pub use memory::{InMemoryLedger, LedgerEvent, LedgerFault, MemoryWallet};

/// Content metadata as recorded on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_id: ContentId,
    /// Certified blob holding the ciphertext.
    pub blob_id: BlobId,
    /// Access policy evaluated by `seal_approve`.
    pub policy: AccessPolicy,
    pub creator: Identity,
    pub title: String,
    pub description: String,
    /// Serialized encryption key reference (wrapped key-server shares).
    pub sealed_key: Bytes,
    /// Payload AEAD nonce.
    pub nonce: Bytes,
}

/// Ledger view of a registered blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRegistration {
    pub blob_id: BlobId,
    pub owner: Identity,
    /// `Registered` or `Certified`; upload progress is not tracked on-chain.
    pub status: BlobStatus,
    pub size: u64,
    pub epochs: u32,
    pub deletable: bool,
}

/// A state-changing ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerTransaction {
    RegisterBlob {
        blob_id: BlobId,
        size: u64,
        epochs: u32,
        deletable: bool,
    },
    CertifyBlob {
        blob_id: BlobId,
    },
    CreateContent(Box<ContentRecord>),
}

impl LedgerTransaction {
    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerTransaction::RegisterBlob { .. } => "register_blob",
            LedgerTransaction::CertifyBlob { .. } => "certify_blob",
            LedgerTransaction::CreateContent(_) => "create_content",
        }
    }

    /// Blob the transaction concerns.
    pub fn blob_id(&self) -> BlobId {
        match self {
            LedgerTransaction::RegisterBlob { blob_id, .. }
            | LedgerTransaction::CertifyBlob { blob_id } => *blob_id,
            LedgerTransaction::CreateContent(record) => record.blob_id,
        }
    }
}

/// Digest of an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxDigest(pub String);

impl fmt::Display for TxDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The transaction may or may not have committed (timeout, dropped
    /// connection after broadcast). Re-query before retrying.
    #[error("Transaction outcome unknown for {kind}: {reason}")]
    Ambiguous { kind: &'static str, reason: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid ledger record: {0}")]
    InvalidRecord(String),
}

/// Read-only and simulation-only ledger access.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Current registration of a blob, if any.
    async fn blob_registration(
        &self,
        blob_id: &BlobId,
    ) -> Result<Option<BlobRegistration>, LedgerError>;

    /// Content record by id, if any.
    async fn content_record(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<ContentRecord>, LedgerError>;

    /// Evaluate `seal_approve` for the proof without mutating state.
    async fn simulate_seal_approve(&self, proof: &PolicyProofTx) -> Result<bool, LedgerError>;

    /// Cheap connectivity probe for readiness checks.
    async fn health(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Wallet capability injected by the caller.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Identity whose key this signer holds.
    fn address(&self) -> Identity;

    /// EIP-191 personal-message signature.
    async fn sign_personal_message(&self, message: &[u8]) -> Result<Signature, LedgerError>;

    /// Sign, submit and await inclusion of a transaction.
    async fn sign_and_execute(&self, tx: LedgerTransaction) -> Result<TxDigest, LedgerError>;
}

/// Execute `tx` with a deadline. An elapsed deadline is reported as
/// [`LedgerError::Ambiguous`]: the transaction may still land.
pub async fn execute_with_timeout(
    signer: &dyn TransactionSigner,
    tx: LedgerTransaction,
    timeout: Duration,
) -> Result<TxDigest, LedgerError> {
    let kind = tx.kind();
    match tokio::time::timeout(timeout, signer.sign_and_execute(tx)).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Ambiguous {
            kind,
            reason: format!("no outcome after {}s", timeout.as_secs_f32()),
        }),
    }
}
