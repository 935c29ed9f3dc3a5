// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Content Manager
//!
//! Orchestrates the full upload and retrieval pipelines.
//!
//! ## Upload
//!
//! ```text
//! encrypt ─► encode ─► register ─► upload ─► certify ─► create_content
//! Encrypted  Encoded   Registered  Uploaded  Certified  Recorded
//! ```
//!
//! Stages run strictly in order for one blob. A failure before `Certified`
//! leaves nothing published. Once the blob is certified the content record
//! is retried against the same blob; if it still cannot be written the
//! caller gets [`PipelineError::RecordPending`] with everything
//! [`ContentManager::publish_record`] needs. The manager also keeps the
//! pending record (in the journal when one is configured), so
//! [`ContentManager::publish_pending`] can finish it by content id alone.
//!
//! Ambiguous ledger outcomes are settled by re-reading blob status before
//! any retry, and at most one ledger transaction is in flight per blob. A
//! resubmission rejected by the ledger is checked once more, since the
//! earlier transaction may have landed in between.
//!
//! ## Retrieval
//!
//! Authorization runs before any blob I/O: enforcer, ledger record, verified
//! blob read, threshold decryption. A denial for content that has no ledger
//! record is reported as [`PipelineError::ContentNotFound`].


use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::encryption::{EncryptedPayload, EncryptionKeyRef, EncryptionService};
use crate::error::PipelineError;
use crate::ledger::{
    execute_with_timeout, ContentRecord, LedgerError, LedgerReader, LedgerTransaction,
    TransactionSigner,
};
use crate::policy::{AccessDecision, AccessPolicy, AccessPolicyEnforcer};
use crate::retry::{with_backoff, RetryPolicy};
use crate::session::SessionKey;
use crate::storage::{
    BlobHandle, BlobStatus, EncodedPlan, JournalEntry, StorageClient, UploadJournal,
};
use crate::types::{BlobId, ContentId, Identity};

/// Content to publish.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub title: String,
    pub description: String,
    pub data: Vec<u8>,
    pub recipients: Vec<Identity>,
    pub threshold: u32,
    /// Storage lifetime; the storage default when `None`.
    pub epochs: Option<u32>,
    pub deletable: bool,
}

/// Upload progress, reported in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    Encrypted,
    Encoded,
    Registered,
    Uploaded,
    Certified,
    Recorded,
}

/// A certified blob whose content record is not on the ledger yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRecord {
    pub record: ContentRecord,
    /// Last failure while writing the record.
    pub reason: String,
}

// =============================================================================
// Per-blob ledger locks
// =============================================================================

/// Blob ids with a ledger transaction in flight.
#[derive(Default)]
pub struct BlobLocks {
    held: Mutex<HashSet<BlobId>>,
}

/// Releases its blob on drop.
pub struct BlobLockGuard<'a> {
    locks: &'a BlobLocks,
    blob_id: BlobId,
}

impl BlobLocks {
    /// Take the lock for `blob_id`, or fail with `LedgerBusy`.
    pub fn acquire(&self, blob_id: BlobId) -> Result<BlobLockGuard<'_>, PipelineError> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if !held.insert(blob_id) {
            return Err(PipelineError::LedgerBusy(blob_id));
        }
        Ok(BlobLockGuard {
            locks: self,
            blob_id,
        })
    }

    pub fn is_held(&self, blob_id: &BlobId) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(blob_id)
    }
}

impl Drop for BlobLockGuard<'_> {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.blob_id);
    }
}

// =============================================================================
// ContentManager
// =============================================================================

/// Upload and retrieval orchestrator.
pub struct ContentManager {
    encryption: Arc<EncryptionService>,
    storage: Arc<StorageClient>,
    enforcer: AccessPolicyEnforcer,
    ledger: Arc<dyn LedgerReader>,
    locks: BlobLocks,
    pending: Mutex<HashMap<ContentId, PendingRecord>>,
    journal: Option<Arc<UploadJournal>>,
    retry: RetryPolicy,
}

impl ContentManager {
    pub fn new(
        encryption: Arc<EncryptionService>,
        storage: Arc<StorageClient>,
        enforcer: AccessPolicyEnforcer,
        ledger: Arc<dyn LedgerReader>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            encryption,
            storage,
            enforcer,
            ledger,
            locks: BlobLocks::default(),
            pending: Mutex::new(HashMap::new()),
            journal: None,
            retry,
        }
    }

    /// Record every blob transition in `journal`.
    pub fn with_journal(mut self, journal: Arc<UploadJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    pub fn encryption(&self) -> &EncryptionService {
        &self.encryption
    }

    pub fn enforcer(&self) -> &AccessPolicyEnforcer {
        &self.enforcer
    }

    pub fn locks(&self) -> &BlobLocks {
        &self.locks
    }

    fn ledger_timeout(&self) -> Duration {
        self.storage.config().ledger_timeout
    }

    /// Publish content as `signer`.
    pub async fn upload(
        &self,
        request: UploadRequest,
        signer: &dyn TransactionSigner,
    ) -> Result<ContentRecord, PipelineError> {
        self.upload_with_progress(request, signer, |_| {}).await
    }

    /// [`upload`](Self::upload), reporting each completed stage.
    pub async fn upload_with_progress(
        &self,
        request: UploadRequest,
        signer: &dyn TransactionSigner,
        mut on_stage: impl FnMut(UploadStage) + Send,
    ) -> Result<ContentRecord, PipelineError> {
        let policy = AccessPolicy::new(request.recipients.iter().copied(), request.threshold)?;
        let epochs = request
            .epochs
            .unwrap_or(self.storage.config().default_epochs);
        let content_id = ContentId::generate();

        let payload = self.encryption.encrypt(&request.data, &policy).await?;
        on_stage(UploadStage::Encrypted);

        let plan = self.storage.encode(&[payload.ciphertext()])?;
        on_stage(UploadStage::Encoded);

        let blob_id = plan.blob_id();
        let _guard = self.locks.acquire(blob_id)?;
        info!(%content_id, %blob_id, size = plan.size(), "Upload started");

        let mut handle = self
            .register_resolved(&plan, signer, epochs, request.deletable)
            .await?;
        self.journal(&handle, content_id, false);
        on_stage(UploadStage::Registered);

        if handle.status() != BlobStatus::Certified {
            handle = self.storage.upload(handle, &plan).await?;
            self.journal(&handle, content_id, false);
            on_stage(UploadStage::Uploaded);

            handle = self.certify_resolved(handle, signer).await?;
            self.journal(&handle, content_id, false);
        }
        on_stage(UploadStage::Certified);

        let record = ContentRecord {
            content_id,
            blob_id,
            policy,
            creator: signer.address(),
            title: request.title,
            description: request.description,
            sealed_key: Bytes::from(payload.key_ref().to_bytes()?),
            nonce: Bytes::from(payload.nonce().to_vec()),
        };
        let record = self.write_record(record, signer).await?;
        self.mark_published(&blob_id);
        on_stage(UploadStage::Recorded);

        info!(%content_id, %blob_id, "Content published");
        Ok(record)
    }

    /// Finish a [`PipelineError::RecordPending`] upload.
    pub async fn publish_record(
        &self,
        pending: PendingRecord,
        signer: &dyn TransactionSigner,
    ) -> Result<ContentRecord, PipelineError> {
        let record = pending.record;
        if record.creator != signer.address() {
            return Err(PipelineError::InvalidInput(format!(
                "record is created by {}, not {}",
                record.creator,
                signer.address()
            )));
        }
        let blob_id = record.blob_id;
        let _guard = self.locks.acquire(blob_id)?;

        match self.storage.resolve(&blob_id).await? {
            Some(registration) if registration.status == BlobStatus::Certified => {}
            Some(registration) => {
                return Err(PipelineError::InvalidInput(format!(
                    "blob {blob_id} is {}, not certified",
                    registration.status
                )))
            }
            None => {
                return Err(PipelineError::InvalidInput(format!(
                    "blob {blob_id} is not registered"
                )))
            }
        }

        let record = self.write_record(record, signer).await?;
        self.mark_published(&blob_id);
        self.forget_pending(&record.content_id);
        info!(content_id = %record.content_id, %blob_id, "Pending record published");
        Ok(record)
    }

    /// Pending record kept for `content_id`, if any.
    pub fn pending_record(&self, content_id: &ContentId) -> Option<PendingRecord> {
        let held = self
            .pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(content_id)
            .cloned();
        if held.is_some() {
            return held;
        }

        let journal = self.journal.as_ref()?;
        match journal.pending(content_id) {
            Ok(record) => record.map(|record| PendingRecord {
                record,
                reason: "recovered from the upload journal".to_string(),
            }),
            Err(e) => {
                warn!(%content_id, error = %e, "Upload journal read failed");
                None
            }
        }
    }

    /// Finish a kept pending record by content id. Content that is already
    /// on the ledger is returned as-is.
    pub async fn publish_pending(
        &self,
        content_id: &ContentId,
        signer: &dyn TransactionSigner,
    ) -> Result<ContentRecord, PipelineError> {
        match self.pending_record(content_id) {
            Some(pending) => self.publish_record(pending, signer).await,
            None => self.content_record(content_id).await,
        }
    }

    /// Decrypt content for `requester`.
    pub async fn retrieve(
        &self,
        content_id: &ContentId,
        requester: Identity,
        session: &SessionKey,
    ) -> Result<Vec<u8>, PipelineError> {
        let proof = match self.enforcer.check(content_id, requester, session).await? {
            AccessDecision::Authorized { proof } => proof,
            AccessDecision::Denied { reason } => {
                // metadata only; denial still precedes any blob I/O
                if matches!(self.lookup_record(content_id).await, Ok(None)) {
                    return Err(PipelineError::ContentNotFound(*content_id));
                }
                return Err(PipelineError::AccessDenied {
                    reason: reason.to_string(),
                });
            }
        };

        let record = self.content_record(content_id).await?;
        let blob_id = record.blob_id;
        let ciphertext = self.storage.read(&blob_id).await?;

        let key_ref = EncryptionKeyRef::from_bytes(&record.sealed_key)
            .map_err(|e| PipelineError::integrity(&blob_id, format!("sealed key: {e}")))?;
        let payload = EncryptedPayload::from_parts(ciphertext, key_ref, &record.nonce)
            .map_err(|e| PipelineError::integrity(&blob_id, e))?;

        let plaintext = self
            .encryption
            .decrypt(&payload, session, &proof.to_bytes()?)
            .await?;
        info!(%content_id, %requester, size = plaintext.len(), "Content retrieved");
        Ok(plaintext)
    }

    /// Ledger record for `content_id`.
    pub async fn content_record(
        &self,
        content_id: &ContentId,
    ) -> Result<ContentRecord, PipelineError> {
        self.lookup_record(content_id)
            .await?
            .ok_or(PipelineError::ContentNotFound(*content_id))
    }

    /// Journaled uploads that never finished. Empty without a journal.
    pub fn incomplete_uploads(&self) -> Result<Vec<JournalEntry>, PipelineError> {
        match &self.journal {
            Some(journal) => Ok(journal.incomplete()?),
            None => Ok(Vec::new()),
        }
    }

    // =========================================================================
    // Ledger steps
    // =========================================================================

    async fn lookup_record(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<ContentRecord>, PipelineError> {
        tokio::time::timeout(self.ledger_timeout(), self.ledger.content_record(content_id))
            .await
            .map_err(|_| LedgerError::Rpc(format!("record query for {content_id} timed out")))?
            .map_err(PipelineError::from)
    }

    /// Register, settling ambiguous outcomes from ledger state.
    async fn register_resolved(
        &self,
        plan: &EncodedPlan,
        signer: &dyn TransactionSigner,
        epochs: u32,
        deletable: bool,
    ) -> Result<BlobHandle, PipelineError> {
        let blob_id = plan.blob_id();
        let mut attempt = 1;
        loop {
            let err = match self.storage.register(plan, signer, epochs, deletable).await {
                Ok(handle) => return Ok(handle),
                Err(e) if e.requires_resolution() => e,
                Err(e) if attempt > 1 => {
                    return self.registration_after_rejection(&blob_id, signer, e).await
                }
                Err(e) => return Err(e),
            };

            match self.storage.resolve(&blob_id).await {
                Ok(Some(registration)) if registration.owner == signer.address() => {
                    info!(%blob_id, status = %registration.status, "Ambiguous registration landed");
                    return Ok(BlobHandle::from_registration(&registration));
                }
                Ok(Some(registration)) => {
                    return Err(LedgerError::Rejected(format!(
                        "blob {blob_id} is registered to {}",
                        registration.owner
                    ))
                    .into())
                }
                Ok(None) if self.retry.allows_retry(attempt) => {
                    let delay = self.retry.backoff(attempt);
                    warn!(%blob_id, attempt, "Registration did not land, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(None) => return Err(err),
                Err(e) => {
                    warn!(%blob_id, error = %e, "Could not resolve ambiguous registration");
                    return Err(err);
                }
            }
        }
    }

    /// Certify, settling ambiguous outcomes from ledger state.
    async fn certify_resolved(
        &self,
        handle: BlobHandle,
        signer: &dyn TransactionSigner,
    ) -> Result<BlobHandle, PipelineError> {
        let blob_id = handle.blob_id();
        let mut attempt = 1;
        loop {
            let err = match self.storage.certify(handle.clone(), signer).await {
                Ok(certified) => return Ok(certified),
                Err(e) if e.requires_resolution() => e,
                Err(e) if attempt > 1 => {
                    return self.certification_after_rejection(handle, e).await
                }
                Err(e) => return Err(e),
            };

            match self.storage.resolve(&blob_id).await {
                Ok(Some(registration)) if registration.status == BlobStatus::Certified => {
                    info!(%blob_id, "Ambiguous certification landed");
                    return Ok(handle.advance(BlobStatus::Certified)?);
                }
                Ok(_) if self.retry.allows_retry(attempt) => {
                    let delay = self.retry.backoff(attempt);
                    warn!(%blob_id, attempt, "Certification did not land, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(_) => return Err(err),
                Err(e) => {
                    warn!(%blob_id, error = %e, "Could not resolve ambiguous certification");
                    return Err(err);
                }
            }
        }
    }

    /// A resubmitted registration was rejected; the first one may have
    /// landed after the last re-query.
    async fn registration_after_rejection(
        &self,
        blob_id: &BlobId,
        signer: &dyn TransactionSigner,
        err: PipelineError,
    ) -> Result<BlobHandle, PipelineError> {
        match self.storage.resolve(blob_id).await {
            Ok(Some(registration)) if registration.owner == signer.address() => {
                info!(%blob_id, status = %registration.status, "Earlier registration landed");
                Ok(BlobHandle::from_registration(&registration))
            }
            Ok(_) => Err(err),
            Err(e) => {
                warn!(%blob_id, error = %e, "Could not resolve rejected registration");
                Err(err)
            }
        }
    }

    /// A resubmitted certification was rejected; the first one may have
    /// landed after the last re-query.
    async fn certification_after_rejection(
        &self,
        handle: BlobHandle,
        err: PipelineError,
    ) -> Result<BlobHandle, PipelineError> {
        let blob_id = handle.blob_id();
        match self.storage.resolve(&blob_id).await {
            Ok(Some(registration)) if registration.status == BlobStatus::Certified => {
                info!(%blob_id, "Earlier certification landed");
                Ok(handle.advance(BlobStatus::Certified)?)
            }
            Ok(_) => Err(err),
            Err(e) => {
                warn!(%blob_id, error = %e, "Could not resolve rejected certification");
                Err(err)
            }
        }
    }

    /// Write the record with backoff; idempotent by content id.
    async fn write_record(
        &self,
        record: ContentRecord,
        signer: &dyn TransactionSigner,
    ) -> Result<ContentRecord, PipelineError> {
        let result = with_backoff(
            &self.retry,
            "record_write",
            |_| self.try_write_record(&record, signer),
            |e: &PipelineError| e.is_retryable() || e.requires_resolution(),
        )
        .await;

        let err = match result {
            Ok(written) => return Ok(written),
            Err(e) => e,
        };

        // a rejected resubmission may mean an earlier attempt landed late
        if let Ok(Some(existing)) = self.lookup_record(&record.content_id).await {
            if existing.blob_id == record.blob_id {
                info!(content_id = %record.content_id, "Earlier record write landed");
                return Ok(existing);
            }
        }

        warn!(
            content_id = %record.content_id,
            blob_id = %record.blob_id,
            error = %err,
            "Content record not written"
        );
        let pending = PendingRecord {
            record,
            reason: err.to_string(),
        };
        self.keep_pending(&pending);
        Err(PipelineError::RecordPending(Box::new(pending)))
    }

    async fn try_write_record(
        &self,
        record: &ContentRecord,
        signer: &dyn TransactionSigner,
    ) -> Result<ContentRecord, PipelineError> {
        if let Some(existing) = self.lookup_record(&record.content_id).await? {
            if existing.blob_id == record.blob_id {
                debug!(content_id = %record.content_id, "Record already on ledger");
                return Ok(existing);
            }
            return Err(LedgerError::Rejected(format!(
                "content {} already points at blob {}",
                record.content_id, existing.blob_id
            ))
            .into());
        }

        let tx = LedgerTransaction::CreateContent(Box::new(record.clone()));
        let digest = execute_with_timeout(signer, tx, self.ledger_timeout())
            .await
            .map_err(|e| PipelineError::from_ledger(record.blob_id, e))?;
        info!(content_id = %record.content_id, tx = %digest, "Content record written");
        Ok(record.clone())
    }

    // =========================================================================
    // Journal
    // =========================================================================

    // Journal writes are best effort; the ledger is authoritative.
    fn journal(&self, handle: &BlobHandle, content_id: ContentId, published: bool) {
        let Some(journal) = &self.journal else {
            return;
        };
        let entry = JournalEntry {
            blob_id: handle.blob_id(),
            content_id,
            owner: handle.owner(),
            status: handle.status(),
            epochs: handle.epochs(),
            published,
            updated_at: Utc::now(),
        };
        if let Err(e) = journal.record(&entry) {
            warn!(blob_id = %handle.blob_id(), error = %e, "Upload journal write failed");
        }
    }

    fn keep_pending(&self, pending: &PendingRecord) {
        let content_id = pending.record.content_id;
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(content_id, pending.clone());
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.save_pending(&pending.record) {
                warn!(%content_id, error = %e, "Upload journal write failed");
            }
        }
    }

    fn forget_pending(&self, content_id: &ContentId) {
        self.pending
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(content_id);
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.clear_pending(content_id) {
                warn!(%content_id, error = %e, "Upload journal write failed");
            }
        }
    }

    fn mark_published(&self, blob_id: &BlobId) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(e) = journal.mark_published(blob_id) {
            warn!(%blob_id, error = %e, "Upload journal write failed");
        }
    }
}
