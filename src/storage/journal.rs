// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Upload journal backed by redb (pure Rust, ACID).
//!
//! Records every blob handle transition together with the content it
//! belongs to, so operators can find blobs that were registered but never
//! certified or published. Registered storage is paid for whether or not
//! the upload finished.
//!
//! It also keeps content records that could not be written after their
//! blob was certified, so they can be published later even across
//! restarts.
//!
//! ## Table Layout
//!
//! - `uploads`: blob id (0x hex) → serialized [`JournalEntry`]
//! - `pending_records`: content id (0x hex) → serialized [`ContentRecord`]
//!
//! Pending records hold the sealed key exactly as the ledger record will
//! publish it, wrapped by the key servers. Plaintext keys are never stored.

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use super::handle::BlobStatus;
use crate::ledger::ContentRecord;
use crate::types::{BlobId, ContentId, Identity};

/// blob id → serialized JournalEntry (JSON bytes).
const UPLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("uploads");

/// content id → serialized ContentRecord (JSON bytes).
const PENDING_RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("pending_records");

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(BlobId),
}

pub type JournalResult<T> = Result<T, JournalError>;

/// Last known state of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub blob_id: BlobId,
    pub content_id: ContentId,
    pub owner: Identity,
    pub status: BlobStatus,
    pub epochs: u32,
    /// Whether the content record landed on the ledger.
    pub published: bool,
    pub updated_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Blobs that are still paid for but not reachable as content.
    pub fn is_incomplete(&self) -> bool {
        self.status != BlobStatus::Certified || !self.published
    }
}

/// Embedded upload journal.
pub struct UploadJournal {
    db: Database,
}

impl UploadJournal {
    /// Open (or create) the journal at `path`.
    pub fn open(path: &Path) -> JournalResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(UPLOADS)?;
            let _ = write_txn.open_table(PENDING_RECORDS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Record a transition. Status never moves backwards and the published
    /// flag is sticky.
    pub fn record(&self, entry: &JournalEntry) -> JournalResult<()> {
        let key = entry.blob_id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(UPLOADS)?;
            let existing: Option<JournalEntry> = match table.get(key.as_str())? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };

            let mut merged = entry.clone();
            if let Some(prev) = existing {
                merged.status = merged.status.max(prev.status);
                merged.published |= prev.published;
            }
            let json = serde_json::to_vec(&merged)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Flag the content record of a blob as written.
    pub fn mark_published(&self, blob_id: &BlobId) -> JournalResult<()> {
        let key = blob_id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(UPLOADS)?;
            let mut entry: JournalEntry = match table.get(key.as_str())? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(JournalError::NotFound(*blob_id)),
            };
            entry.published = true;
            entry.updated_at = Utc::now();
            let json = serde_json::to_vec(&entry)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get(&self, blob_id: &BlobId) -> JournalResult<Option<JournalEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(UPLOADS)?;
        let entry = match table.get(blob_id.to_string().as_str())? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(entry)
    }

    /// Uploads that never reached a published, certified state.
    pub fn incomplete(&self) -> JournalResult<Vec<JournalEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(UPLOADS)?;
        let mut entries = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let entry: JournalEntry = serde_json::from_slice(value.value())?;
            if entry.is_incomplete() {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.updated_at);
        Ok(entries)
    }

    /// Keep a content record whose ledger write failed.
    pub fn save_pending(&self, record: &ContentRecord) -> JournalResult<()> {
        let key = record.content_id.to_string();
        let json = serde_json::to_vec(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PENDING_RECORDS)?;
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn pending(&self, content_id: &ContentId) -> JournalResult<Option<ContentRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PENDING_RECORDS)?;
        let record = match table.get(content_id.to_string().as_str())? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(record)
    }

    /// Drop a pending record once it is on the ledger.
    pub fn clear_pending(&self, content_id: &ContentId) -> JournalResult<()> {
        let key = content_id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PENDING_RECORDS)?;
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    fn entry(status: BlobStatus) -> JournalEntry {
        JournalEntry {
            blob_id: BlobId::from_bytes([1; 32]),
            content_id: ContentId::from_bytes([2; 32]),
            owner: Address::repeat_byte(3),
            status,
            epochs: 5,
            published: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_never_regresses() {
        let dir = tempfile::tempdir().unwrap();
        let journal = UploadJournal::open(&dir.path().join("journal.redb")).unwrap();

        journal.record(&entry(BlobStatus::Uploaded)).unwrap();
        journal.record(&entry(BlobStatus::Registered)).unwrap();

        let stored = journal.get(&entry(BlobStatus::Registered).blob_id).unwrap().unwrap();
        assert_eq!(stored.status, BlobStatus::Uploaded);
    }

    #[test]
    fn incomplete_lists_unpublished_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let journal = UploadJournal::open(&dir.path().join("journal.redb")).unwrap();

        let mut done = entry(BlobStatus::Certified);
        done.blob_id = BlobId::from_bytes([9; 32]);
        journal.record(&done).unwrap();
        journal.mark_published(&done.blob_id).unwrap();

        journal.record(&entry(BlobStatus::Registered)).unwrap();

        let incomplete = journal.incomplete().unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].status, BlobStatus::Registered);
    }

    #[test]
    fn mark_published_requires_entry() {
        let dir = tempfile::tempdir().unwrap();
        let journal = UploadJournal::open(&dir.path().join("journal.redb")).unwrap();
        assert!(matches!(
            journal.mark_published(&BlobId::from_bytes([7; 32])),
            Err(JournalError::NotFound(_))
        ));
    }

    fn content_record() -> ContentRecord {
        use crate::policy::AccessPolicy;
        use alloy::primitives::Bytes;

        ContentRecord {
            content_id: ContentId::from_bytes([2; 32]),
            blob_id: BlobId::from_bytes([1; 32]),
            policy: AccessPolicy::new([Address::repeat_byte(4)], 1).unwrap(),
            creator: Address::repeat_byte(3),
            title: "pending".into(),
            description: String::new(),
            sealed_key: Bytes::from_static(b"wrapped"),
            nonce: Bytes::from_static(&[0; 12]),
        }
    }

    #[test]
    fn pending_records_survive_reopen_until_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.redb");
        let record = content_record();
        {
            let journal = UploadJournal::open(&path).unwrap();
            journal.save_pending(&record).unwrap();
        }

        let journal = UploadJournal::open(&path).unwrap();
        assert_eq!(journal.pending(&record.content_id).unwrap(), Some(record.clone()));

        journal.clear_pending(&record.content_id).unwrap();
        assert_eq!(journal.pending(&record.content_id).unwrap(), None);
        // clearing twice is harmless
        journal.clear_pending(&record.content_id).unwrap();
    }

    #[test]
    fn journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.redb");
        {
            let journal = UploadJournal::open(&path).unwrap();
            journal.record(&entry(BlobStatus::Uploaded)).unwrap();
        }
        let journal = UploadJournal::open(&path).unwrap();
        assert_eq!(journal.incomplete().unwrap().len(), 1);
    }
}
