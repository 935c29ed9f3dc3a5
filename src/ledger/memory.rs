// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process ledger for sandbox mode and tests.
//!
//! Enforces the same preconditions as the registry contract and records an
//! event log so tests can assert transaction ordering. Faults can be
//! scripted per transaction kind to exercise ambiguous outcomes.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Signature;
use alloy::signers::{local::PrivateKeySigner, Signer};
use async_trait::async_trait;

use super::{
    BlobRegistration, ContentRecord, LedgerError, LedgerReader, LedgerTransaction,
    TransactionSigner, TxDigest,
};
use crate::policy::PolicyProofTx;
use crate::storage::BlobStatus;
use crate::types::{BlobId, ContentId, Identity, PackageId};

/// Committed state change, in commit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    BlobRegistered(BlobId),
    BlobCertified(BlobId),
    ContentCreated(ContentId),
}

/// Scripted failure for the next transaction of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerFault {
    /// Commit, then report an unknown outcome (lost receipt).
    AmbiguousAfterCommit,
    /// Report an unknown outcome without committing (dropped broadcast).
    AmbiguousWithoutCommit,
    /// Report an unknown outcome; the transaction commits just before the
    /// next transaction of any kind (slow inclusion).
    AmbiguousLandsLater,
    /// Reject with the given reason.
    Reject(String),
}

#[derive(Default)]
struct LedgerState {
    blobs: HashMap<BlobId, BlobRegistration>,
    contents: HashMap<ContentId, ContentRecord>,
    events: Vec<LedgerEvent>,
    faults: HashMap<&'static str, VecDeque<LedgerFault>>,
    in_flight: Vec<(Identity, LedgerTransaction)>,
    executed: u64,
}

/// In-memory registry.
pub struct InMemoryLedger {
    package_id: PackageId,
    state: Mutex<LedgerState>,
    simulations: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new(package_id: PackageId) -> Self {
        Self {
            package_id,
            state: Mutex::new(LedgerState::default()),
            simulations: AtomicUsize::new(0),
        }
    }

    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Script a fault for the next transaction of `kind`.
    pub fn fail_next(&self, kind: &'static str, fault: LedgerFault) {
        self.state().faults.entry(kind).or_default().push_back(fault);
    }

    /// Committed events so far.
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state().events.clone()
    }

    /// Number of `seal_approve` simulations served.
    pub fn simulations(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }

    /// Apply a transaction on behalf of `sender`.
    pub fn execute(
        &self,
        sender: Identity,
        tx: LedgerTransaction,
    ) -> Result<TxDigest, LedgerError> {
        let kind = tx.kind();
        let mut state = self.state();
        for (earlier_sender, earlier) in std::mem::take(&mut state.in_flight) {
            if apply(&mut state, earlier_sender, earlier).is_ok() {
                state.executed += 1;
            }
        }
        let fault = state.faults.get_mut(kind).and_then(VecDeque::pop_front);

        match fault {
            Some(LedgerFault::Reject(reason)) => return Err(LedgerError::Rejected(reason)),
            Some(LedgerFault::AmbiguousWithoutCommit) => {
                return Err(LedgerError::Ambiguous {
                    kind,
                    reason: "connection dropped after broadcast".to_string(),
                })
            }
            Some(LedgerFault::AmbiguousLandsLater) => {
                state.in_flight.push((sender, tx));
                return Err(LedgerError::Ambiguous {
                    kind,
                    reason: "receipt wait timed out".to_string(),
                });
            }
            Some(LedgerFault::AmbiguousAfterCommit) => {
                apply(&mut state, sender, tx)?;
                return Err(LedgerError::Ambiguous {
                    kind,
                    reason: "receipt wait timed out".to_string(),
                });
            }
            None => {}
        }

        apply(&mut state, sender, tx)?;
        state.executed += 1;
        Ok(TxDigest(format!("mem-{}", state.executed)))
    }
}

fn apply(
    state: &mut LedgerState,
    sender: Identity,
    tx: LedgerTransaction,
) -> Result<(), LedgerError> {
    match tx {
        LedgerTransaction::RegisterBlob {
            blob_id,
            size,
            epochs,
            deletable,
        } => {
            if state.blobs.contains_key(&blob_id) {
                return Err(LedgerError::Rejected(format!(
                    "blob {blob_id} already registered"
                )));
            }
            state.blobs.insert(
                blob_id,
                BlobRegistration {
                    blob_id,
                    owner: sender,
                    status: BlobStatus::Registered,
                    size,
                    epochs,
                    deletable,
                },
            );
            state.events.push(LedgerEvent::BlobRegistered(blob_id));
        }
        LedgerTransaction::CertifyBlob { blob_id } => {
            let blob = state
                .blobs
                .get_mut(&blob_id)
                .ok_or_else(|| LedgerError::Rejected(format!("blob {blob_id} not registered")))?;
            if blob.owner != sender {
                return Err(LedgerError::Rejected(format!(
                    "{sender} does not own blob {blob_id}"
                )));
            }
            if blob.status != BlobStatus::Registered {
                return Err(LedgerError::Rejected(format!(
                    "blob {blob_id} is already {:?}",
                    blob.status
                )));
            }
            blob.status = BlobStatus::Certified;
            state.events.push(LedgerEvent::BlobCertified(blob_id));
        }
        LedgerTransaction::CreateContent(record) => {
            if record.creator != sender {
                return Err(LedgerError::Rejected(format!(
                    "{sender} cannot publish as {}",
                    record.creator
                )));
            }
            let certified = state
                .blobs
                .get(&record.blob_id)
                .is_some_and(|b| b.status == BlobStatus::Certified);
            if !certified {
                return Err(LedgerError::Rejected(format!(
                    "blob {} is not certified",
                    record.blob_id
                )));
            }
            if state.contents.contains_key(&record.content_id) {
                return Err(LedgerError::Rejected(format!(
                    "content {} already exists",
                    record.content_id
                )));
            }
            let content_id = record.content_id;
            state.contents.insert(content_id, *record);
            state.events.push(LedgerEvent::ContentCreated(content_id));
        }
    }
    Ok(())
}

#[async_trait]
impl LedgerReader for InMemoryLedger {
    async fn blob_registration(
        &self,
        blob_id: &BlobId,
    ) -> Result<Option<BlobRegistration>, LedgerError> {
        Ok(self.state().blobs.get(blob_id).cloned())
    }

    async fn content_record(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<ContentRecord>, LedgerError> {
        Ok(self.state().contents.get(content_id).cloned())
    }

    async fn simulate_seal_approve(&self, proof: &PolicyProofTx) -> Result<bool, LedgerError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        if proof.package_id != self.package_id || proof.session.owner() != proof.requester {
            return Ok(false);
        }
        let state = self.state();
        Ok(state
            .contents
            .get(&proof.content_id)
            .is_some_and(|record| record.policy.allows(&proof.requester)))
    }
}

/// Local wallet bound to an [`InMemoryLedger`].
#[derive(Clone)]
pub struct MemoryWallet {
    signer: PrivateKeySigner,
    ledger: Arc<InMemoryLedger>,
}

impl MemoryWallet {
    pub fn new(signer: PrivateKeySigner, ledger: Arc<InMemoryLedger>) -> Self {
        Self { signer, ledger }
    }

    pub fn random(ledger: Arc<InMemoryLedger>) -> Self {
        Self::new(PrivateKeySigner::random(), ledger)
    }
}

#[async_trait]
impl TransactionSigner for MemoryWallet {
    fn address(&self) -> Identity {
        self.signer.address()
    }

    async fn sign_personal_message(&self, message: &[u8]) -> Result<Signature, LedgerError> {
        self.signer
            .sign_message(message)
            .await
            .map_err(|e| LedgerError::Signing(e.to_string()))
    }

    async fn sign_and_execute(&self, tx: LedgerTransaction) -> Result<TxDigest, LedgerError> {
        self.ledger.execute(self.signer.address(), tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    fn register(blob_id: BlobId) -> LedgerTransaction {
        LedgerTransaction::RegisterBlob {
            blob_id,
            size: 10,
            epochs: 1,
            deletable: false,
        }
    }

    #[tokio::test]
    async fn certify_requires_owner_and_registration() {
        let ledger = Arc::new(InMemoryLedger::new(Address::ZERO));
        let owner = MemoryWallet::random(ledger.clone());
        let other = MemoryWallet::random(ledger.clone());
        let blob_id = BlobId::from_bytes([1; 32]);

        let certify = LedgerTransaction::CertifyBlob { blob_id };
        assert!(owner.sign_and_execute(certify.clone()).await.is_err());

        owner.sign_and_execute(register(blob_id)).await.unwrap();
        assert!(other.sign_and_execute(certify.clone()).await.is_err());
        owner.sign_and_execute(certify.clone()).await.unwrap();
        assert!(owner.sign_and_execute(certify).await.is_err());

        let reg = ledger.blob_registration(&blob_id).await.unwrap().unwrap();
        assert_eq!(reg.status, BlobStatus::Certified);
        assert_eq!(
            ledger.events(),
            vec![
                LedgerEvent::BlobRegistered(blob_id),
                LedgerEvent::BlobCertified(blob_id)
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let ledger = Arc::new(InMemoryLedger::new(Address::ZERO));
        let wallet = MemoryWallet::random(ledger);
        let blob_id = BlobId::from_bytes([2; 32]);
        wallet.sign_and_execute(register(blob_id)).await.unwrap();
        assert!(matches!(
            wallet.sign_and_execute(register(blob_id)).await,
            Err(LedgerError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn scripted_faults_apply_once() {
        let ledger = Arc::new(InMemoryLedger::new(Address::ZERO));
        let wallet = MemoryWallet::random(ledger.clone());
        let a = BlobId::from_bytes([3; 32]);
        let b = BlobId::from_bytes([4; 32]);

        ledger.fail_next("register_blob", LedgerFault::AmbiguousAfterCommit);
        ledger.fail_next("register_blob", LedgerFault::AmbiguousWithoutCommit);

        assert!(matches!(
            wallet.sign_and_execute(register(a)).await,
            Err(LedgerError::Ambiguous { .. })
        ));
        assert!(ledger.blob_registration(&a).await.unwrap().is_some());

        assert!(matches!(
            wallet.sign_and_execute(register(b)).await,
            Err(LedgerError::Ambiguous { .. })
        ));
        assert!(ledger.blob_registration(&b).await.unwrap().is_none());

        wallet.sign_and_execute(register(b)).await.unwrap();
    }

    #[tokio::test]
    async fn late_transaction_lands_before_the_next_one() {
        let ledger = Arc::new(InMemoryLedger::new(Address::ZERO));
        let wallet = MemoryWallet::random(ledger.clone());
        let blob_id = BlobId::from_bytes([5; 32]);

        ledger.fail_next("register_blob", LedgerFault::AmbiguousLandsLater);
        assert!(matches!(
            wallet.sign_and_execute(register(blob_id)).await,
            Err(LedgerError::Ambiguous { .. })
        ));
        assert!(ledger.blob_registration(&blob_id).await.unwrap().is_none());

        // the resubmission finds the earlier one already committed
        assert!(matches!(
            wallet.sign_and_execute(register(blob_id)).await,
            Err(LedgerError::Rejected(_))
        ));
        assert!(ledger.blob_registration(&blob_id).await.unwrap().is_some());
        assert_eq!(ledger.events(), vec![LedgerEvent::BlobRegistered(blob_id)]);
    }
}
