// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Policies
//!
//! An [`AccessPolicy`] names who may decrypt a piece of content. The
//! [`AccessPolicyEnforcer`] decides, before any blob is fetched, whether a
//! requester holding a session key is authorized: it validates the session
//! locally, then asks the ledger to simulate the registry's `sealApprove`
//! check. Nothing here mutates ledger state.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::ledger::{LedgerError, LedgerReader};
use crate::session::SessionKey;
use crate::types::{ContentId, Identity, PackageId};

/// Policy validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("policy has no recipients")]
    NoRecipients,

    #[error("threshold {threshold} must be between 1 and {recipients}")]
    InvalidThreshold { threshold: u32, recipients: usize },

    #[error("threshold {threshold} exceeds the {servers} configured key servers")]
    ThresholdExceedsKeyServers { threshold: u32, servers: usize },
}

/// Recipients allowed to decrypt, plus the key-server reconstruction
/// threshold. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy")]
pub struct AccessPolicy {
    recipients: BTreeSet<Identity>,
    threshold: u32,
}

#[derive(Deserialize)]
struct RawPolicy {
    recipients: Vec<Identity>,
    threshold: u32,
}

impl TryFrom<RawPolicy> for AccessPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        AccessPolicy::new(raw.recipients, raw.threshold)
    }
}

impl AccessPolicy {
    /// Build a policy; `1 <= threshold <= |recipients|`.
    pub fn new(
        recipients: impl IntoIterator<Item = Identity>,
        threshold: u32,
    ) -> Result<Self, PolicyError> {
        let recipients: BTreeSet<Identity> = recipients.into_iter().collect();
        if recipients.is_empty() {
            return Err(PolicyError::NoRecipients);
        }
        if threshold == 0 || threshold as usize > recipients.len() {
            return Err(PolicyError::InvalidThreshold {
                threshold,
                recipients: recipients.len(),
            });
        }
        Ok(Self {
            recipients,
            threshold,
        })
    }

    pub fn recipients(&self) -> &BTreeSet<Identity> {
        &self.recipients
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn allows(&self, identity: &Identity) -> bool {
        self.recipients.contains(identity)
    }
}

/// The transaction simulated against `sealApprove`; also the proof key
/// servers re-check before releasing shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyProofTx {
    pub package_id: PackageId,
    pub content_id: ContentId,
    pub requester: Identity,
    pub session: SessionKey,
}

impl PolicyProofTx {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The session belongs to someone other than the requester.
    RequesterMismatch,
    /// The session signature does not verify.
    InvalidSession,
    /// The session is scoped to another package.
    WrongPackage,
    /// The on-chain policy check returned false.
    PolicyRejected,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DenialReason::RequesterMismatch => "session owner is not the requester",
            DenialReason::InvalidSession => "session signature is invalid",
            DenialReason::WrongPackage => "session is scoped to another package",
            DenialReason::PolicyRejected => "access policy rejected the requester",
        };
        f.write_str(text)
    }
}

/// Outcome of [`AccessPolicyEnforcer::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Authorized { proof: PolicyProofTx },
    Denied { reason: DenialReason },
}

impl AccessDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AccessDecision::Authorized { .. })
    }
}

/// Pre-decryption authorization gate.
#[derive(Clone)]
pub struct AccessPolicyEnforcer {
    ledger: Arc<dyn LedgerReader>,
    package_id: PackageId,
    timeout: Duration,
}

impl AccessPolicyEnforcer {
    pub fn new(ledger: Arc<dyn LedgerReader>, package_id: PackageId, timeout: Duration) -> Self {
        Self {
            ledger,
            package_id,
            timeout,
        }
    }

    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    /// Decide whether `requester` may decrypt `content_id`.
    pub async fn check(
        &self,
        content_id: &ContentId,
        requester: Identity,
        session: &SessionKey,
    ) -> Result<AccessDecision, PipelineError> {
        self.check_at(content_id, requester, session, Utc::now()).await
    }

    /// [`check`](Self::check) against an explicit clock reading.
    pub async fn check_at(
        &self,
        content_id: &ContentId,
        requester: Identity,
        session: &SessionKey,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision, PipelineError> {
        if !session.is_valid_at(now) {
            return Err(PipelineError::SessionExpired {
                expired_at: session.expires_at(),
            });
        }

        if let Some(reason) = self.local_denial(requester, session) {
            tracing::info!(%content_id, %requester, %reason, "Access denied");
            return Ok(AccessDecision::Denied { reason });
        }

        let proof = PolicyProofTx {
            package_id: self.package_id,
            content_id: *content_id,
            requester,
            session: session.clone(),
        };

        let approved = tokio::time::timeout(self.timeout, self.ledger.simulate_seal_approve(&proof))
            .await
            .map_err(|_| {
                PipelineError::Ledger(LedgerError::Rpc("sealApprove simulation timed out".into()))
            })??;

        if approved {
            tracing::debug!(%content_id, %requester, "Access authorized");
            Ok(AccessDecision::Authorized { proof })
        } else {
            let reason = DenialReason::PolicyRejected;
            tracing::info!(%content_id, %requester, %reason, "Access denied");
            Ok(AccessDecision::Denied { reason })
        }
    }

    fn local_denial(&self, requester: Identity, session: &SessionKey) -> Option<DenialReason> {
        if session.owner() != requester {
            return Some(DenialReason::RequesterMismatch);
        }
        if session.package_id() != self.package_id {
            return Some(DenialReason::WrongPackage);
        }
        session
            .verify_signature()
            .err()
            .map(|_| DenialReason::InvalidSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{
        ContentRecord, InMemoryLedger, LedgerTransaction, MemoryWallet, TransactionSigner,
    };
    use crate::session::SessionKeyManager;
    use crate::types::BlobId;
    use alloy::primitives::{Address, Bytes};

    const PACKAGE: Address = Address::repeat_byte(0x11);

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        enforcer: AccessPolicyEnforcer,
        creator: MemoryWallet,
        content_id: ContentId,
    }

    async fn publish(recipients: &[Identity]) -> Fixture {
        let ledger = Arc::new(InMemoryLedger::new(PACKAGE));
        let creator = MemoryWallet::random(ledger.clone());
        let blob_id = BlobId::from_bytes([5; 32]);
        let content_id = ContentId::generate();

        creator
            .sign_and_execute(LedgerTransaction::RegisterBlob {
                blob_id,
                size: 1,
                epochs: 1,
                deletable: false,
            })
            .await
            .unwrap();
        creator
            .sign_and_execute(LedgerTransaction::CertifyBlob { blob_id })
            .await
            .unwrap();
        creator
            .sign_and_execute(LedgerTransaction::CreateContent(Box::new(ContentRecord {
                content_id,
                blob_id,
                policy: AccessPolicy::new(recipients.iter().copied(), 1).unwrap(),
                creator: creator.address(),
                title: "t".into(),
                description: "d".into(),
                sealed_key: Bytes::new(),
                nonce: Bytes::new(),
            })))
            .await
            .unwrap();

        let enforcer = AccessPolicyEnforcer::new(ledger.clone(), PACKAGE, Duration::from_secs(1));
        Fixture {
            ledger,
            enforcer,
            creator,
            content_id,
        }
    }

    async fn session_for(wallet: &MemoryWallet, package: PackageId) -> SessionKey {
        let manager = SessionKeyManager::default();
        let unsigned = manager.create(wallet.address(), package, 10).unwrap();
        manager.sign(unsigned, wallet).await.unwrap()
    }

    #[test]
    fn policy_validates_threshold() {
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        assert!(AccessPolicy::new([a, b], 2).is_ok());
        assert_eq!(
            AccessPolicy::new([a, b], 3),
            Err(PolicyError::InvalidThreshold {
                threshold: 3,
                recipients: 2
            })
        );
        assert!(AccessPolicy::new([a], 0).is_err());
        assert_eq!(AccessPolicy::new([], 1), Err(PolicyError::NoRecipients));
        // Duplicates collapse before the bound is checked.
        assert!(AccessPolicy::new([a, a], 2).is_err());
    }

    #[test]
    fn deserialization_revalidates() {
        let json = r#"{"recipients":["0x0101010101010101010101010101010101010101"],"threshold":2}"#;
        assert!(serde_json::from_str::<AccessPolicy>(json).is_err());
    }

    #[tokio::test]
    async fn recipient_is_authorized() {
        let ledger = Arc::new(InMemoryLedger::new(PACKAGE));
        let reader = MemoryWallet::random(ledger);
        let fx = publish(&[reader.address()]).await;
        let session = session_for(&reader, PACKAGE).await;

        let decision = fx
            .enforcer
            .check(&fx.content_id, reader.address(), &session)
            .await
            .unwrap();
        match decision {
            AccessDecision::Authorized { proof } => {
                assert_eq!(proof.requester, reader.address());
                assert_eq!(proof.content_id, fx.content_id);
                let bytes = proof.to_bytes().unwrap();
                assert_eq!(PolicyProofTx::from_bytes(&bytes).unwrap(), proof);
            }
            other => panic!("expected authorization, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_recipient_is_denied_and_decision_is_stable() {
        let fx = publish(&[Address::repeat_byte(0x22)]).await;
        let session = session_for(&fx.creator, PACKAGE).await;

        for _ in 0..2 {
            let decision = fx
                .enforcer
                .check(&fx.content_id, fx.creator.address(), &session)
                .await
                .unwrap();
            assert_eq!(
                decision,
                AccessDecision::Denied {
                    reason: DenialReason::PolicyRejected
                }
            );
        }
        assert_eq!(fx.ledger.events().len(), 3);
    }

    #[tokio::test]
    async fn borrowed_session_is_denied_locally() {
        let ledger = Arc::new(InMemoryLedger::new(PACKAGE));
        let reader = MemoryWallet::random(ledger);
        let fx = publish(&[reader.address()]).await;
        let session = session_for(&fx.creator, PACKAGE).await;

        let decision = fx
            .enforcer
            .check(&fx.content_id, reader.address(), &session)
            .await
            .unwrap();
        assert_eq!(
            decision,
            AccessDecision::Denied {
                reason: DenialReason::RequesterMismatch
            }
        );
        assert_eq!(fx.ledger.simulations(), 0);
    }

    #[tokio::test]
    async fn session_for_other_package_is_denied() {
        let ledger = Arc::new(InMemoryLedger::new(PACKAGE));
        let reader = MemoryWallet::random(ledger);
        let fx = publish(&[reader.address()]).await;
        let session = session_for(&reader, Address::repeat_byte(0x99)).await;

        let decision = fx
            .enforcer
            .check(&fx.content_id, reader.address(), &session)
            .await
            .unwrap();
        assert_eq!(
            decision,
            AccessDecision::Denied {
                reason: DenialReason::WrongPackage
            }
        );
    }

    #[tokio::test]
    async fn expired_session_is_an_error() {
        let ledger = Arc::new(InMemoryLedger::new(PACKAGE));
        let reader = MemoryWallet::random(ledger);
        let fx = publish(&[reader.address()]).await;
        let session = session_for(&reader, PACKAGE).await;

        let later = session.expires_at() + chrono::Duration::seconds(1);
        let result = fx
            .enforcer
            .check_at(&fx.content_id, reader.address(), &session, later)
            .await;
        assert!(matches!(result, Err(PipelineError::SessionExpired { .. })));
        assert_eq!(fx.ledger.simulations(), 0);
    }
}
