// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process key server for sandbox mode and tests.
//!
//! Each server derives a master key from a seed and its id. Shares are
//! sealed under a per-share key `HMAC(master, key_id)` together with the
//! recipient list, so the recipient binding cannot be altered by the
//! client. Release re-checks the proof exactly as a remote server would.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::key_server::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, KeyServer, KeyServerError,
};
use crate::crypto::{aead, random_bytes, CryptoError, KEY_LEN};
use crate::ledger::LedgerReader;
use crate::policy::PolicyProofTx;
use crate::types::{Identity, PackageId};

type HmacSha256 = Hmac<Sha256>;

fn derive(key: &[u8], message: &[u8]) -> Result<[u8; KEY_LEN], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().into())
}

#[derive(Serialize, Deserialize)]
struct ShareEnvelope {
    share: String,
    recipients: Vec<Identity>,
    threshold: u32,
}

/// Key server held in memory.
pub struct InMemoryKeyServer {
    id: String,
    master: [u8; KEY_LEN],
    ledger: Arc<dyn LedgerReader>,
    package_id: PackageId,
    available: AtomicBool,
    encrypt_calls: AtomicUsize,
    decrypt_calls: AtomicUsize,
}

impl InMemoryKeyServer {
    pub fn new(
        id: impl Into<String>,
        seed: &[u8],
        ledger: Arc<dyn LedgerReader>,
        package_id: PackageId,
    ) -> Result<Self, CryptoError> {
        let id = id.into();
        let master = derive(seed, id.as_bytes())?;
        Ok(Self {
            id,
            master,
            ledger,
            package_id,
            available: AtomicBool::new(true),
            encrypt_calls: AtomicUsize::new(0),
            decrypt_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypt_calls.load(Ordering::SeqCst)
    }

    pub fn decrypt_calls(&self) -> usize {
        self.decrypt_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), KeyServerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KeyServerError::Unavailable(format!("{} is down", self.id)))
        }
    }

    fn share_key(&self, key_id: &[u8]) -> Result<[u8; KEY_LEN], KeyServerError> {
        derive(&self.master, key_id).map_err(|e| KeyServerError::Unavailable(e.to_string()))
    }

    /// Checks a remote server performs before releasing a share.
    async fn authorize(
        &self,
        proof: &PolicyProofTx,
        envelope: &ShareEnvelope,
    ) -> Result<(), KeyServerError> {
        let session = &proof.session;
        session
            .ensure_usable(Utc::now())
            .map_err(|e| KeyServerError::Denied(e.to_string()))?;
        if session.owner() != proof.requester {
            return Err(KeyServerError::Denied("session not owned by requester".into()));
        }
        if proof.package_id != self.package_id || session.package_id() != self.package_id {
            return Err(KeyServerError::Denied("proof for another package".into()));
        }
        if !envelope.recipients.contains(&proof.requester) {
            return Err(KeyServerError::Denied("requester not a recipient".into()));
        }
        let approved = self
            .ledger
            .simulate_seal_approve(proof)
            .await
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;
        if !approved {
            return Err(KeyServerError::Denied("sealApprove rejected".into()));
        }
        Ok(())
    }
}

fn decode(field: &str, value: &str) -> Result<Vec<u8>, KeyServerError> {
    Base64::decode_vec(value)
        .map_err(|e| KeyServerError::InvalidResponse(format!("{field} is not base64: {e}")))
}

#[async_trait]
impl KeyServer for InMemoryKeyServer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn encrypt(&self, request: &EncryptRequest) -> Result<EncryptResponse, KeyServerError> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let envelope = ShareEnvelope {
            share: request.data.clone(),
            recipients: request.recipients.clone(),
            threshold: request.policy.threshold,
        };
        let plaintext = serde_json::to_vec(&envelope)
            .map_err(|e| KeyServerError::InvalidResponse(e.to_string()))?;

        let key_id = random_bytes::<16>().map_err(|e| KeyServerError::Unavailable(e.to_string()))?;
        let share_key = self.share_key(&key_id)?;
        let (nonce, sealed) = aead::seal(&share_key, &plaintext, self.id.as_bytes())
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;

        Ok(EncryptResponse {
            encrypted_data: Base64::encode_string(&sealed),
            encryption_key: Base64::encode_string(&key_id),
            nonce: Base64::encode_string(&nonce),
        })
    }

    async fn decrypt(&self, request: &DecryptRequest) -> Result<DecryptResponse, KeyServerError> {
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let proof = PolicyProofTx::from_bytes(&decode("proof", &request.proof)?)
            .map_err(|e| KeyServerError::Denied(format!("malformed proof: {e}")))?;
        let key_id = decode("encryptionKey", &request.encryption_key)?;
        let nonce = decode("nonce", &request.nonce)?;
        let sealed = decode("encryptedData", &request.encrypted_data)?;

        let share_key = self.share_key(&key_id)?;
        let plaintext = aead::open(&share_key, &nonce, &sealed, self.id.as_bytes())
            .map_err(|_| KeyServerError::InvalidResponse("wrapped share does not open".into()))?;
        let envelope: ShareEnvelope = serde_json::from_slice(&plaintext)
            .map_err(|e| KeyServerError::InvalidResponse(e.to_string()))?;

        self.authorize(&proof, &envelope).await?;

        tracing::debug!(server = %self.id, requester = %proof.requester, "Share released");
        Ok(DecryptResponse {
            decrypted_data: envelope.share,
        })
    }
}
