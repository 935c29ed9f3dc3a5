// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Threshold Encryption
//!
//! Content is encrypted client-side; key servers only ever see key shares.
//!
//! ## Scheme
//!
//! 1. A fresh 256-bit data key seals the plaintext (ChaCha20-Poly1305,
//!    random nonce, AAD `sealed-content:v1`).
//! 2. The data key is split into one Shamir share per key server; any
//!    `threshold` shares rebuild it.
//! 3. Each server wraps its share and binds it to the recipient list. The
//!    wrapped shares form the [`EncryptionKeyRef`] stored in the content
//!    record.
//!
//! Decryption asks the servers to unwrap their shares, presenting a
//! [`PolicyProofTx`](crate::policy::PolicyProofTx). Each server checks the
//! proof independently, so a compromised client cannot bypass the policy.
//! `encrypt` never touches the ledger.

pub mod key_server;
#[cfg(any(test, feature = "dev"))]
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::crypto::{aead, random_bytes, shamir, CryptoError, Share, KEY_LEN, NONCE_LEN};
use crate::error::PipelineError;
use crate::policy::{AccessPolicy, PolicyError};
use crate::retry::{with_backoff, RetryPolicy};
use crate::session::SessionKey;
use crate::types::Identity;

pub use key_server::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, HttpKeyServer, KeyServer,
    KeyServerError, PolicyParams,
};
#[cfg(any(test, feature = "dev"))]
pub use memory::InMemoryKeyServer;

/// Associated data bound into every payload.
pub const PAYLOAD_AAD: &[u8] = b"sealed-content:v1";

/// One share as wrapped by a key server. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedShare {
    /// Id of the key server holding the wrapping key.
    pub server: String,
    /// Shamir evaluation point.
    pub index: u8,
    pub encrypted_data: String,
    pub encryption_key: String,
    pub nonce: String,
}

/// Reference to the data key: the wrapped shares and how many are needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKeyRef {
    pub key_id: Uuid,
    pub threshold: u32,
    pub recipients: Vec<Identity>,
    pub shares: Vec<WrappedShare>,
}

impl EncryptionKeyRef {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Ciphertext plus everything needed to decrypt it. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    ciphertext: Vec<u8>,
    key_ref: EncryptionKeyRef,
    nonce: [u8; NONCE_LEN],
}

impl EncryptedPayload {
    /// Reassemble a payload from stored parts.
    pub fn from_parts(
        ciphertext: Vec<u8>,
        key_ref: EncryptionKeyRef,
        nonce: &[u8],
    ) -> Result<Self, PipelineError> {
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| CryptoError::InvalidNonce(nonce.len()))?;
        Ok(Self {
            ciphertext,
            key_ref,
            nonce,
        })
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn key_ref(&self) -> &EncryptionKeyRef {
        &self.key_ref
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }
}

/// Threshold encryption against a set of key servers.
pub struct EncryptionService {
    servers: Vec<Arc<dyn KeyServer>>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl EncryptionService {
    pub fn new(servers: Vec<Arc<dyn KeyServer>>, retry: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            servers,
            retry,
            call_timeout,
        }
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    /// Encrypt `plaintext` for the recipients of `policy`.
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        policy: &AccessPolicy,
    ) -> Result<EncryptedPayload, PipelineError> {
        let threshold = policy.threshold();
        if threshold as usize > self.servers.len() {
            return Err(PolicyError::ThresholdExceedsKeyServers {
                threshold,
                servers: self.servers.len(),
            }
            .into());
        }

        let data_key = random_bytes::<KEY_LEN>()?;
        let (nonce, ciphertext) = aead::seal(&data_key, plaintext, PAYLOAD_AAD)?;
        let shares = shamir::split(&data_key, threshold as usize, self.servers.len())?;
        let recipients: Vec<Identity> = policy.recipients().iter().copied().collect();

        let wrapped = with_backoff(
            &self.retry,
            "share_wrap",
            |_| self.wrap_shares(&shares, &recipients, threshold),
            |e: &PipelineError| matches!(e, PipelineError::EncryptionUnavailable { .. }),
        )
        .await?;

        let key_ref = EncryptionKeyRef {
            key_id: Uuid::new_v4(),
            threshold,
            recipients,
            shares: wrapped,
        };
        debug!(
            key_id = %key_ref.key_id,
            threshold,
            wrapped = key_ref.shares.len(),
            size = ciphertext.len(),
            "Payload encrypted"
        );
        Ok(EncryptedPayload {
            ciphertext,
            key_ref,
            nonce,
        })
    }

    async fn wrap_shares(
        &self,
        shares: &[Share],
        recipients: &[Identity],
        threshold: u32,
    ) -> Result<Vec<WrappedShare>, PipelineError> {
        let mut tasks = JoinSet::new();
        for (server, share) in self.servers.iter().zip(shares) {
            let server = server.clone();
            let index = share.index;
            let request = EncryptRequest {
                data: Base64::encode_string(&share.value),
                recipients: recipients.to_vec(),
                policy: PolicyParams { threshold },
            };
            let timeout = self.call_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, server.encrypt(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(KeyServerError::Unavailable("timed out".into())),
                };
                (server.id().to_string(), index, result)
            });
        }

        let mut wrapped = Vec::with_capacity(shares.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((server, index, Ok(response))) => wrapped.push(WrappedShare {
                    server,
                    index,
                    encrypted_data: response.encrypted_data,
                    encryption_key: response.encryption_key,
                    nonce: response.nonce,
                }),
                Ok((server, _, Err(e))) => {
                    warn!(%server, error = %e, "Key server failed to wrap share");
                }
                Err(e) => warn!(error = %e, "Share wrap task failed"),
            }
        }

        if wrapped.len() < threshold as usize {
            return Err(PipelineError::EncryptionUnavailable {
                responded: wrapped.len(),
                required: threshold as usize,
            });
        }
        wrapped.sort_by_key(|share| share.index);
        Ok(wrapped)
    }

    /// Decrypt `payload` using `session` and a serialized policy proof.
    pub async fn decrypt(
        &self,
        payload: &EncryptedPayload,
        session: &SessionKey,
        policy_proof_tx: &[u8],
    ) -> Result<Vec<u8>, PipelineError> {
        self.decrypt_at(payload, session, policy_proof_tx, Utc::now())
            .await
    }

    /// [`decrypt`](Self::decrypt) against an explicit clock reading.
    pub async fn decrypt_at(
        &self,
        payload: &EncryptedPayload,
        session: &SessionKey,
        policy_proof_tx: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, PipelineError> {
        if !session.is_valid_at(now) {
            return Err(PipelineError::SessionExpired {
                expired_at: session.expires_at(),
            });
        }

        let key_ref = payload.key_ref();
        let proof = Base64::encode_string(policy_proof_tx);
        let shares = with_backoff(
            &self.retry,
            "share_unwrap",
            |_| self.unwrap_shares(key_ref, &proof),
            |e: &PipelineError| matches!(e, PipelineError::EncryptionUnavailable { .. }),
        )
        .await?;

        let data_key = shamir::combine(&shares)?;
        let plaintext = aead::open(&data_key, payload.nonce(), payload.ciphertext(), PAYLOAD_AAD)
            .map_err(|_| PipelineError::IntegrityError {
                detail: format!("payload {} failed authentication", key_ref.key_id),
            })?;

        debug!(key_id = %key_ref.key_id, size = plaintext.len(), "Payload decrypted");
        Ok(plaintext)
    }

    /// Collect `threshold` unwrapped shares, stopping as soon as enough
    /// arrived.
    async fn unwrap_shares(
        &self,
        key_ref: &EncryptionKeyRef,
        proof: &str,
    ) -> Result<Vec<Share>, PipelineError> {
        let threshold = key_ref.threshold as usize;
        let total = key_ref.shares.len();
        let servers: HashMap<&str, &Arc<dyn KeyServer>> =
            self.servers.iter().map(|s| (s.id(), s)).collect();

        let mut tasks = JoinSet::new();
        let mut missing = 0usize;
        for wrapped in &key_ref.shares {
            let Some(server) = servers.get(wrapped.server.as_str()) else {
                warn!(server = %wrapped.server, "Share held by an unknown key server");
                missing += 1;
                continue;
            };
            let server = Arc::clone(server);
            let index = wrapped.index;
            let request = DecryptRequest {
                encrypted_data: wrapped.encrypted_data.clone(),
                encryption_key: wrapped.encryption_key.clone(),
                nonce: wrapped.nonce.clone(),
                proof: proof.to_string(),
            };
            let timeout = self.call_timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, server.decrypt(&request)).await {
                    Ok(result) => result,
                    Err(_) => Err(KeyServerError::Unavailable("timed out".into())),
                };
                (server.id().to_string(), index, result)
            });
        }

        let mut shares = Vec::with_capacity(threshold);
        let mut denied = 0usize;
        let mut denial = String::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((server, index, Ok(response))) => {
                    match Base64::decode_vec(&response.decrypted_data) {
                        Ok(value) => shares.push(Share { index, value }),
                        Err(e) => warn!(%server, error = %e, "Key server returned malformed share"),
                    }
                    if shares.len() >= threshold {
                        tasks.abort_all();
                        break;
                    }
                }
                Ok((server, _, Err(KeyServerError::Denied(reason)))) => {
                    debug!(%server, %reason, "Key server denied share");
                    denied += 1;
                    denial = reason;
                }
                Ok((server, _, Err(e))) => {
                    warn!(%server, error = %e, "Key server unavailable");
                }
                Err(e) => warn!(error = %e, "Share unwrap task failed"),
            }
        }

        if shares.len() >= threshold {
            return Ok(shares);
        }
        // Enough denials that the threshold is out of reach whatever the
        // remaining servers do.
        if denied > total.saturating_sub(threshold) {
            return Err(PipelineError::AccessDenied {
                reason: format!("{denied} of {total} key servers denied: {denial}"),
            });
        }
        debug!(missing, responded = shares.len(), threshold, "Share threshold not reached");
        Err(PipelineError::EncryptionUnavailable {
            responded: shares.len(),
            required: threshold,
        })
    }
}
