// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Keys
//!
//! Ephemeral, wallet-signed authorizations for decryption.
//!
//! ## Lifecycle
//!
//! ```text
//! create() ──► UnsignedSessionKey ──sign()──► SessionKey ──(expires_at)──► expired
//! ```
//!
//! - Signing consumes the unsigned key, so a key is signed exactly once.
//! - Expiry is time-only; there is no renewal and no revocation. A fresh key
//!   must be created and signed.
//! - Every key carries a random `session_id` inside the signed message, so a
//!   signature never authorizes more than one key.
//! - Keys live in the caller's memory; nothing here persists them.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use alloy::primitives::{Bytes, Signature};

use crate::ledger::{LedgerError, TransactionSigner};
use crate::types::{Identity, PackageId};

/// Default upper bound for a session TTL.
pub const DEFAULT_MAX_TTL_MINUTES: u32 = 30;

/// Session key errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("TTL of {ttl} minutes is outside 1..={max}")]
    InvalidTtl { ttl: u32, max: u32 },

    #[error("signer {actual} does not own session for {expected}")]
    SignerMismatch { expected: Identity, actual: Identity },

    #[error("wallet signature failed: {0}")]
    Signing(#[from] LedgerError),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signature recovers to {recovered}, expected {owner}")]
    SignatureMismatch { recovered: Identity, owner: Identity },

    #[error("session expired at {0}")]
    Expired(DateTime<Utc>),
}

/// A session key awaiting the owner's wallet signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UnsignedSessionKey {
    #[schema(value_type = String)]
    owner: Identity,
    #[schema(value_type = String)]
    package_id: PackageId,
    session_id: Uuid,
    created_at: DateTime<Utc>,
    ttl_minutes: u32,
}

impl UnsignedSessionKey {
    pub fn owner(&self) -> Identity {
        self.owner
    }

    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.created_at, self.ttl_minutes)
    }

    /// The message the owner's wallet must sign.
    pub fn personal_message(&self) -> String {
        personal_message(self.package_id, self.ttl_minutes, self.created_at, self.session_id)
    }
}

/// A signed, time-bounded session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionKey {
    #[schema(value_type = String)]
    owner: Identity,
    #[schema(value_type = String)]
    package_id: PackageId,
    session_id: Uuid,
    created_at: DateTime<Utc>,
    ttl_minutes: u32,
    /// 65-byte EIP-191 signature over the personal message.
    #[schema(value_type = String)]
    signature: Bytes,
}

impl SessionKey {
    pub fn owner(&self) -> Identity {
        self.owner
    }

    pub fn package_id(&self) -> PackageId {
        self.package_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.created_at, self.ttl_minutes)
    }

    pub fn personal_message(&self) -> String {
        personal_message(self.package_id, self.ttl_minutes, self.created_at, self.session_id)
    }

    /// Whether the key is still inside its validity window at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }

    /// Check that the signature was produced by `owner` over this key.
    pub fn verify_signature(&self) -> Result<(), SessionError> {
        let signature = Signature::from_raw(&self.signature)
            .map_err(|e| SessionError::MalformedSignature(e.to_string()))?;
        let recovered = signature
            .recover_address_from_msg(self.personal_message().as_bytes())
            .map_err(|e| SessionError::MalformedSignature(e.to_string()))?;
        if recovered != self.owner {
            return Err(SessionError::SignatureMismatch {
                recovered,
                owner: self.owner,
            });
        }
        Ok(())
    }

    /// Expiry then signature check.
    pub fn ensure_usable(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if !self.is_valid_at(now) {
            return Err(SessionError::Expired(self.expires_at()));
        }
        self.verify_signature()
    }
}

fn expiry(created_at: DateTime<Utc>, ttl_minutes: u32) -> DateTime<Utc> {
    created_at + Duration::minutes(i64::from(ttl_minutes))
}

fn personal_message(
    package_id: PackageId,
    ttl_minutes: u32,
    created_at: DateTime<Utc>,
    session_id: Uuid,
) -> String {
    format!(
        "Accessing keys of package {package_id} for {ttl_minutes} mins from {}, session {session_id}",
        created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Creates and signs session keys. Holds configuration only.
#[derive(Debug, Clone)]
pub struct SessionKeyManager {
    max_ttl_minutes: u32,
}

impl Default for SessionKeyManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TTL_MINUTES)
    }
}

impl SessionKeyManager {
    pub fn new(max_ttl_minutes: u32) -> Self {
        Self { max_ttl_minutes }
    }

    /// Create an unsigned key starting now.
    pub fn create(
        &self,
        owner: Identity,
        package_id: PackageId,
        ttl_minutes: u32,
    ) -> Result<UnsignedSessionKey, SessionError> {
        self.create_at(owner, package_id, ttl_minutes, Utc::now())
    }

    /// Create an unsigned key with an explicit creation time.
    pub fn create_at(
        &self,
        owner: Identity,
        package_id: PackageId,
        ttl_minutes: u32,
        created_at: DateTime<Utc>,
    ) -> Result<UnsignedSessionKey, SessionError> {
        if ttl_minutes == 0 || ttl_minutes > self.max_ttl_minutes {
            return Err(SessionError::InvalidTtl {
                ttl: ttl_minutes,
                max: self.max_ttl_minutes,
            });
        }
        Ok(UnsignedSessionKey {
            owner,
            package_id,
            session_id: Uuid::new_v4(),
            created_at: created_at.trunc_subsecs(3),
            ttl_minutes,
        })
    }

    /// Have the owner's wallet sign the key.
    pub async fn sign(
        &self,
        unsigned: UnsignedSessionKey,
        signer: &dyn TransactionSigner,
    ) -> Result<SessionKey, SessionError> {
        if signer.address() != unsigned.owner {
            return Err(SessionError::SignerMismatch {
                expected: unsigned.owner,
                actual: signer.address(),
            });
        }

        let message = unsigned.personal_message();
        let signature = signer.sign_personal_message(message.as_bytes()).await?;
        self.attach_signature(unsigned, Bytes::from(signature.as_bytes().to_vec()))
    }

    /// Complete a key with a signature produced by an external wallet.
    pub fn attach_signature(
        &self,
        unsigned: UnsignedSessionKey,
        signature: Bytes,
    ) -> Result<SessionKey, SessionError> {
        let key = SessionKey {
            owner: unsigned.owner,
            package_id: unsigned.package_id,
            session_id: unsigned.session_id,
            created_at: unsigned.created_at,
            ttl_minutes: unsigned.ttl_minutes,
            signature,
        };
        key.verify_signature()?;

        tracing::debug!(
            owner = %key.owner,
            session_id = %key.session_id,
            expires_at = %key.expires_at(),
            "Session key signed"
        );
        Ok(key)
    }

    /// Whether `session` is currently inside its validity window.
    pub fn is_valid(&self, session: &SessionKey) -> bool {
        session.is_valid_at(Utc::now())
    }

    /// Recover the signer of `session` and compare it to its owner.
    pub fn verify(&self, session: &SessionKey) -> Result<(), SessionError> {
        session.verify_signature()
    }
}
