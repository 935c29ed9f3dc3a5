// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pipeline error taxonomy and its HTTP mapping.
//!
//! Every layer has its own `thiserror` enum; they fold into
//! [`PipelineError`], which tells callers whether to retry, re-query the
//! ledger, fix their input, or give up.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::content::PendingRecord;
use crate::crypto::CryptoError;
use crate::ledger::LedgerError;
use crate::policy::PolicyError;
use crate::session::SessionError;
use crate::storage::{InvalidTransition, JournalError};
use crate::types::{BlobId, ContentId};

/// Errors surfaced by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("key servers unavailable: {responded} of {required} required responded")]
    EncryptionUnavailable { responded: usize, required: usize },

    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("storage quorum not reached for {blob_id}: {acked} of {required} nodes acknowledged")]
    StorageQuorumFailure {
        blob_id: BlobId,
        acked: usize,
        required: usize,
    },

    #[error("blob {blob_id} unavailable: {reason}")]
    StorageUnavailable { blob_id: BlobId, reason: String },

    /// The transaction may or may not have landed; query before retrying.
    #[error("outcome of {operation} for {blob_id} is unknown")]
    LedgerAmbiguous {
        blob_id: BlobId,
        operation: &'static str,
    },

    #[error("a ledger transaction for {0} is already in flight")]
    LedgerBusy(BlobId),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("integrity check failed: {detail}")]
    IntegrityError { detail: String },

    #[error("session expired at {expired_at}")]
    SessionExpired { expired_at: DateTime<Utc> },

    #[error("invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    #[error("invalid session: {0}")]
    InvalidSession(SessionError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("content {0} not found")]
    ContentNotFound(ContentId),

    #[error("blob {} is certified but the record for {} is not written", .0.record.blob_id, .0.record.content_id)]
    RecordPending(Box<PendingRecord>),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}

/// What a failure means for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing was published; the upload can be started again.
    NotPublished,
    /// The requester is not allowed to decrypt.
    NotAuthorized,
    /// Content exists but cannot be reached right now.
    Unavailable,
    /// Stored bytes failed verification.
    Corrupted,
    /// A fresh session key is needed.
    SessionExpired,
    /// The request itself is wrong.
    CallerError,
    /// Blob is durable; the record can be finished with `publish_record` or
    /// `publish_pending`.
    RecordPending,
}

impl From<SessionError> for PipelineError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Expired(expired_at) => PipelineError::SessionExpired { expired_at },
            e @ SessionError::InvalidTtl { .. } => PipelineError::InvalidInput(e.to_string()),
            other => PipelineError::InvalidSession(other),
        }
    }
}

impl PipelineError {
    /// Map a ledger failure for `blob_id`, keeping ambiguity distinct.
    pub fn from_ledger(blob_id: BlobId, e: LedgerError) -> Self {
        match e {
            LedgerError::Ambiguous { kind, reason } => {
                tracing::warn!(%blob_id, operation = kind, %reason, "Ledger outcome unknown");
                PipelineError::LedgerAmbiguous {
                    blob_id,
                    operation: kind,
                }
            }
            other => PipelineError::Ledger(other),
        }
    }

    pub fn integrity(blob_id: &BlobId, detail: impl std::fmt::Display) -> Self {
        PipelineError::IntegrityError {
            detail: format!("{blob_id}: {detail}"),
        }
    }

    /// Whether repeating the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::EncryptionUnavailable { .. }
                | PipelineError::StorageQuorumFailure { .. }
                | PipelineError::StorageUnavailable { .. }
                | PipelineError::LedgerBusy(_)
                | PipelineError::Ledger(LedgerError::Rpc(_))
        )
    }

    /// Whether ledger state must be re-read before any retry.
    pub fn requires_resolution(&self) -> bool {
        matches!(self, PipelineError::LedgerAmbiguous { .. })
    }

    pub fn outcome(&self) -> Outcome {
        match self {
            PipelineError::AccessDenied { .. } => Outcome::NotAuthorized,
            PipelineError::EncryptionUnavailable { .. }
            | PipelineError::StorageUnavailable { .. }
            | PipelineError::ContentNotFound(_)
            | PipelineError::Ledger(LedgerError::Rpc(_)) => Outcome::Unavailable,
            PipelineError::IntegrityError { .. }
            | PipelineError::Crypto(CryptoError::Authentication) => Outcome::Corrupted,
            PipelineError::SessionExpired { .. } => Outcome::SessionExpired,
            PipelineError::InvalidPolicy(_)
            | PipelineError::InvalidSession(_)
            | PipelineError::InvalidInput(_) => Outcome::CallerError,
            PipelineError::RecordPending(_) => Outcome::RecordPending,
            PipelineError::StorageQuorumFailure { .. }
            | PipelineError::LedgerAmbiguous { .. }
            | PipelineError::LedgerBusy(_)
            | PipelineError::Ledger(_)
            | PipelineError::InvalidTransition(_)
            | PipelineError::Crypto(_)
            | PipelineError::Serialization(_)
            | PipelineError::Journal(_) => Outcome::NotPublished,
        }
    }
}

// =============================================================================
// HTTP mapping
// =============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let (status, code) = match &e {
            PipelineError::AccessDenied { .. } => (StatusCode::FORBIDDEN, "access_denied"),
            PipelineError::SessionExpired { .. } => (StatusCode::UNAUTHORIZED, "session_expired"),
            PipelineError::InvalidSession(_) => (StatusCode::UNAUTHORIZED, "invalid_session"),
            PipelineError::ContentNotFound(_) => (StatusCode::NOT_FOUND, "content_not_found"),
            PipelineError::InvalidPolicy(_) => (StatusCode::BAD_REQUEST, "invalid_policy"),
            PipelineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            PipelineError::LedgerBusy(_) => (StatusCode::CONFLICT, "ledger_busy"),
            PipelineError::LedgerAmbiguous { .. } => (StatusCode::CONFLICT, "ledger_ambiguous"),
            PipelineError::InvalidTransition(_) => (StatusCode::CONFLICT, "invalid_transition"),
            PipelineError::IntegrityError { .. } => (StatusCode::BAD_GATEWAY, "integrity_error"),
            PipelineError::Ledger(LedgerError::Rpc(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "ledger_unavailable")
            }
            PipelineError::Ledger(_) => (StatusCode::BAD_GATEWAY, "ledger_rejected"),
            PipelineError::EncryptionUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "encryption_unavailable")
            }
            PipelineError::StorageQuorumFailure { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "storage_quorum_failure")
            }
            PipelineError::StorageUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
            }
            PipelineError::RecordPending(_) => (StatusCode::SERVICE_UNAVAILABLE, "record_pending"),
            PipelineError::Crypto(CryptoError::Authentication) => {
                (StatusCode::BAD_GATEWAY, "integrity_error")
            }
            PipelineError::Crypto(_)
            | PipelineError::Serialization(_)
            | PipelineError::Journal(_) => {
                tracing::error!(error = %e, "Internal pipeline error");
                return ApiError::internal("internal error");
            }
        };
        ApiError::new(status, code, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code,
        });
        (self.status, body).into_response()
    }
}
