// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64ct::{Base64, Encoding};

use crate::{
    content::UploadRequest,
    error::ApiError,
    models::{
        ContentMetadata, IncompleteUpload, RetrieveContentRequest, RetrieveContentResponse,
        UploadContentRequest, UploadContentResponse,
    },
    state::AppState,
    types::ContentId,
};

fn parse_content_id(raw: &str) -> Result<ContentId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::bad_request(format!("{e}")))
}

/// Encrypt and publish content as the gateway wallet.
#[utoipa::path(
    post,
    path = "/v1/content",
    request_body = UploadContentRequest,
    tag = "Content",
    responses(
        (status = 201, body = UploadContentResponse),
        (status = 400, description = "Invalid policy or payload"),
        (status = 503, description = "Key servers, storage or ledger unavailable; `record_pending` can be finished through the publish route")
    )
)]
pub async fn upload_content(
    State(state): State<AppState>,
    Json(request): Json<UploadContentRequest>,
) -> Result<(StatusCode, Json<UploadContentResponse>), ApiError> {
    let data = Base64::decode_vec(&request.data)
        .map_err(|e| ApiError::bad_request(format!("data is not base64: {e}")))?;

    let mut stages = Vec::new();
    let record = state
        .manager
        .upload_with_progress(
            UploadRequest {
                title: request.title,
                description: request.description,
                data,
                recipients: request.recipients,
                threshold: request.threshold,
                epochs: request.epochs,
                deletable: request.deletable,
            },
            state.signer.as_ref(),
            |stage| stages.push(stage),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadContentResponse {
            content_id: record.content_id,
            blob_id: record.blob_id,
            creator: record.creator,
            stages,
        }),
    ))
}

/// Public metadata of a content record.
#[utoipa::path(
    get,
    path = "/v1/content/{content_id}",
    params(
        ("content_id" = String, Path, description = "0x-prefixed content id")
    ),
    tag = "Content",
    responses(
        (status = 200, body = ContentMetadata),
        (status = 404, description = "No such content")
    )
)]
pub async fn get_content(
    Path(content_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ContentMetadata>, ApiError> {
    let content_id = parse_content_id(&content_id)?;
    let record = state.manager.content_record(&content_id).await?;
    Ok(Json(record.into()))
}

/// Write the ledger record of an upload that stopped at `record_pending`.
#[utoipa::path(
    post,
    path = "/v1/content/{content_id}/publish",
    params(
        ("content_id" = String, Path, description = "0x-prefixed content id")
    ),
    tag = "Content",
    responses(
        (status = 200, body = ContentMetadata),
        (status = 404, description = "No pending or published record for this id"),
        (status = 409, description = "Another ledger transaction is in flight for the blob"),
        (status = 503, description = "Ledger still unavailable; the record stays pending")
    )
)]
pub async fn publish_content(
    Path(content_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ContentMetadata>, ApiError> {
    let content_id = parse_content_id(&content_id)?;
    let record = state
        .manager
        .publish_pending(&content_id, state.signer.as_ref())
        .await?;
    Ok(Json(record.into()))
}

/// Authorize with a signed session key and decrypt.
#[utoipa::path(
    post,
    path = "/v1/content/{content_id}/retrieve",
    params(
        ("content_id" = String, Path, description = "0x-prefixed content id")
    ),
    request_body = RetrieveContentRequest,
    tag = "Content",
    responses(
        (status = 200, body = RetrieveContentResponse),
        (status = 401, description = "Session expired or invalid"),
        (status = 403, description = "Requester is not authorized"),
        (status = 404, description = "No such content"),
        (status = 502, description = "Stored content failed verification")
    )
)]
pub async fn retrieve_content(
    Path(content_id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RetrieveContentRequest>,
) -> Result<Json<RetrieveContentResponse>, ApiError> {
    let content_id = parse_content_id(&content_id)?;
    let plaintext = state
        .manager
        .retrieve(&content_id, request.requester, &request.session)
        .await?;
    Ok(Json(RetrieveContentResponse {
        content_id,
        data: Base64::encode_string(&plaintext),
    }))
}

/// Uploads that were registered but never certified or recorded.
#[utoipa::path(
    get,
    path = "/v1/uploads/incomplete",
    tag = "Uploads",
    responses((status = 200, body = [IncompleteUpload]))
)]
pub async fn list_incomplete_uploads(
    State(state): State<AppState>,
) -> Result<Json<Vec<IncompleteUpload>>, ApiError> {
    let entries = state.manager.incomplete_uploads()?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
