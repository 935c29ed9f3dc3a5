// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::{ApiError, PipelineError},
    models::{CompleteSessionRequest, CreateSessionRequest, CreateSessionResponse},
    session::SessionKey,
    state::AppState,
};

/// Create an unsigned session key scoped to this gateway's registry.
///
/// The caller's wallet signs `personal_message` and completes the key with
/// `POST /v1/sessions/complete`. Nothing is stored server-side.
#[utoipa::path(
    post,
    path = "/v1/sessions",
    request_body = CreateSessionRequest,
    tag = "Sessions",
    responses(
        (status = 201, body = CreateSessionResponse),
        (status = 400, description = "TTL outside the allowed range")
    )
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let unsigned = state
        .sessions
        .create(request.owner, state.package_id, request.ttl_minutes)
        .map_err(PipelineError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            personal_message: unsigned.personal_message(),
            expires_at: unsigned.expires_at(),
            session: unsigned,
        }),
    ))
}

/// Attach a wallet signature and verify it against the key owner.
#[utoipa::path(
    post,
    path = "/v1/sessions/complete",
    request_body = CompleteSessionRequest,
    tag = "Sessions",
    responses(
        (status = 200, body = SessionKey),
        (status = 401, description = "Signature does not match the owner")
    )
)]
pub async fn complete_session(
    State(state): State<AppState>,
    Json(request): Json<CompleteSessionRequest>,
) -> Result<Json<SessionKey>, ApiError> {
    let session = state
        .sessions
        .attach_signature(request.session, request.signature)
        .map_err(PipelineError::from)?;
    Ok(Json(session))
}
