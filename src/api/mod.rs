// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    content::UploadStage,
    models::{
        CompleteSessionRequest, ContentMetadata, CreateSessionRequest, CreateSessionResponse,
        IncompleteUpload, RetrieveContentRequest, RetrieveContentResponse, UploadContentRequest,
        UploadContentResponse,
    },
    session::{SessionKey, UnsignedSessionKey},
    state::AppState,
    storage::BlobStatus,
};

pub mod content;
pub mod health;
pub mod sessions;

/// Base64 overhead plus room for the JSON envelope.
fn body_limit(max_blob_size: u64) -> usize {
    let encoded = max_blob_size.saturating_mul(4) / 3 + 4;
    usize::try_from(encoded.saturating_add(64 * 1024)).unwrap_or(usize::MAX)
}

pub fn router(state: AppState) -> Router {
    let limit = body_limit(state.manager.storage().config().max_blob_size);

    let v1_routes = Router::new()
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/complete", post(sessions::complete_session))
        .route("/content", post(content::upload_content))
        .route("/content/{content_id}", get(content::get_content))
        .route(
            "/content/{content_id}/retrieve",
            post(content::retrieve_content),
        )
        .route(
            "/content/{content_id}/publish",
            post(content::publish_content),
        )
        .route("/uploads/incomplete", get(content::list_incomplete_uploads))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        sessions::create_session,
        sessions::complete_session,
        content::upload_content,
        content::get_content,
        content::publish_content,
        content::retrieve_content,
        content::list_incomplete_uploads
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            CreateSessionRequest,
            CreateSessionResponse,
            CompleteSessionRequest,
            UnsignedSessionKey,
            SessionKey,
            UploadContentRequest,
            UploadContentResponse,
            UploadStage,
            ContentMetadata,
            RetrieveContentRequest,
            RetrieveContentResponse,
            IncompleteUpload,
            BlobStatus
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Sessions", description = "Wallet-signed session keys"),
        (name = "Content", description = "Encrypted content publishing and retrieval"),
        (name = "Uploads", description = "Upload journal")
    )
)]
struct ApiDoc;
