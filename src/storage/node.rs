// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storage node RPC.
//!
//! Nodes are plain content-addressed stores: `PUT /v1/store?epochs=N`
//! stores a raw body under its SHA-256 and answers with the id it computed,
//! `GET /v1/{id}` returns the bytes, `HEAD /v1/{id}` reports size and type.
//! Nodes only ever see ciphertext chunks and manifests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::types::ChunkId;

/// Node answer to a store request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreResponse {
    NewlyCreated {
        #[serde(rename = "blobId")]
        blob_id: ChunkId,
    },
    AlreadyCertified {
        #[serde(rename = "blobId")]
        blob_id: ChunkId,
    },
}

impl StoreResponse {
    /// Id the node computed for the stored bytes.
    pub fn stored_id(&self) -> ChunkId {
        match self {
            StoreResponse::NewlyCreated { blob_id } | StoreResponse::AlreadyCertified { blob_id } => {
                *blob_id
            }
        }
    }
}

/// Metadata returned by `HEAD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStat {
    pub size: u64,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("{0} not held by node")]
    NotFound(ChunkId),

    #[error("node unavailable: {0}")]
    Unavailable(String),

    #[error("invalid node response: {0}")]
    InvalidResponse(String),
}

/// A single storage node.
#[async_trait]
pub trait StorageNode: Send + Sync {
    /// Stable identifier for logs.
    fn id(&self) -> &str;

    async fn store(&self, bytes: Arc<[u8]>, epochs: u32) -> Result<StoreResponse, NodeError>;

    async fn fetch(&self, id: &ChunkId) -> Result<Vec<u8>, NodeError>;

    async fn stat(&self, id: &ChunkId) -> Result<ChunkStat, NodeError>;
}

/// Storage node reached over HTTP.
pub struct HttpStorageNode {
    id: String,
    base_url: String,
    client: Client,
}

impl HttpStorageNode {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NodeError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| NodeError::InvalidResponse(format!("invalid node URL {base_url}: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Unavailable(e.to_string()))?;
        let id = match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => base_url.to_string(),
        };
        Ok(Self {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn classify(status: StatusCode, body: String) -> NodeError {
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            NodeError::Unavailable(format!("{status}: {body}"))
        } else {
            NodeError::InvalidResponse(format!("{status}: {body}"))
        }
    }
}

#[async_trait]
impl StorageNode for HttpStorageNode {
    fn id(&self) -> &str {
        &self.id
    }

    async fn store(&self, bytes: Arc<[u8]>, epochs: u32) -> Result<StoreResponse, NodeError> {
        let resp = self
            .client
            .put(format!("{}/v1/store", self.base_url))
            .query(&[("epochs", epochs)])
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| NodeError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify(status, body));
        }

        resp.json::<StoreResponse>()
            .await
            .map_err(|e| NodeError::InvalidResponse(format!("store response parse error: {e}")))
    }

    async fn fetch(&self, id: &ChunkId) -> Result<Vec<u8>, NodeError> {
        let resp = self
            .client
            .get(format!("{}/v1/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| NodeError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(NodeError::NotFound(*id));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify(status, body));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| NodeError::Unavailable(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn stat(&self, id: &ChunkId) -> Result<ChunkStat, NodeError> {
        let resp = self
            .client
            .head(format!("{}/v1/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| NodeError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(NodeError::NotFound(*id));
        }
        if !status.is_success() {
            return Err(Self::classify(status, String::new()));
        }

        let headers = resp.headers();
        let size = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| NodeError::InvalidResponse("missing Content-Length".into()))?;
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ChunkStat { size, content_type })
    }
}
