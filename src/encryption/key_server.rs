// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key server RPC.
//!
//! A key server wraps one key share per request and binds it to a recipient
//! list. It releases the share again only for a proof it re-checks itself:
//! valid session signature, unexpired session, requester listed, and a
//! successful `sealApprove` simulation on the ledger.
//!
//! ## Wire format (JSON, camelCase, binary fields base64)
//!
//! ```text
//! POST {url}/encrypt  {data, recipients, policy: {threshold}}
//!                  -> {encryptedData, encryptionKey, nonce}
//! POST {url}/decrypt  {encryptedData, encryptionKey, nonce, proof}
//!                  -> {decryptedData}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::types::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyParams {
    pub threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptRequest {
    /// Base64 key share.
    pub data: String,
    pub recipients: Vec<Identity>,
    pub policy: PolicyParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    pub encrypted_data: String,
    pub encryption_key: String,
    pub nonce: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    pub encrypted_data: String,
    pub encryption_key: String,
    pub nonce: String,
    /// Base64 `PolicyProofTx` bytes.
    pub proof: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResponse {
    pub decrypted_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyServerError {
    #[error("key server unavailable: {0}")]
    Unavailable(String),

    #[error("key server denied request: {0}")]
    Denied(String),

    #[error("invalid key server response: {0}")]
    InvalidResponse(String),
}

/// A single key server.
#[async_trait]
pub trait KeyServer: Send + Sync {
    /// Stable identifier; wrapped shares remember which server holds them.
    fn id(&self) -> &str;

    async fn encrypt(&self, request: &EncryptRequest) -> Result<EncryptResponse, KeyServerError>;

    async fn decrypt(&self, request: &DecryptRequest) -> Result<DecryptResponse, KeyServerError>;
}

/// Key server reached over HTTP.
pub struct HttpKeyServer {
    base_url: String,
    client: Client,
}

impl HttpKeyServer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, KeyServerError> {
        url::Url::parse(base_url).map_err(|e| {
            KeyServerError::InvalidResponse(format!("invalid key server URL {base_url}: {e}"))
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, KeyServerError>
    where
        Req: Serialize + Sync,
        Resp: for<'de> Deserialize<'de>,
    {
        let resp = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(KeyServerError::Denied(format!("{status}: {body}")));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(KeyServerError::Unavailable(format!("{status}: {body}")));
        }

        resp.json::<Resp>()
            .await
            .map_err(|e| KeyServerError::InvalidResponse(format!("{path} response parse error: {e}")))
    }
}

#[async_trait]
impl KeyServer for HttpKeyServer {
    fn id(&self) -> &str {
        &self.base_url
    }

    async fn encrypt(&self, request: &EncryptRequest) -> Result<EncryptResponse, KeyServerError> {
        self.post("encrypt", request).await
    }

    async fn decrypt(&self, request: &DecryptRequest) -> Result<DecryptResponse, KeyServerError> {
        self.post("decrypt", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn encrypt_request_wire_format() {
        let request = EncryptRequest {
            data: "AAEC".into(),
            recipients: vec![Address::repeat_byte(0xab)],
            policy: PolicyParams { threshold: 1 },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["data"], "AAEC");
        assert_eq!(json["policy"]["threshold"], 1);
        assert_eq!(
            json["recipients"][0].as_str().unwrap().to_lowercase(),
            "0xabababababababababababababababababababab"
        );
    }

    #[test]
    fn responses_use_camel_case() {
        let json = r#"{"encryptedData":"a","encryptionKey":"b","nonce":"c"}"#;
        let parsed: EncryptResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.encrypted_data, "a");
        assert_eq!(parsed.encryption_key, "b");

        let json = serde_json::to_string(&DecryptResponse {
            decrypted_data: "x".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"decryptedData":"x"}"#);
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let server = HttpKeyServer::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let request = DecryptRequest {
            encrypted_data: String::new(),
            encryption_key: String::new(),
            nonce: String::new(),
            proof: String::new(),
        };
        assert!(matches!(
            server.decrypt(&request).await,
            Err(KeyServerError::Unavailable(_))
        ));
    }
}
