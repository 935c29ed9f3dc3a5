// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the typed configuration built
//! from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KEY_SERVER_URLS` | Comma-separated key server base URLs | Required |
//! | `STORAGE_NODE_URLS` | Comma-separated storage node base URLs | Required |
//! | `LEDGER_RPC_URL` | EVM JSON-RPC endpoint | Required |
//! | `REGISTRY_ADDRESS` | Registry contract (package id) | Required |
//! | `WALLET_KEY_PATH` | PEM private key of the gateway wallet | Required |
//! | `DEFAULT_EPOCHS` | Storage lifetime of uploads | `5` |
//! | `MAX_BLOB_SIZE` | Largest accepted upload in bytes | `67108864` |
//! | `STORAGE_QUORUM` | Storage acknowledgments required | `2` |
//! | `STORAGE_REPLICATION` | Nodes per chunk | `2` |
//! | `CHUNK_SIZE` | Chunk size in bytes | `1048576` |
//! | `SESSION_MAX_TTL_MINUTES` | Longest session key TTL | `30` |
//! | `REQUEST_TIMEOUT_SECS` | Deadline for one node or key-server call | `10` |
//! | `LEDGER_TIMEOUT_SECS` | Deadline for a ledger query or transaction | `60` |
//! | `RETRY_MAX_ATTEMPTS` | Attempts for retryable failures | `4` |
//! | `RETRY_INITIAL_BACKOFF_MS` | First backoff delay | `250` |
//! | `RETRY_MAX_BACKOFF_MS` | Backoff cap | `8000` |
//! | `BLOB_CACHE_CAPACITY` | Verified blobs kept in memory (0 disables) | `64` |
//! | `BLOB_CACHE_MAX_BYTES` | Total cached blob bytes (0 disables) | `268435456` |
//! | `BLOB_CACHE_TTL_SECS` | Lifetime of a cached blob | `300` |
//! | `JOURNAL_PATH` | redb upload journal | Disabled |
//! | `SANDBOX` | Run against the in-process network (`dev` builds) | `false` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::retry::RetryPolicy;
use crate::session::DEFAULT_MAX_TTL_MINUTES;
use crate::storage::client::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BLOB_SIZE};
use crate::storage::StorageConfig;

pub const KEY_SERVER_URLS_ENV: &str = "KEY_SERVER_URLS";
pub const STORAGE_NODE_URLS_ENV: &str = "STORAGE_NODE_URLS";
pub const LEDGER_RPC_URL_ENV: &str = "LEDGER_RPC_URL";
/// Registry contract address; session keys are scoped to it.
pub const REGISTRY_ADDRESS_ENV: &str = "REGISTRY_ADDRESS";
/// PEM file holding the secp256k1 key the gateway publishes with (SEC1 or
/// PKCS#8).
pub const WALLET_KEY_PATH_ENV: &str = "WALLET_KEY_PATH";
pub const DEFAULT_EPOCHS_ENV: &str = "DEFAULT_EPOCHS";
pub const MAX_BLOB_SIZE_ENV: &str = "MAX_BLOB_SIZE";
pub const STORAGE_QUORUM_ENV: &str = "STORAGE_QUORUM";
pub const STORAGE_REPLICATION_ENV: &str = "STORAGE_REPLICATION";
pub const CHUNK_SIZE_ENV: &str = "CHUNK_SIZE";
pub const SESSION_MAX_TTL_MINUTES_ENV: &str = "SESSION_MAX_TTL_MINUTES";
pub const REQUEST_TIMEOUT_SECS_ENV: &str = "REQUEST_TIMEOUT_SECS";
pub const LEDGER_TIMEOUT_SECS_ENV: &str = "LEDGER_TIMEOUT_SECS";
pub const RETRY_MAX_ATTEMPTS_ENV: &str = "RETRY_MAX_ATTEMPTS";
pub const RETRY_INITIAL_BACKOFF_MS_ENV: &str = "RETRY_INITIAL_BACKOFF_MS";
pub const RETRY_MAX_BACKOFF_MS_ENV: &str = "RETRY_MAX_BACKOFF_MS";
pub const BLOB_CACHE_CAPACITY_ENV: &str = "BLOB_CACHE_CAPACITY";
pub const BLOB_CACHE_MAX_BYTES_ENV: &str = "BLOB_CACHE_MAX_BYTES";
pub const BLOB_CACHE_TTL_SECS_ENV: &str = "BLOB_CACHE_TTL_SECS";
/// Unset disables the journal.
pub const JOURNAL_PATH_ENV: &str = "JOURNAL_PATH";
/// Only honoured by builds with the `dev` feature.
pub const SANDBOX_ENV: &str = "SANDBOX";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
/// `json` for structured logs, anything else for human-readable output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LEDGER_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_BLOB_CACHE_CAPACITY: usize = 64;
pub const DEFAULT_BLOB_CACHE_MAX_BYTES: usize = 256 * 1024 * 1024;
pub const DEFAULT_BLOB_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Bind address and log format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub json_logs: bool,
    pub sandbox: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        Ok(Self {
            host: env.get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env.parse_or(PORT_ENV, DEFAULT_PORT)?,
            json_logs: env
                .get(LOG_FORMAT_ENV)
                .is_some_and(|f| f.eq_ignore_ascii_case("json")),
            sandbox: env.flag(SANDBOX_ENV),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything needed to reach the external networks.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub key_server_urls: Vec<String>,
    pub storage_node_urls: Vec<String>,
    pub ledger_rpc_url: String,
    pub registry_address: Address,
    pub wallet_key_path: PathBuf,
    pub storage: StorageConfig,
    pub session_max_ttl_minutes: u32,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub blob_cache_capacity: usize,
    pub blob_cache_max_bytes: usize,
    pub blob_cache_ttl: Duration,
    pub journal_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let key_server_urls = env.list(KEY_SERVER_URLS_ENV)?;
        let storage_node_urls = env.list(STORAGE_NODE_URLS_ENV)?;
        let ledger_rpc_url = env.require(LEDGER_RPC_URL_ENV)?;
        let registry_address = env.parse(REGISTRY_ADDRESS_ENV)?;
        let wallet_key_path = PathBuf::from(env.require(WALLET_KEY_PATH_ENV)?);

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: env.parse_or(RETRY_MAX_ATTEMPTS_ENV, defaults.max_attempts)?,
            initial_backoff: Duration::from_millis(env.parse_or(
                RETRY_INITIAL_BACKOFF_MS_ENV,
                defaults.initial_backoff.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(env.parse_or(
                RETRY_MAX_BACKOFF_MS_ENV,
                defaults.max_backoff.as_millis() as u64,
            )?),
        };
        let request_timeout = Duration::from_secs(
            env.parse_or(REQUEST_TIMEOUT_SECS_ENV, DEFAULT_REQUEST_TIMEOUT_SECS)?,
        );

        let storage_defaults = StorageConfig::default();
        let storage = StorageConfig {
            chunk_size: env.parse_or(CHUNK_SIZE_ENV, DEFAULT_CHUNK_SIZE)?,
            replication: env.parse_or(STORAGE_REPLICATION_ENV, storage_defaults.replication)?,
            quorum: env.parse_or(STORAGE_QUORUM_ENV, storage_defaults.quorum)?,
            max_blob_size: env.parse_or(MAX_BLOB_SIZE_ENV, DEFAULT_MAX_BLOB_SIZE)?,
            default_epochs: env.parse_or(DEFAULT_EPOCHS_ENV, storage_defaults.default_epochs)?,
            call_timeout: request_timeout,
            ledger_timeout: Duration::from_secs(
                env.parse_or(LEDGER_TIMEOUT_SECS_ENV, DEFAULT_LEDGER_TIMEOUT_SECS)?,
            ),
            retry,
        };
        if storage.quorum > storage_node_urls.len() {
            return Err(ConfigError::Invalid {
                var: STORAGE_QUORUM_ENV,
                reason: format!(
                    "quorum {} exceeds {} storage nodes",
                    storage.quorum,
                    storage_node_urls.len()
                ),
            });
        }

        Ok(Self {
            key_server_urls,
            storage_node_urls,
            ledger_rpc_url,
            registry_address,
            wallet_key_path,
            storage,
            session_max_ttl_minutes: env
                .parse_or(SESSION_MAX_TTL_MINUTES_ENV, DEFAULT_MAX_TTL_MINUTES)?,
            request_timeout,
            retry,
            blob_cache_capacity: env
                .parse_or(BLOB_CACHE_CAPACITY_ENV, DEFAULT_BLOB_CACHE_CAPACITY)?,
            blob_cache_max_bytes: env
                .parse_or(BLOB_CACHE_MAX_BYTES_ENV, DEFAULT_BLOB_CACHE_MAX_BYTES)?,
            blob_cache_ttl: Duration::from_secs(
                env.parse_or(BLOB_CACHE_TTL_SECS_ENV, DEFAULT_BLOB_CACHE_TTL_SECS)?,
            ),
            journal_path: env.get(JOURNAL_PATH_ENV).map(PathBuf::from),
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Trimmed, non-empty value.
    fn get(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, var: &'static str) -> Result<String, ConfigError> {
        self.get(var).ok_or(ConfigError::Missing(var))
    }

    fn parse<T>(&self, var: &'static str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.require(var)?
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            })
    }

    fn parse_or<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(var) {
            Some(_) => self.parse(var),
            None => Ok(default),
        }
    }

    fn list(&self, var: &'static str) -> Result<Vec<String>, ConfigError> {
        let items: Vec<String> = self
            .require(var)?
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if items.is_empty() {
            return Err(ConfigError::Missing(var));
        }
        Ok(items)
    }

    fn flag(&self, var: &str) -> bool {
        self.get(var)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (KEY_SERVER_URLS_ENV, "https://ks1.example, https://ks2.example/"),
            (STORAGE_NODE_URLS_ENV, "http://n1:9000,http://n2:9000,http://n3:9000"),
            (LEDGER_RPC_URL_ENV, "http://localhost:8545"),
            (REGISTRY_ADDRESS_ENV, "0x1111111111111111111111111111111111111111"),
            (WALLET_KEY_PATH_ENV, "/secrets/wallet.pem"),
        ]
    }

    #[test]
    fn required_values_and_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&required())).unwrap();
        assert_eq!(
            config.key_server_urls,
            vec!["https://ks1.example", "https://ks2.example"]
        );
        assert_eq!(config.storage_node_urls.len(), 3);
        assert_eq!(config.registry_address, Address::repeat_byte(0x11));
        assert_eq!(config.storage.quorum, 2);
        assert_eq!(config.storage.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.session_max_ttl_minutes, DEFAULT_MAX_TTL_MINUTES);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.blob_cache_max_bytes, DEFAULT_BLOB_CACHE_MAX_BYTES);
        assert!(config.journal_path.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let mut vars = required();
        vars.extend([
            (STORAGE_QUORUM_ENV, "3"),
            (RETRY_MAX_ATTEMPTS_ENV, "7"),
            (REQUEST_TIMEOUT_SECS_ENV, "2"),
            (JOURNAL_PATH_ENV, "/data/journal.redb"),
            (BLOB_CACHE_MAX_BYTES_ENV, "1048576"),
        ]);
        let config = PipelineConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.storage.quorum, 3);
        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.storage.retry.max_attempts, 7);
        assert_eq!(config.storage.call_timeout, Duration::from_secs(2));
        assert_eq!(config.journal_path, Some(PathBuf::from("/data/journal.redb")));
        assert_eq!(config.blob_cache_max_bytes, 1024 * 1024);
    }

    #[test]
    fn missing_and_invalid_values_are_reported() {
        let vars: Vec<_> = required()
            .into_iter()
            .filter(|(k, _)| *k != LEDGER_RPC_URL_ENV)
            .collect();
        assert_eq!(
            PipelineConfig::from_lookup(lookup(&vars)).unwrap_err(),
            ConfigError::Missing(LEDGER_RPC_URL_ENV)
        );

        let mut vars = required();
        vars.push((STORAGE_QUORUM_ENV, "4"));
        assert!(matches!(
            PipelineConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { var: STORAGE_QUORUM_ENV, .. })
        ));

        let mut vars = required();
        vars.push((CHUNK_SIZE_ENV, "lots"));
        assert!(matches!(
            PipelineConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { var: CHUNK_SIZE_ENV, .. })
        ));
    }

    #[test]
    fn server_defaults() {
        let server = ServerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(server.bind_address(), "0.0.0.0:8080");
        assert!(!server.json_logs);
        assert!(!server.sandbox);

        let server = ServerConfig::from_lookup(lookup(&[
            (PORT_ENV, "9090"),
            (LOG_FORMAT_ENV, "JSON"),
            (SANDBOX_ENV, "true"),
        ]))
        .unwrap();
        assert_eq!(server.port, 9090);
        assert!(server.json_logs);
        assert!(server.sandbox);
    }
}
