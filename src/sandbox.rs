// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process network for sandbox mode and tests.
//!
//! Wires an [`InMemoryLedger`], in-memory key servers and storage nodes into
//! a ready [`ContentManager`]. Every piece keeps its fault switches, so
//! scenarios can take servers down or script ledger failures.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;

use crate::content::ContentManager;
use crate::encryption::{EncryptionService, InMemoryKeyServer, KeyServer};
use crate::error::PipelineError;
use crate::ledger::{InMemoryLedger, LedgerReader, MemoryWallet, TransactionSigner};
use crate::policy::AccessPolicyEnforcer;
use crate::retry::RetryPolicy;
use crate::session::{SessionKey, SessionKeyManager};
use crate::storage::{
    InMemoryStorageNode, StorageClient, StorageConfig, StorageNode, UploadJournal,
};
use crate::types::PackageId;

/// Registry address used by the sandbox ledger.
pub const SANDBOX_PACKAGE: PackageId = Address::repeat_byte(0x5c);

#[derive(Clone)]
pub struct SandboxOptions {
    pub key_servers: usize,
    pub storage_nodes: usize,
    pub storage: StorageConfig,
    pub retry: RetryPolicy,
    /// Deadline for key-server and enforcer calls.
    pub call_timeout: Duration,
    pub journal: Option<Arc<UploadJournal>>,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            key_servers: 3,
            storage_nodes: 4,
            storage: StorageConfig::default(),
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(5),
            journal: None,
        }
    }
}

pub struct Sandbox {
    pub ledger: Arc<InMemoryLedger>,
    pub key_servers: Vec<Arc<InMemoryKeyServer>>,
    pub nodes: Vec<Arc<InMemoryStorageNode>>,
    pub manager: Arc<ContentManager>,
    pub sessions: SessionKeyManager,
}

impl Sandbox {
    pub fn new(options: SandboxOptions) -> Result<Self, PipelineError> {
        let ledger = Arc::new(InMemoryLedger::new(SANDBOX_PACKAGE));
        let reader: Arc<dyn LedgerReader> = ledger.clone();

        let key_servers = (0..options.key_servers)
            .map(|i| {
                InMemoryKeyServer::new(
                    format!("sandbox-ks-{i}"),
                    b"sandbox",
                    reader.clone(),
                    SANDBOX_PACKAGE,
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let nodes: Vec<Arc<InMemoryStorageNode>> = (0..options.storage_nodes)
            .map(|i| Arc::new(InMemoryStorageNode::new(format!("sandbox-node-{i}"))))
            .collect();

        let encryption = EncryptionService::new(
            key_servers
                .iter()
                .map(|s| s.clone() as Arc<dyn KeyServer>)
                .collect(),
            options.retry,
            options.call_timeout,
        );
        let storage = StorageClient::new(
            nodes.iter().map(|n| n.clone() as Arc<dyn StorageNode>).collect(),
            reader.clone(),
            options.storage,
        )?;
        let enforcer = AccessPolicyEnforcer::new(reader.clone(), SANDBOX_PACKAGE, options.call_timeout);
        let mut manager = ContentManager::new(
            Arc::new(encryption),
            Arc::new(storage),
            enforcer,
            reader,
            options.retry,
        );
        if let Some(journal) = options.journal {
            manager = manager.with_journal(journal);
        }

        Ok(Self {
            ledger,
            key_servers,
            nodes,
            manager: Arc::new(manager),
            sessions: SessionKeyManager::default(),
        })
    }

    /// A fresh wallet on the sandbox ledger.
    pub fn wallet(&self) -> MemoryWallet {
        MemoryWallet::random(self.ledger.clone())
    }

    /// Create and sign a session key for `wallet`.
    pub async fn session_for(
        &self,
        wallet: &MemoryWallet,
        ttl_minutes: u32,
    ) -> Result<SessionKey, PipelineError> {
        let unsigned = self
            .sessions
            .create(wallet.address(), SANDBOX_PACKAGE, ttl_minutes)?;
        Ok(self.sessions.sign(unsigned, wallet).await?)
    }
}
