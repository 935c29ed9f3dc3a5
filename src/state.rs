// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::content::ContentManager;
use crate::ledger::{LedgerReader, TransactionSigner};
use crate::session::SessionKeyManager;
use crate::types::PackageId;

/// Shared gateway state. Every component is built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ContentManager>,
    pub sessions: SessionKeyManager,
    /// Wallet the gateway publishes content with.
    pub signer: Arc<dyn TransactionSigner>,
    pub ledger: Arc<dyn LedgerReader>,
    pub package_id: PackageId,
}

impl AppState {
    pub fn new(
        manager: Arc<ContentManager>,
        sessions: SessionKeyManager,
        signer: Arc<dyn TransactionSigner>,
        ledger: Arc<dyn LedgerReader>,
        package_id: PackageId,
    ) -> Self {
        Self {
            manager,
            sessions,
            signer,
            ledger,
            package_id,
        }
    }

    /// Gateway state over a sandbox network, publishing as a fresh wallet.
    #[cfg(any(test, feature = "dev"))]
    pub fn sandbox(sandbox: &crate::sandbox::Sandbox) -> Self {
        Self::new(
            sandbox.manager.clone(),
            sandbox.sessions.clone(),
            Arc::new(sandbox.wallet()),
            sandbox.ledger.clone(),
            crate::sandbox::SANDBOX_PACKAGE,
        )
    }
}
