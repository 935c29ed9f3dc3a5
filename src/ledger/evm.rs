// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM binding of the ledger seams.
//!
//! Blob registrations, content records and the `sealApprove` policy check
//! live in a single registry contract. Reads and simulations go through
//! `eth_call`; writes are signed locally and awaited for a receipt.

use std::time::Duration;

use alloy::{
    network::EthereumWallet,
    primitives::{Address, Bytes, Signature, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    signers::{local::PrivateKeySigner, Signer},
    sol,
    sol_types::SolCall,
};
use async_trait::async_trait;

use super::{
    BlobRegistration, ContentRecord, LedgerError, LedgerReader, LedgerTransaction,
    TransactionSigner, TxDigest,
};
use crate::policy::{AccessPolicy, PolicyProofTx};
use crate::storage::BlobStatus;
use crate::types::{BlobId, ContentId, Identity};

sol! {
    #[sol(rpc)]
    interface IContentRegistry {
        function registerBlob(bytes32 blobId, uint64 size, uint32 epochs, bool deletable) external;
        function certifyBlob(bytes32 blobId) external;
        function blobInfo(bytes32 blobId) external view returns (address owner, uint8 status, uint64 size, uint32 epochs, bool deletable);
        function createContent(bytes32 contentId, string title, string description, bytes32 blobId, address[] recipients, uint32 threshold, bytes sealedKey, bytes nonce) external;
        function contentOf(bytes32 contentId) external view returns (address creator, bytes32 blobId, string title, string description, address[] recipients, uint32 threshold, bytes sealedKey, bytes nonce);
        function sealApprove(bytes id, address requester) external view returns (bool);
    }
}

/// On-chain blob status codes.
const STATUS_REGISTERED: u8 = 1;
const STATUS_CERTIFIED: u8 = 2;

/// Default wait for a transaction receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Registry deployment the pipeline talks to.
#[derive(Debug, Clone)]
pub struct LedgerNetwork {
    /// JSON-RPC endpoint URL
    pub rpc_url: String,
    /// Registry contract address; also the session package id
    pub registry: Address,
    /// How long to wait for a receipt before reporting an ambiguous outcome
    pub confirmation_timeout: Duration,
}

impl LedgerNetwork {
    pub fn new(rpc_url: impl Into<String>, registry: Address) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            registry,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }

    fn url(&self) -> Result<url::Url, LedgerError> {
        self.rpc_url
            .parse()
            .map_err(|e: url::ParseError| LedgerError::InvalidRpcUrl(e.to_string()))
    }
}

/// Read-only registry client.
pub struct EvmLedger {
    network: LedgerNetwork,
    provider: DynProvider,
    contract: IContentRegistry::IContentRegistryInstance<DynProvider>,
}

impl EvmLedger {
    pub fn new(network: LedgerNetwork) -> Result<Self, LedgerError> {
        let provider = ProviderBuilder::new().connect_http(network.url()?).erased();
        let contract = IContentRegistry::new(network.registry, provider.clone());
        Ok(Self {
            network,
            provider,
            contract,
        })
    }

    pub fn network(&self) -> &LedgerNetwork {
        &self.network
    }

    /// Current block number.
    pub async fn block_number(&self) -> Result<u64, LedgerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }
}

#[async_trait]
impl LedgerReader for EvmLedger {
    async fn blob_registration(
        &self,
        blob_id: &BlobId,
    ) -> Result<Option<BlobRegistration>, LedgerError> {
        let info = self
            .contract
            .blobInfo(blob_id.0)
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if info.owner == Address::ZERO {
            return Ok(None);
        }
        let status = match info.status {
            STATUS_REGISTERED => BlobStatus::Registered,
            STATUS_CERTIFIED => BlobStatus::Certified,
            other => {
                return Err(LedgerError::InvalidRecord(format!(
                    "unknown blob status {other} for {blob_id}"
                )))
            }
        };

        Ok(Some(BlobRegistration {
            blob_id: *blob_id,
            owner: info.owner,
            status,
            size: info.size,
            epochs: info.epochs,
            deletable: info.deletable,
        }))
    }

    async fn content_record(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<ContentRecord>, LedgerError> {
        let record = self
            .contract
            .contentOf(content_id.0)
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        if record.creator == Address::ZERO {
            return Ok(None);
        }
        let policy = AccessPolicy::new(record.recipients, record.threshold)
            .map_err(|e| LedgerError::InvalidRecord(format!("{content_id}: {e}")))?;

        Ok(Some(ContentRecord {
            content_id: *content_id,
            blob_id: BlobId(record.blobId),
            policy,
            creator: record.creator,
            title: record.title,
            description: record.description,
            sealed_key: record.sealedKey,
            nonce: record.nonce,
        }))
    }

    async fn simulate_seal_approve(&self, proof: &PolicyProofTx) -> Result<bool, LedgerError> {
        let id = proof
            .to_bytes()
            .map_err(|e| LedgerError::InvalidRecord(e.to_string()))?;

        match self
            .contract
            .sealApprove(Bytes::from(id), proof.requester)
            .from(proof.requester)
            .call()
            .await
        {
            Ok(approved) => Ok(approved),
            // The contract aborts on denial.
            Err(e) if e.to_string().contains("revert") => {
                tracing::debug!(
                    content_id = %proof.content_id,
                    requester = %proof.requester,
                    "sealApprove reverted"
                );
                Ok(false)
            }
            Err(e) => Err(LedgerError::Rpc(e.to_string())),
        }
    }

    async fn health(&self) -> Result<(), LedgerError> {
        self.block_number().await.map(|_| ())
    }
}

/// Wallet-backed transaction signer for the registry.
pub struct EvmSigner {
    network: LedgerNetwork,
    signer: PrivateKeySigner,
    provider: DynProvider,
}

impl EvmSigner {
    pub fn new(network: LedgerNetwork, signer: PrivateKeySigner) -> Result<Self, LedgerError> {
        let wallet = EthereumWallet::from(signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(network.url()?)
            .erased();
        Ok(Self {
            network,
            signer,
            provider,
        })
    }

    fn calldata(tx: &LedgerTransaction) -> Vec<u8> {
        match tx {
            LedgerTransaction::RegisterBlob {
                blob_id,
                size,
                epochs,
                deletable,
            } => IContentRegistry::registerBlobCall {
                blobId: blob_id.0,
                size: *size,
                epochs: *epochs,
                deletable: *deletable,
            }
            .abi_encode(),
            LedgerTransaction::CertifyBlob { blob_id } => {
                IContentRegistry::certifyBlobCall { blobId: blob_id.0 }.abi_encode()
            }
            LedgerTransaction::CreateContent(record) => IContentRegistry::createContentCall {
                contentId: record.content_id.0,
                title: record.title.clone(),
                description: record.description.clone(),
                blobId: record.blob_id.0,
                recipients: record.policy.recipients().iter().copied().collect(),
                threshold: record.policy.threshold(),
                sealedKey: record.sealed_key.clone(),
                nonce: record.nonce.clone(),
            }
            .abi_encode(),
        }
    }
}

#[async_trait]
impl TransactionSigner for EvmSigner {
    fn address(&self) -> Identity {
        self.signer.address()
    }

    async fn sign_personal_message(&self, message: &[u8]) -> Result<Signature, LedgerError> {
        self.signer
            .sign_message(message)
            .await
            .map_err(|e| LedgerError::Signing(e.to_string()))
    }

    async fn sign_and_execute(&self, tx: LedgerTransaction) -> Result<TxDigest, LedgerError> {
        let kind = tx.kind();
        let request = TransactionRequest::default()
            .from(self.signer.address())
            .to(self.network.registry)
            .input(Self::calldata(&tx).into());

        let pending = self.provider.send_transaction(request).await.map_err(|e| {
            let reason = e.to_string();
            if reason.contains("revert") {
                LedgerError::Rejected(reason)
            } else {
                // The node may have accepted the transaction before failing.
                LedgerError::Ambiguous { kind, reason }
            }
        })?;

        let tx_hash: B256 = *pending.tx_hash();
        tracing::info!(kind, blob_id = %tx.blob_id(), tx_hash = %tx_hash, "Ledger transaction sent");

        let receipt = pending
            .with_timeout(Some(self.network.confirmation_timeout))
            .get_receipt()
            .await
            .map_err(|e| LedgerError::Ambiguous {
                kind,
                reason: format!("no receipt for {tx_hash}: {e}"),
            })?;

        if !receipt.status() {
            return Err(LedgerError::Rejected(format!(
                "{kind} reverted in {tx_hash}"
            )));
        }
        Ok(TxDigest(format!("{tx_hash}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_rpc_url_is_rejected() {
        let network = LedgerNetwork::new("not a url", Address::ZERO);
        assert!(matches!(
            EvmLedger::new(network),
            Err(LedgerError::InvalidRpcUrl(_))
        ));
    }

    #[test]
    fn calldata_starts_with_selector() {
        let tx = LedgerTransaction::CertifyBlob {
            blob_id: BlobId::from_bytes([9; 32]),
        };
        let data = EvmSigner::calldata(&tx);
        assert_eq!(&data[..4], &IContentRegistry::certifyBlobCall::SELECTOR);
        assert_eq!(&data[4..], &[9u8; 32]);
    }

    #[tokio::test]
    async fn signer_reports_wallet_address() {
        let key = PrivateKeySigner::random();
        let address = key.address();
        let signer = EvmSigner::new(
            LedgerNetwork::new("http://127.0.0.1:8545", Address::ZERO),
            key,
        )
        .unwrap();
        assert_eq!(signer.address(), address);

        let signature = signer.sign_personal_message(b"hello").await.unwrap();
        assert_eq!(
            signature.recover_address_from_msg(b"hello").unwrap(),
            address
        );
    }
}
