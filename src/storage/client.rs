// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Storage client: drives the write protocol and performs verified reads.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cache::BlobCache;
use super::handle::{BlobHandle, BlobStatus, InvalidTransition};
use super::node::{NodeError, StorageNode};
use super::plan::{EncodedPlan, Manifest};
use crate::error::PipelineError;
use crate::ledger::{
    execute_with_timeout, BlobRegistration, LedgerError, LedgerReader, LedgerTransaction,
    TransactionSigner,
};
use crate::retry::{with_backoff, RetryPolicy};
use crate::types::{BlobId, ChunkId};

/// Default chunk size (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default maximum blob size (64 MiB).
pub const DEFAULT_MAX_BLOB_SIZE: u64 = 64 * 1024 * 1024;

/// Storage client configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub chunk_size: usize,
    /// Nodes each chunk is placed on.
    pub replication: usize,
    /// Nodes that must acknowledge before an upload completes.
    pub quorum: usize,
    pub max_blob_size: u64,
    /// Storage lifetime used when the caller does not choose one.
    pub default_epochs: u32,
    /// Deadline for a single node call.
    pub call_timeout: Duration,
    /// Deadline for a ledger query or transaction.
    pub ledger_timeout: Duration,
    /// Backoff for failing nodes and unavailable reads.
    pub retry: RetryPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            replication: 2,
            quorum: 2,
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
            default_epochs: 5,
            call_timeout: Duration::from_secs(10),
            ledger_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Size and type of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobStat {
    pub blob_id: BlobId,
    /// Body size in bytes.
    pub size: u64,
    pub chunk_count: usize,
    pub content_type: Option<String>,
}

/// Client for the blob network.
pub struct StorageClient {
    nodes: Vec<Arc<dyn StorageNode>>,
    ledger: Arc<dyn LedgerReader>,
    config: StorageConfig,
    cache: Option<Arc<BlobCache>>,
}

impl StorageClient {
    pub fn new(
        nodes: Vec<Arc<dyn StorageNode>>,
        ledger: Arc<dyn LedgerReader>,
        config: StorageConfig,
    ) -> Result<Self, PipelineError> {
        let n = nodes.len();
        if n == 0 {
            return Err(PipelineError::InvalidInput(
                "at least one storage node is required".into(),
            ));
        }
        if config.chunk_size == 0 {
            return Err(PipelineError::InvalidInput("chunk size must be positive".into()));
        }
        if config.quorum == 0 || config.quorum > n {
            return Err(PipelineError::InvalidInput(format!(
                "quorum {} must be between 1 and {n}",
                config.quorum
            )));
        }
        if config.replication == 0 || config.replication > n {
            return Err(PipelineError::InvalidInput(format!(
                "replication {} must be between 1 and {n}",
                config.replication
            )));
        }
        Ok(Self {
            nodes,
            ledger,
            config,
            cache: None,
        })
    }

    /// Serve repeated reads of verified blobs from `cache`.
    pub fn with_cache(mut self, cache: Arc<BlobCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // =========================================================================
    // Write protocol
    // =========================================================================

    /// Chunk, address and place `files`. No I/O.
    pub fn encode(&self, files: &[&[u8]]) -> Result<EncodedPlan, PipelineError> {
        let size: u64 = files.iter().map(|f| f.len() as u64).sum();
        if size > self.config.max_blob_size {
            return Err(PipelineError::InvalidInput(format!(
                "blob of {size} bytes exceeds the {} byte limit",
                self.config.max_blob_size
            )));
        }
        Ok(EncodedPlan::encode(
            files,
            self.config.chunk_size,
            self.config.replication,
            self.nodes.len(),
        ))
    }

    /// Register the blob on the ledger.
    pub async fn register(
        &self,
        plan: &EncodedPlan,
        signer: &dyn TransactionSigner,
        epochs: u32,
        deletable: bool,
    ) -> Result<BlobHandle, PipelineError> {
        if epochs == 0 {
            return Err(PipelineError::InvalidInput("epochs must be positive".into()));
        }
        let blob_id = plan.blob_id();
        let tx = LedgerTransaction::RegisterBlob {
            blob_id,
            size: plan.size(),
            epochs,
            deletable,
        };
        let digest = execute_with_timeout(signer, tx, self.config.ledger_timeout)
            .await
            .map_err(|e| PipelineError::from_ledger(blob_id, e))?;

        info!(%blob_id, size = plan.size(), epochs, tx = %digest, "Blob registered");
        Ok(BlobHandle::registered(
            blob_id,
            signer.address(),
            epochs,
            deletable,
            plan.size(),
        ))
    }

    /// Store every sliver on its nodes until quorum and full coverage.
    ///
    /// Re-running on an `Uploaded` handle re-sends idempotently.
    pub async fn upload(
        &self,
        handle: BlobHandle,
        plan: &EncodedPlan,
    ) -> Result<BlobHandle, PipelineError> {
        let blob_id = handle.blob_id();
        if plan.blob_id() != blob_id {
            return Err(PipelineError::InvalidInput(format!(
                "plan for {} does not match handle {blob_id}",
                plan.blob_id()
            )));
        }
        if plan.node_count() != self.nodes.len() {
            return Err(PipelineError::InvalidInput(format!(
                "plan placed on {} nodes, client has {}",
                plan.node_count(),
                self.nodes.len()
            )));
        }
        if handle.status() == BlobStatus::Certified {
            return Err(InvalidTransition {
                from: BlobStatus::Certified,
                to: BlobStatus::Uploaded,
            }
            .into());
        }

        let participants: Vec<usize> = (0..self.nodes.len())
            .filter(|&node| !plan.assignments(node).is_empty())
            .collect();
        let required = self.config.quorum.min(participants.len());
        let mut acked: BTreeSet<usize> = BTreeSet::new();
        let mut attempt = 1;

        loop {
            let pending: Vec<usize> = participants
                .iter()
                .copied()
                .filter(|node| !acked.contains(node))
                .collect();
            self.upload_round(plan, handle.epochs(), &pending, required, &mut acked)
                .await;

            if upload_complete(plan, &acked, required) {
                break;
            }
            if !self.config.retry.allows_retry(attempt) {
                warn!(
                    %blob_id,
                    acked = acked.len(),
                    required,
                    attempts = attempt,
                    "Upload quorum not reached"
                );
                return Err(PipelineError::StorageQuorumFailure {
                    blob_id,
                    acked: acked.len(),
                    required,
                });
            }
            let delay = self.config.retry.backoff(attempt);
            warn!(
                %blob_id,
                acked = acked.len(),
                required,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Upload incomplete, retrying failed nodes"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }

        info!(%blob_id, acked = acked.len(), required, "Blob uploaded");
        match handle.status() {
            BlobStatus::Registered => Ok(handle.advance(BlobStatus::Uploaded)?),
            _ => Ok(handle),
        }
    }

    /// One fan-out to `pending` nodes. Returns once the upload is complete
    /// or every node answered.
    async fn upload_round(
        &self,
        plan: &EncodedPlan,
        epochs: u32,
        pending: &[usize],
        required: usize,
        acked: &mut BTreeSet<usize>,
    ) {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        for &index in pending {
            let node = self.nodes[index].clone();
            let slivers: Vec<(ChunkId, Arc<[u8]>)> = plan
                .assignments(index)
                .into_iter()
                .map(|s| {
                    let sliver = &plan.slivers()[s];
                    (sliver.id, sliver.bytes.clone())
                })
                .collect();
            let cancel = cancel.child_token();
            let timeout = self.config.call_timeout;

            tasks.spawn(async move {
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(NodeError::Unavailable("cancelled".into())),
                    result = store_all(node.as_ref(), slivers, epochs, timeout) => result,
                };
                (index, node.id().to_string(), result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, node_id, Ok(()))) => {
                    if acked.insert(index) {
                        debug!(node = %node_id, blob_id = %plan.blob_id(), "Node acknowledged");
                    }
                    if upload_complete(plan, acked, required) {
                        cancel.cancel();
                        if !tasks.is_empty() {
                            debug!(stragglers = tasks.len(), "Cancelling straggler uploads");
                        }
                        tasks.abort_all();
                        break;
                    }
                }
                Ok((_, node_id, Err(e))) => {
                    warn!(node = %node_id, blob_id = %plan.blob_id(), error = %e, "Node store failed");
                }
                Err(e) => {
                    warn!(error = %e, "Upload task failed");
                }
            }
        }
    }

    /// Certify an uploaded blob on the ledger.
    pub async fn certify(
        &self,
        handle: BlobHandle,
        signer: &dyn TransactionSigner,
    ) -> Result<BlobHandle, PipelineError> {
        if !handle.status().can_advance_to(BlobStatus::Certified) {
            return Err(InvalidTransition {
                from: handle.status(),
                to: BlobStatus::Certified,
            }
            .into());
        }
        let blob_id = handle.blob_id();
        let digest = execute_with_timeout(
            signer,
            LedgerTransaction::CertifyBlob { blob_id },
            self.config.ledger_timeout,
        )
        .await
        .map_err(|e| PipelineError::from_ledger(blob_id, e))?;

        info!(%blob_id, tx = %digest, "Blob certified");
        Ok(handle.advance(BlobStatus::Certified)?)
    }

    /// Current ledger view of a blob, used to settle ambiguous outcomes.
    pub async fn resolve(
        &self,
        blob_id: &BlobId,
    ) -> Result<Option<BlobRegistration>, PipelineError> {
        tokio::time::timeout(self.config.ledger_timeout, self.ledger.blob_registration(blob_id))
            .await
            .map_err(|_| LedgerError::Rpc(format!("blob status query for {blob_id} timed out")))?
            .map_err(PipelineError::from)
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Read and verify a blob; returns its body.
    pub async fn read(&self, blob_id: &BlobId) -> Result<Vec<u8>, PipelineError> {
        Ok(self.read_files(blob_id).await?.concat())
    }

    /// Read and verify a blob; returns its files.
    pub async fn read_files(&self, blob_id: &BlobId) -> Result<Arc<Vec<Vec<u8>>>, PipelineError> {
        if let Some(cache) = &self.cache {
            if let Some(files) = cache.get(blob_id) {
                debug!(%blob_id, "Blob served from cache");
                return Ok(files);
            }
        }

        let files = with_backoff(
            &self.config.retry,
            "blob_read",
            |_| self.read_once(blob_id),
            |e: &PipelineError| matches!(e, PipelineError::StorageUnavailable { .. }),
        )
        .await?;

        let files = Arc::new(files);
        if let Some(cache) = &self.cache {
            cache.put(*blob_id, files.clone());
        }
        Ok(files)
    }

    async fn read_once(&self, blob_id: &BlobId) -> Result<Vec<Vec<u8>>, PipelineError> {
        let manifest = self.fetch_manifest(blob_id).await?;

        let mut body = Vec::with_capacity(manifest.size as usize);
        for (index, chunk_id) in manifest.chunks.iter().enumerate() {
            let bytes = self
                .fetch_sliver(blob_id, chunk_id, self.candidates(index))
                .await?;
            manifest
                .verify_chunk(index, &bytes)
                .map_err(|e| PipelineError::integrity(blob_id, e))?;
            body.extend_from_slice(&bytes);
        }

        let files = manifest
            .split_files(&body)
            .map_err(|e| PipelineError::integrity(blob_id, e))?;
        debug!(%blob_id, size = manifest.size, chunks = manifest.chunks.len(), "Blob read");
        Ok(files)
    }

    async fn fetch_manifest(&self, blob_id: &BlobId) -> Result<Manifest, PipelineError> {
        let order: Vec<usize> = (0..self.nodes.len()).collect();
        let bytes = self
            .fetch_sliver(blob_id, &ChunkId::from(*blob_id), order)
            .await?;
        Manifest::decode(blob_id, &bytes).map_err(|e| PipelineError::integrity(blob_id, e))
    }

    /// Placement nodes of sliver `index` first, then the rest.
    fn candidates(&self, index: usize) -> Vec<usize> {
        let n = self.nodes.len();
        let replication = self.config.replication.min(n);
        let mut order: Vec<usize> = (0..replication).map(|r| (index + r) % n).collect();
        let rest: Vec<usize> = (0..n).filter(|node| !order.contains(node)).collect();
        order.extend(rest);
        order
    }

    /// First answer from `order` wins; its bytes are verified by the caller.
    async fn fetch_sliver(
        &self,
        blob_id: &BlobId,
        id: &ChunkId,
        order: Vec<usize>,
    ) -> Result<Vec<u8>, PipelineError> {
        let mut last_error = String::from("no storage nodes");
        for index in order {
            let node = &self.nodes[index];
            match tokio::time::timeout(self.config.call_timeout, node.fetch(id)).await {
                Ok(Ok(bytes)) => return Ok(bytes),
                Ok(Err(e)) => {
                    debug!(node = node.id(), chunk = %id, error = %e, "Replica fetch failed");
                    last_error = e.to_string();
                }
                Err(_) => {
                    debug!(node = node.id(), chunk = %id, "Replica fetch timed out");
                    last_error = format!("{} timed out", node.id());
                }
            }
        }
        Err(PipelineError::StorageUnavailable {
            blob_id: *blob_id,
            reason: format!("no replica answered for {id}: {last_error}"),
        })
    }

    /// Size and content type of a stored blob.
    pub async fn stat(&self, blob_id: &BlobId) -> Result<BlobStat, PipelineError> {
        let manifest_id = ChunkId::from(*blob_id);
        let mut content_type = None;
        for node in &self.nodes {
            if let Ok(Ok(stat)) =
                tokio::time::timeout(self.config.call_timeout, node.stat(&manifest_id)).await
            {
                content_type = stat.content_type;
                break;
            }
        }
        let manifest = self.fetch_manifest(blob_id).await?;
        Ok(BlobStat {
            blob_id: *blob_id,
            size: manifest.size,
            chunk_count: manifest.chunks.len(),
            content_type,
        })
    }
}

/// Store every assigned sliver on one node and check the returned ids.
async fn store_all(
    node: &dyn StorageNode,
    slivers: Vec<(ChunkId, Arc<[u8]>)>,
    epochs: u32,
    timeout: Duration,
) -> Result<(), NodeError> {
    for (id, bytes) in slivers {
        let response = tokio::time::timeout(timeout, node.store(bytes, epochs))
            .await
            .map_err(|_| NodeError::Unavailable(format!("{} timed out", node.id())))??;
        if response.stored_id() != id {
            return Err(NodeError::InvalidResponse(format!(
                "stored {} but expected {id}",
                response.stored_id()
            )));
        }
    }
    Ok(())
}

/// Quorum reached and every sliver held by an acknowledging node.
fn upload_complete(plan: &EncodedPlan, acked: &BTreeSet<usize>, required: usize) -> bool {
    acked.len() >= required
        && (0..plan.slivers().len())
            .all(|s| plan.placement(s).iter().any(|node| acked.contains(node)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedger, LedgerFault, MemoryWallet};
    use crate::storage::memory::InMemoryStorageNode;
    use alloy::primitives::Address;

    struct Fixture {
        nodes: Vec<Arc<InMemoryStorageNode>>,
        ledger: Arc<InMemoryLedger>,
        wallet: MemoryWallet,
        client: StorageClient,
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    fn fixture(node_count: usize, quorum: usize, replication: usize) -> Fixture {
        let nodes: Vec<Arc<InMemoryStorageNode>> = (0..node_count)
            .map(|i| Arc::new(InMemoryStorageNode::new(format!("node-{i}"))))
            .collect();
        let ledger = Arc::new(InMemoryLedger::new(Address::ZERO));
        let wallet = MemoryWallet::random(ledger.clone());
        let config = StorageConfig {
            chunk_size: 4,
            replication,
            quorum,
            max_blob_size: 64,
            default_epochs: 1,
            call_timeout: Duration::from_millis(500),
            ledger_timeout: Duration::from_millis(500),
            retry: fast_retry(),
        };
        let client = StorageClient::new(
            nodes.iter().map(|n| n.clone() as Arc<dyn StorageNode>).collect(),
            ledger.clone(),
            config,
        )
        .unwrap();
        Fixture {
            nodes,
            ledger,
            wallet,
            client,
        }
    }

    async fn store(fx: &Fixture, data: &[u8]) -> (EncodedPlan, BlobHandle) {
        let plan = fx.client.encode(&[data]).unwrap();
        let handle = fx.client.register(&plan, &fx.wallet, 2, false).await.unwrap();
        let handle = fx.client.upload(handle, &plan).await.unwrap();
        let handle = fx.client.certify(handle, &fx.wallet).await.unwrap();
        (plan, handle)
    }

    #[tokio::test]
    async fn write_protocol_reaches_certified_and_reads_back() {
        let fx = fixture(3, 2, 2);
        let (plan, handle) = store(&fx, b"ciphertext bytes").await;

        assert_eq!(handle.status(), BlobStatus::Certified);
        assert_eq!(handle.blob_id(), plan.blob_id());
        assert_eq!(fx.client.read(&handle.blob_id()).await.unwrap(), b"ciphertext bytes");

        let reg = fx.client.resolve(&handle.blob_id()).await.unwrap().unwrap();
        assert_eq!(reg.status, BlobStatus::Certified);

        let stat = fx.client.stat(&handle.blob_id()).await.unwrap();
        assert_eq!(stat.size, 16);
        assert_eq!(stat.chunk_count, 4);
    }

    #[tokio::test]
    async fn one_node_down_still_reaches_quorum() {
        let fx = fixture(3, 2, 2);
        fx.nodes[2].set_offline(true);
        let (_, handle) = store(&fx, b"survives a node").await;
        assert_eq!(handle.status(), BlobStatus::Certified);
    }

    #[tokio::test]
    async fn quorum_failure_after_retries() {
        let fx = fixture(3, 2, 2);
        fx.nodes[1].set_offline(true);
        fx.nodes[2].set_offline(true);

        let plan = fx.client.encode(&[b"doomed".as_slice()]).unwrap();
        let handle = fx.client.register(&plan, &fx.wallet, 1, false).await.unwrap();
        let err = fx.client.upload(handle, &plan).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StorageQuorumFailure { acked: 1, required: 2, .. }
        ));
        assert!(err.is_retryable());
        // 3 attempts against each failing node
        assert_eq!(fx.nodes[1].store_calls(), 3);
    }

    #[tokio::test]
    async fn transient_node_failure_is_retried() {
        let fx = fixture(2, 2, 2);
        fx.nodes[0].fail_next_stores(1);
        let (_, handle) = store(&fx, b"flaky").await;
        assert_eq!(handle.status(), BlobStatus::Certified);
        assert!(fx.nodes[0].held() > 0);
    }

    #[tokio::test]
    async fn upload_is_idempotent() {
        let fx = fixture(3, 2, 2);
        let plan = fx.client.encode(&[b"same bytes".as_slice()]).unwrap();
        let handle = fx.client.register(&plan, &fx.wallet, 1, false).await.unwrap();

        let first = fx.client.upload(handle, &plan).await.unwrap();
        let held: Vec<usize> = fx.nodes.iter().map(|n| n.held()).collect();
        let second = fx.client.upload(first.clone(), &plan).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.status(), BlobStatus::Uploaded);
        assert_eq!(held, fx.nodes.iter().map(|n| n.held()).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn out_of_order_transitions_are_rejected() {
        let fx = fixture(2, 1, 1);
        let plan = fx.client.encode(&[b"order".as_slice()]).unwrap();
        let handle = fx.client.register(&plan, &fx.wallet, 1, false).await.unwrap();

        let err = fx.client.certify(handle.clone(), &fx.wallet).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTransition(_)));
        // Nothing was sent to the ledger.
        assert_eq!(fx.ledger.events().len(), 1);

        let uploaded = fx.client.upload(handle, &plan).await.unwrap();
        let certified = fx.client.certify(uploaded, &fx.wallet).await.unwrap();
        assert!(matches!(
            fx.client.upload(certified, &plan).await,
            Err(PipelineError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn corrupted_chunk_is_an_integrity_error() {
        let fx = fixture(2, 2, 2);
        let (plan, handle) = store(&fx, b"tamper-evident").await;

        // Chunk 0 is read from node 0 first.
        assert!(fx.nodes[0].corrupt(&plan.slivers()[0].id));
        let err = fx.client.read(&handle.blob_id()).await.unwrap_err();
        assert!(matches!(err, PipelineError::IntegrityError { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_replicas_are_unavailable() {
        let fx = fixture(2, 2, 2);
        let (_, handle) = store(&fx, b"gone").await;
        for node in &fx.nodes {
            node.set_offline(true);
        }
        let err = fx.client.read(&handle.blob_id()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn reads_fall_over_to_live_replicas() {
        // full quorum, so every replica is written before nodes go down
        let fx = fixture(3, 3, 2);
        let (_, handle) = store(&fx, b"replicated body").await;
        fx.nodes[0].set_offline(true);
        assert_eq!(fx.client.read(&handle.blob_id()).await.unwrap(), b"replicated body");
    }

    #[tokio::test]
    async fn cached_reads_skip_nodes() {
        let fx = fixture(2, 1, 1);
        let client = StorageClient::new(
            fx.nodes.iter().map(|n| n.clone() as Arc<dyn StorageNode>).collect(),
            fx.ledger.clone(),
            fx.client.config().clone(),
        )
        .unwrap()
        .with_cache(Arc::new(BlobCache::new(8, 1024 * 1024, Duration::from_secs(60))));

        let plan = client.encode(&[b"cache me".as_slice()]).unwrap();
        let handle = client.register(&plan, &fx.wallet, 1, false).await.unwrap();
        let handle = client.upload(handle, &plan).await.unwrap();

        client.read(&handle.blob_id()).await.unwrap();
        let fetches: usize = fx.nodes.iter().map(|n| n.fetch_calls()).sum();
        client.read(&handle.blob_id()).await.unwrap();
        assert_eq!(fetches, fx.nodes.iter().map(|n| n.fetch_calls()).sum::<usize>());
    }

    #[tokio::test]
    async fn ambiguous_registration_is_reported_and_resolvable() {
        let fx = fixture(2, 1, 1);
        fx.ledger
            .fail_next("register_blob", LedgerFault::AmbiguousAfterCommit);
        let plan = fx.client.encode(&[b"maybe".as_slice()]).unwrap();

        let err = fx.client.register(&plan, &fx.wallet, 1, false).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::LedgerAmbiguous { operation: "register_blob", .. }
        ));
        let reg = fx.client.resolve(&plan.blob_id()).await.unwrap().unwrap();
        assert_eq!(reg.status, BlobStatus::Registered);
    }

    #[test]
    fn oversized_input_is_rejected() {
        let fx = fixture(1, 1, 1);
        let big = vec![0u8; 65];
        assert!(matches!(
            fx.client.encode(&[big.as_slice()]),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn invalid_quorum_is_rejected() {
        let ledger = Arc::new(InMemoryLedger::new(Address::ZERO));
        let nodes: Vec<Arc<dyn StorageNode>> = vec![Arc::new(InMemoryStorageNode::new("n"))];
        let config = StorageConfig {
            quorum: 2,
            replication: 1,
            ..StorageConfig::default()
        };
        assert!(StorageClient::new(nodes, ledger, config).is_err());
    }
}
