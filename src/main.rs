// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::error::Error;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sealed_content::{
    api::router,
    config::{PipelineConfig, ServerConfig, DEFAULT_LOG_FILTER},
    content::ContentManager,
    encryption::{EncryptionService, HttpKeyServer, KeyServer},
    ledger::{signing::load_signer, EvmLedger, EvmSigner, LedgerNetwork, LedgerReader},
    policy::AccessPolicyEnforcer,
    session::SessionKeyManager,
    state::AppState,
    storage::{BlobCache, HttpStorageNode, StorageClient, StorageNode, UploadJournal},
};

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wire the pipeline against the configured external networks.
async fn build_state() -> Result<AppState, Box<dyn Error>> {
    let config = PipelineConfig::from_env()?;

    let network = LedgerNetwork {
        confirmation_timeout: config.storage.ledger_timeout,
        ..LedgerNetwork::new(config.ledger_rpc_url.clone(), config.registry_address)
    };
    let ledger = Arc::new(EvmLedger::new(network.clone())?);
    let signer = Arc::new(EvmSigner::new(
        network,
        load_signer(&config.wallet_key_path)?,
    )?);
    match ledger.block_number().await {
        Ok(block) => info!(block, rpc = %config.ledger_rpc_url, "Ledger reachable"),
        Err(e) => warn!(error = %e, "Ledger not reachable yet, continuing"),
    }
    let reader: Arc<dyn LedgerReader> = ledger;

    let key_servers = config
        .key_server_urls
        .iter()
        .map(|url| {
            HttpKeyServer::new(url, config.request_timeout)
                .map(|server| Arc::new(server) as Arc<dyn KeyServer>)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let nodes = config
        .storage_node_urls
        .iter()
        .map(|url| {
            HttpStorageNode::new(url, config.request_timeout)
                .map(|node| Arc::new(node) as Arc<dyn StorageNode>)
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        key_servers = key_servers.len(),
        storage_nodes = nodes.len(),
        quorum = config.storage.quorum,
        "Networks configured"
    );

    let encryption = EncryptionService::new(key_servers, config.retry, config.request_timeout);
    let mut storage = StorageClient::new(nodes, reader.clone(), config.storage.clone())?;
    if config.blob_cache_capacity > 0 && config.blob_cache_max_bytes > 0 {
        storage = storage.with_cache(Arc::new(BlobCache::new(
            config.blob_cache_capacity,
            config.blob_cache_max_bytes,
            config.blob_cache_ttl,
        )));
    }
    let enforcer =
        AccessPolicyEnforcer::new(reader.clone(), config.registry_address, config.request_timeout);

    let mut manager = ContentManager::new(
        Arc::new(encryption),
        Arc::new(storage),
        enforcer,
        reader.clone(),
        config.retry,
    );
    if let Some(path) = &config.journal_path {
        let journal = UploadJournal::open(path)?;
        let incomplete = journal.incomplete()?;
        if !incomplete.is_empty() {
            warn!(count = incomplete.len(), "Journal lists unfinished uploads");
        }
        manager = manager.with_journal(Arc::new(journal));
        info!(path = %path.display(), "Upload journal opened");
    }

    Ok(AppState::new(
        Arc::new(manager),
        SessionKeyManager::new(config.session_max_ttl_minutes),
        signer,
        reader,
        config.registry_address,
    ))
}

#[cfg(feature = "dev")]
fn sandbox_state() -> Result<AppState, Box<dyn Error>> {
    use sealed_content::sandbox::{Sandbox, SandboxOptions};

    let sandbox = Sandbox::new(SandboxOptions::default())?;
    warn!("Running against the in-process sandbox network; nothing is durable");
    Ok(AppState::sandbox(&sandbox))
}

#[cfg(not(feature = "dev"))]
fn sandbox_state() -> Result<AppState, Box<dyn Error>> {
    Err("SANDBOX requires a build with the `dev` feature".into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let server = match ServerConfig::from_env() {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Invalid server configuration: {e}");
            std::process::exit(1);
        }
    };
    init_tracing(server.json_logs);

    let state = if server.sandbox {
        sandbox_state()
    } else {
        build_state().await
    };
    let state = match state {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };

    let app = router(state);
    let address = server.bind_address();
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%address, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    info!(%address, "Sealed content gateway listening (docs at /docs)");
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}
