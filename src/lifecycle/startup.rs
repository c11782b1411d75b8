//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the config store
//! - Populate the live route table from the store
//! - Start the sync loop and the HTTP server
//!
//! # Design Decisions
//! - Fail fast: a store that cannot be reached at startup is fatal
//! - Listener binds last, after the first table is published

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ProxySettings;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::routing::LiveRouteTable;
use crate::store::{connect_store, ConfigStore, StoreError};
use crate::sync::{SyncError, SyncService, SyncState, SyncStats};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to connect to config store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("background task panicked: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A started proxy: sync loop and HTTP server running in the background.
pub struct ProxyHandle {
    local_addr: SocketAddr,
    table: LiveRouteTable,
    sync_state: watch::Receiver<SyncState>,
    sync_stats: Arc<SyncStats>,
    sync_task: JoinHandle<()>,
    server_task: JoinHandle<Result<(), std::io::Error>>,
}

impl ProxyHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn table(&self) -> &LiveRouteTable {
        &self.table
    }

    pub fn sync_state(&self) -> watch::Receiver<SyncState> {
        self.sync_state.clone()
    }

    pub fn sync_stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.sync_stats)
    }

    /// Wait for both tasks to finish after shutdown was triggered.
    pub async fn wait(self) -> Result<(), StartupError> {
        let served = self.server_task.await?;
        self.sync_task.await?;
        served.map_err(StartupError::Serve)
    }
}

/// Start the proxy against an already connected store.
pub async fn start(
    settings: &ProxySettings,
    store: Arc<dyn ConfigStore>,
    shutdown: &Shutdown,
) -> Result<ProxyHandle, StartupError> {
    let table = LiveRouteTable::new();
    let mut sync = SyncService::new(store, table.clone(), settings.store.key.clone(), settings.sync.clone());
    let sync_state = sync.state();
    let sync_stats = sync.stats();
    let sync_shutdown = shutdown.subscribe();
    let server_shutdown = shutdown.subscribe();

    let outcome = sync.initialize().await?;
    tracing::info!(
        key = %sync.key(),
        outcome = ?outcome,
        version = table.version(),
        "Initial route configuration loaded"
    );

    let listener = TcpListener::bind(&settings.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: settings.listener.bind_address.clone(),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(StartupError::Serve)?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let sync_task = tokio::spawn(sync.run(sync_shutdown));
    let server = HttpServer::new(settings, table.clone());
    let server_task = tokio::spawn(server.run(listener, server_shutdown));

    Ok(ProxyHandle {
        local_addr,
        table,
        sync_state,
        sync_stats,
        sync_task,
        server_task,
    })
}

/// Connect the configured store, start everything, and run until shutdown.
pub async fn run(settings: &ProxySettings, shutdown: &Shutdown) -> Result<(), StartupError> {
    let store = connect_store(&settings.store).await?;
    if shutdown.is_triggered() {
        tracing::info!("Shutdown requested during startup");
        return Ok(());
    }
    let handle = start(settings, store, shutdown).await?;
    handle.wait().await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
