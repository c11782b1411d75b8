//! The sync loop: store payloads in, published route tables out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::config::SyncConfig;
use crate::document::{decode_document, validate_document, ConfigurationDocument, ValidationError};
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::routing::{resolve_host_header_policy, HostHeaderPolicy, LiveRouteTable};
use crate::store::{ConfigStore, StoreError};

use super::pump::WatchPump;

/// Lifecycle of a [`SyncService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No document has been published yet.
    Initializing,
    /// A document is live and the watch loop is running.
    Synced,
    /// Shut down; the last published table stays in place.
    Stopped,
}

/// What happened to one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied { version: u64 },
    /// Identical to the live document; nothing published.
    Unchanged,
    /// Empty or `null` notification; live table kept.
    Ignored,
    /// Not a configuration document; live table kept.
    Malformed,
    /// Failed validation; live table kept.
    Rejected(Vec<ValidationError>),
}

impl UpdateOutcome {
    fn label(&self) -> &'static str {
        match self {
            UpdateOutcome::Applied { .. } => "applied",
            UpdateOutcome::Unchanged => "unchanged",
            UpdateOutcome::Ignored => "ignored",
            UpdateOutcome::Malformed => "malformed",
            UpdateOutcome::Rejected(_) => "rejected",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("initial configuration load failed: {0}")]
    InitialLoad(#[from] StoreError),
}

/// Running totals of processed payloads.
#[derive(Debug, Default)]
pub struct SyncStats {
    applied: AtomicU64,
    unchanged: AtomicU64,
    ignored: AtomicU64,
    malformed: AtomicU64,
    rejected: AtomicU64,
}

impl SyncStats {
    fn record(&self, outcome: &UpdateOutcome) {
        let counter = match outcome {
            UpdateOutcome::Applied { .. } => &self.applied,
            UpdateOutcome::Unchanged => &self.unchanged,
            UpdateOutcome::Ignored => &self.ignored,
            UpdateOutcome::Malformed => &self.malformed,
            UpdateOutcome::Rejected(_) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    pub fn unchanged(&self) -> u64 {
        self.unchanged.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    pub fn malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Where a payload came from. Startup is more forgiving than the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadSource {
    InitialLoad,
    Notification,
}

/// Keeps a [`LiveRouteTable`] in step with one store key.
pub struct SyncService {
    store: Arc<dyn ConfigStore>,
    table: LiveRouteTable,
    key: String,
    config: SyncConfig,
    /// Last document this service published.
    live: Option<ConfigurationDocument>,
    state: watch::Sender<SyncState>,
    stats: Arc<SyncStats>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        table: LiveRouteTable,
        key: impl Into<String>,
        config: SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Initializing);
        Self {
            store,
            table,
            key: key.into(),
            config,
            live: None,
            state,
            stats: Arc::new(SyncStats::default()),
        }
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.stats)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the key once and publish what it holds.
    ///
    /// A missing key is created empty. An empty or unparseable value is
    /// published as the empty document. A store error is returned to the
    /// caller, who should treat it as fatal.
    pub async fn initialize(&mut self) -> Result<UpdateOutcome, SyncError> {
        tracing::info!(key = %self.key, "Loading initial route configuration");

        let payload = match self.store.load(&self.key).await? {
            Some(payload) => payload,
            None => {
                tracing::info!(key = %self.key, "Configuration key not found, creating it empty");
                if let Err(e) = self.store.create(&self.key, Bytes::new()).await {
                    tracing::warn!(key = %self.key, error = %e, "Could not create configuration key");
                }
                Bytes::new()
            }
        };

        Ok(self.apply(&payload, PayloadSource::InitialLoad))
    }

    /// Process one watch notification.
    pub fn apply_payload(&mut self, payload: &[u8]) -> UpdateOutcome {
        self.apply(payload, PayloadSource::Notification)
    }

    fn apply(&mut self, payload: &[u8], source: PayloadSource) -> UpdateOutcome {
        let outcome = match decode_document(payload) {
            Ok(Some(document)) => self.apply_document(document),
            Ok(None) if source == PayloadSource::InitialLoad => {
                tracing::info!(key = %self.key, "Configuration key is empty, starting with no routes");
                self.apply_document(ConfigurationDocument::default())
            }
            Ok(None) => {
                tracing::info!(key = %self.key, "Ignoring notification without a document");
                UpdateOutcome::Ignored
            }
            Err(e) if source == PayloadSource::InitialLoad => {
                tracing::error!(key = %self.key, error = %e, "Stored configuration is malformed, starting with no routes");
                self.apply_document(ConfigurationDocument::default())
            }
            Err(e) => {
                tracing::error!(key = %self.key, error = %e, "Ignoring malformed configuration update");
                UpdateOutcome::Malformed
            }
        };

        self.stats.record(&outcome);
        metrics::record_config_update(outcome.label());
        outcome
    }

    fn apply_document(&mut self, document: ConfigurationDocument) -> UpdateOutcome {
        if let Err(violations) = validate_document(&document) {
            for violation in &violations {
                tracing::warn!(rule = violation.kind(), "{violation}");
                metrics::record_config_violation(violation.kind());
            }
            tracing::warn!(
                key = %self.key,
                violations = violations.len(),
                "Configuration rejected, keeping the current routes"
            );
            return UpdateOutcome::Rejected(violations);
        }

        if self.live.as_ref() == Some(&document) {
            tracing::debug!(key = %self.key, "Configuration unchanged");
            return UpdateOutcome::Unchanged;
        }

        for route in &document.routes {
            if route.hosts.is_empty() {
                tracing::debug!(route_id = %route.id, "Route matches any host");
            }
            if resolve_host_header_policy(route) == HostHeaderPolicy::Preserve {
                tracing::debug!(route_id = %route.id, "Route forwards the original Host header");
            }
        }

        let (routes, clusters) = (document.routes.len(), document.clusters.len());
        let version = self.table.publish(document.clone());
        metrics::record_table(version, routes, clusters);
        self.live = Some(document);
        self.state.send_replace(SyncState::Synced);

        UpdateOutcome::Applied { version }
    }

    /// Follow the store until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let (tx, mut rx) = mpsc::channel::<Bytes>(self.config.channel_capacity.max(1));
        let pump = WatchPump::new(Arc::clone(&self.store), self.key.clone(), &self.config);
        let pump_task = tokio::spawn(pump.run(tx));

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!(key = %self.key, "Shutdown signal received, stopping configuration sync");
                    break;
                }
                payload = rx.recv() => match payload {
                    Some(payload) => {
                        let outcome = self.apply_payload(&payload);
                        tracing::debug!(key = %self.key, outcome = outcome.label(), "Configuration notification processed");
                    }
                    None => {
                        tracing::warn!(key = %self.key, "Watch pump exited");
                        break;
                    }
                }
            }
        }

        pump_task.abort();
        let _ = pump_task.await;
        self.state.send_replace(SyncState::Stopped);
        tracing::info!(key = %self.key, version = self.table.version(), "Configuration sync stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{encode_document, ClusterEntry, RouteEntry};
    use crate::store::MemoryStore;

    fn valid_document() -> ConfigurationDocument {
        ConfigurationDocument::new(
            vec![RouteEntry::new("r1", "c1").with_hosts(["a.example"])],
            vec![ClusterEntry::new("c1").with_destination("d1", "http://10.0.0.1:8080")],
        )
    }

    fn service(store: Arc<MemoryStore>) -> (SyncService, LiveRouteTable) {
        let table = LiveRouteTable::new();
        let service = SyncService::new(store, table.clone(), "route-config", SyncConfig::default());
        (service, table)
    }

    #[tokio::test]
    async fn test_initialize_creates_missing_key() {
        let store = Arc::new(MemoryStore::new());
        let (mut service, table) = service(store.clone());

        let outcome = service.initialize().await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Applied { .. }));
        assert!(table.current().is_empty());
        assert_eq!(store.load("route-config").await.unwrap(), Some(Bytes::new()));
        assert_eq!(*service.state().borrow(), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_initialize_fails_when_store_unavailable() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let (mut service, _) = service(store);

        assert!(matches!(service.initialize().await, Err(SyncError::InitialLoad(_))));
        assert_eq!(*service.state().borrow(), SyncState::Initializing);
    }

    #[tokio::test]
    async fn test_malformed_initial_value_starts_empty() {
        let store = Arc::new(MemoryStore::new());
        store.put("route-config", Bytes::from_static(b"{not json")).await.unwrap();
        let (mut service, table) = service(store);

        service.initialize().await.unwrap();
        assert!(table.current().is_empty());
    }

    #[test]
    fn test_invalid_update_keeps_live_table() {
        let (mut service, table) = service(Arc::new(MemoryStore::new()));
        let good = encode_document(&valid_document()).unwrap();
        assert!(matches!(service.apply_payload(&good), UpdateOutcome::Applied { .. }));
        let version = table.version();

        let bad = ConfigurationDocument::new(vec![RouteEntry::new("r2", "missing")], vec![]);
        let outcome = service.apply_payload(&encode_document(&bad).unwrap());
        match outcome {
            UpdateOutcome::Rejected(violations) => assert_eq!(violations[0].kind(), "unknown_cluster"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(table.version(), version);
        assert_eq!(*table.current(), valid_document());
        assert_eq!(service.stats().rejected(), 1);
    }

    #[test]
    fn test_duplicate_route_ids_never_go_live() {
        let (mut service, table) = service(Arc::new(MemoryStore::new()));
        service.apply_payload(&encode_document(&valid_document()).unwrap());

        let mut duplicated = valid_document();
        duplicated.routes.push(RouteEntry::new("r1", "c1").with_path("/other"));
        let outcome = service.apply_payload(&encode_document(&duplicated).unwrap());
        match outcome {
            UpdateOutcome::Rejected(violations) => assert_eq!(violations[0].kind(), "duplicate_route_id"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(*table.current(), valid_document());
    }

    #[test]
    fn test_noise_is_ignored() {
        let (mut service, table) = service(Arc::new(MemoryStore::new()));
        service.apply_payload(&encode_document(&valid_document()).unwrap());

        assert_eq!(service.apply_payload(b""), UpdateOutcome::Ignored);
        assert_eq!(service.apply_payload(b"null"), UpdateOutcome::Ignored);
        assert_eq!(service.apply_payload(b"[1,2"), UpdateOutcome::Malformed);
        assert_eq!(*table.current(), valid_document());
    }

    #[test]
    fn test_identical_document_not_republished() {
        let (mut service, table) = service(Arc::new(MemoryStore::new()));
        let payload = encode_document(&valid_document()).unwrap();
        service.apply_payload(&payload);
        let version = table.version();

        assert_eq!(service.apply_payload(&payload), UpdateOutcome::Unchanged);
        assert_eq!(table.version(), version);
    }
}
