//! Sync loop behavior against an in-process store.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use kv_route_proxy::config::SyncConfig;
use kv_route_proxy::document::{ClusterEntry, ConfigurationDocument, RouteEntry};
use kv_route_proxy::lifecycle::{self, Shutdown};
use kv_route_proxy::routing::{LiveRouteTable, RequestTarget};
use kv_route_proxy::store::{ConfigStore, MemoryStore};
use kv_route_proxy::sync::{SyncError, SyncService, SyncState, UpdateOutcome};

mod common;

use common::{eventually, put_document, test_settings, KEY};

fn fast_sync() -> SyncConfig {
    SyncConfig {
        watch_backoff_base_ms: 10,
        watch_backoff_max_ms: 50,
        channel_capacity: 8,
    }
}

fn r1_document() -> ConfigurationDocument {
    ConfigurationDocument::new(
        vec![RouteEntry::new("r1", "c1").with_hosts(["a.com"]).with_path("/**")],
        vec![ClusterEntry::new("c1").with_destination("d1", "http://backend:8080")],
    )
}

/// Initialize against `store` and run the loop in the background.
async fn start_sync(
    store: Arc<MemoryStore>,
    shutdown: &Shutdown,
) -> (LiveRouteTable, tokio::sync::watch::Receiver<SyncState>, tokio::task::JoinHandle<()>) {
    let table = LiveRouteTable::new();
    let mut service = SyncService::new(store.clone(), table.clone(), KEY, fast_sync());
    service.initialize().await.unwrap();
    let state = service.state();
    let task = tokio::spawn(service.run(shutdown.subscribe()));

    // The loop is live once its watch is registered.
    eventually(Duration::from_secs(2), || {
        let store = store.clone();
        async move { store.watcher_count(KEY) > 0 }
    })
    .await;

    (table, state, task)
}

#[tokio::test]
async fn test_watch_publishes_then_clears() {
    let store = Arc::new(MemoryStore::new());
    put_document(&store, &ConfigurationDocument::default()).await;
    let shutdown = Shutdown::new();
    let (table, _, _) = start_sync(store.clone(), &shutdown).await;
    assert!(table.current().is_empty());

    put_document(&store, &r1_document()).await;
    eventually(Duration::from_secs(2), || {
        let table = table.clone();
        async move { table.current().routes.len() == 1 }
    })
    .await;

    let snapshot = table.load();
    assert_eq!(snapshot.routes().len(), 1);
    let route = snapshot
        .match_request(&RequestTarget::new(Some("a.com"), "/anything/here"))
        .unwrap();
    assert_eq!(route.id(), "r1");
    assert_eq!(
        route.primary_destination().unwrap().address.as_str(),
        "http://backend:8080/"
    );

    put_document(&store, &ConfigurationDocument::default()).await;
    eventually(Duration::from_secs(2), || {
        let table = table.clone();
        async move { table.current().is_empty() }
    })
    .await;

    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_update_keeps_previous_table() {
    let store = Arc::new(MemoryStore::new());
    put_document(&store, &r1_document()).await;
    let shutdown = Shutdown::new();
    let (table, _, _) = start_sync(store.clone(), &shutdown).await;
    let version = table.version();

    store.put(KEY, Bytes::from_static(b"{\"Routes\": [")).await.unwrap();
    let invalid = ConfigurationDocument::new(vec![RouteEntry::new("r2", "missing")], vec![]);
    put_document(&store, &invalid).await;

    // A later valid document proves the bad ones were processed and skipped.
    let next = r1_document().with_route(RouteEntry::new("r3", "c1").with_path("/r3"));
    put_document(&store, &next).await;
    eventually(Duration::from_secs(2), || {
        let table = table.clone();
        async move { table.current().route("r3").is_some() }
    })
    .await;

    assert_eq!(table.version(), version + 1);
    assert!(table.current().route("r2").is_none());
    shutdown.trigger();
}

#[tokio::test]
async fn test_missing_key_starts_empty_and_creates_key() {
    let store = Arc::new(MemoryStore::new());
    let table = LiveRouteTable::new();
    let mut service = SyncService::new(store.clone(), table.clone(), KEY, fast_sync());

    let outcome = service.initialize().await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Applied { .. }));
    assert!(table.current().is_empty());
    assert_eq!(store.load(KEY).await.unwrap(), Some(Bytes::new()));
}

#[tokio::test]
async fn test_unreachable_store_is_fatal_at_startup() {
    let store = Arc::new(MemoryStore::new());
    store.set_available(false);
    let mut service = SyncService::new(store, LiveRouteTable::new(), KEY, fast_sync());

    assert!(matches!(service.initialize().await, Err(SyncError::InitialLoad(_))));
}

#[tokio::test]
async fn test_recovers_after_watch_drops() {
    let store = Arc::new(MemoryStore::new());
    let shutdown = Shutdown::new();
    let (table, _, _) = start_sync(store.clone(), &shutdown).await;

    // Changes made while disconnected are picked up by the catch-up load.
    store.set_available(false);
    store.disconnect_watchers();
    tokio::time::sleep(Duration::from_millis(30)).await;
    store.set_available(true);
    put_document(&store, &r1_document()).await;

    eventually(Duration::from_secs(3), || {
        let table = table.clone();
        async move { table.current().route("r1").is_some() }
    })
    .await;
    shutdown.trigger();
}

#[tokio::test]
async fn test_shutdown_stops_promptly_and_keeps_table() {
    let store = Arc::new(MemoryStore::new());
    put_document(&store, &r1_document()).await;
    let shutdown = Shutdown::new();
    let (table, mut state, task) = start_sync(store.clone(), &shutdown).await;
    assert_eq!(*state.borrow(), SyncState::Synced);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();

    state.changed().await.ok();
    assert_eq!(*state.borrow(), SyncState::Stopped);
    assert_eq!(store.watcher_count(KEY), 0);
    assert_eq!(table.current().routes.len(), 1);
}

#[tokio::test]
async fn test_run_with_closed_shutdown_channel_stops() {
    let store = Arc::new(MemoryStore::new());
    let service = SyncService::new(store, LiveRouteTable::new(), KEY, fast_sync());
    let signal = Shutdown::new().subscribe();

    tokio::time::timeout(Duration::from_secs(1), service.run(signal)).await.unwrap();
}

#[tokio::test]
async fn test_shutdown_triggered_before_start_is_honored() {
    let store = Arc::new(MemoryStore::new());
    put_document(&store, &r1_document()).await;
    let shutdown = Shutdown::new();
    shutdown.trigger();

    let handle = lifecycle::start(&test_settings(), store, &shutdown).await.unwrap();
    assert_eq!(handle.table().current().routes.len(), 1);
    tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("proxy kept running after shutdown")
        .unwrap();
}
