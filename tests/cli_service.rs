//! Operator edits flowing through the store into a running sync loop.

use std::sync::Arc;
use std::time::Duration;

use kv_route_proxy::cli::{add_route, delete_route, ConfigServiceError, NewRoute, RouteConfigService};
use kv_route_proxy::config::SyncConfig;
use kv_route_proxy::document::{ConfigurationDocument, ImportStrategy, RouteEntry};
use kv_route_proxy::lifecycle::Shutdown;
use kv_route_proxy::routing::{LiveRouteTable, RequestTarget};
use kv_route_proxy::store::MemoryStore;
use kv_route_proxy::sync::SyncService;

mod common;

use common::{eventually, KEY};

async fn running_sync(store: Arc<MemoryStore>, shutdown: &Shutdown) -> LiveRouteTable {
    let table = LiveRouteTable::new();
    let mut sync = SyncService::new(store.clone(), table.clone(), KEY, SyncConfig::default());
    sync.initialize().await.unwrap();
    tokio::spawn(sync.run(shutdown.subscribe()));
    eventually(Duration::from_secs(2), || {
        let store = store.clone();
        async move { store.watcher_count(KEY) > 0 }
    })
    .await;
    table
}

#[tokio::test]
async fn test_added_route_goes_live() {
    let store = Arc::new(MemoryStore::new());
    let shutdown = Shutdown::new();
    let table = running_sync(store.clone(), &shutdown).await;
    let service = RouteConfigService::new(store, KEY);

    let current = service.load_config().await.unwrap();
    let (updated, id) = add_route(
        &current,
        NewRoute {
            hosts: vec!["blog.example".to_string()],
            destinations: vec!["http://10.1.0.5:3000".to_string()],
            ..Default::default()
        },
    )
    .unwrap();
    service.save_config(&updated).await.unwrap();

    eventually(Duration::from_secs(2), || {
        let table = table.clone();
        let id = id.clone();
        async move { table.current().route(&id).is_some() }
    })
    .await;
    let snapshot = table.load();
    let route = snapshot
        .match_request(&RequestTarget::new(Some("BLOG.example:443"), "/post/1"))
        .unwrap();
    assert_eq!(route.id(), id);

    let remaining = delete_route(&service.load_config().await.unwrap(), &id).unwrap();
    service.save_config(&remaining).await.unwrap();
    eventually(Duration::from_secs(2), || {
        let table = table.clone();
        async move { table.current().is_empty() }
    })
    .await;

    shutdown.trigger();
}

#[tokio::test]
async fn test_rejected_save_never_reaches_proxy() {
    let store = Arc::new(MemoryStore::new());
    let shutdown = Shutdown::new();
    let table = running_sync(store.clone(), &shutdown).await;
    let service = RouteConfigService::new(store, KEY);

    let dangling = ConfigurationDocument::new(vec![RouteEntry::new("r1", "c-missing")], vec![]);
    let err = service.import(&dangling, ImportStrategy::Replace).await.unwrap_err();
    match err {
        ConfigServiceError::Rejected { violations } => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].kind(), "unknown_cluster");
        }
        other => panic!("unexpected error {other}"),
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(table.current().is_empty());
    assert!(service.load_config().await.unwrap().is_empty());

    shutdown.trigger();
}
