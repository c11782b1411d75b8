//! Live route table and route lookup.
//!
//! # Responsibilities
//! - Compile a validated document into lookup-ready routes
//! - Publish compiled tables atomically
//! - Look up the matching route and destination for a request
//!
//! # Design Decisions
//! - A `RouteTable` is immutable once compiled (thread-safe without locks)
//! - One `ArcSwap` holds the whole table: readers see one version, never a mix
//! - Single writer (the sync service), any number of readers
//! - First match wins, in document order

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use url::Url;

use crate::document::{ClusterEntry, ConfigurationDocument, RouteEntry};
use crate::routing::behavior::RouteFlags;
use crate::routing::matcher::{HostMatcher, Matcher, PathPattern, RequestTarget};

/// A backend destination with its address parsed.
#[derive(Debug, Clone)]
pub struct ResolvedDestination {
    pub name: String,
    pub address: Url,
}

/// A route ready for request-time matching.
#[derive(Debug, Clone)]
pub struct CompiledRoute {
    entry: RouteEntry,
    hosts: HostMatcher,
    path: PathPattern,
    flags: RouteFlags,
    /// Usable destinations of the route's cluster, ordered by name.
    destinations: Vec<ResolvedDestination>,
}

impl CompiledRoute {
    fn compile(entry: &RouteEntry, cluster: Option<&ClusterEntry>) -> Self {
        let destinations = cluster
            .map(|c| {
                c.destinations
                    .iter()
                    .filter_map(|(name, dest)| match Url::parse(&dest.address) {
                        Ok(address) => Some(ResolvedDestination {
                            name: name.clone(),
                            address,
                        }),
                        Err(e) => {
                            tracing::warn!(
                                cluster_id = %c.id,
                                destination = %name,
                                address = %dest.address,
                                error = %e,
                                "Skipping destination with invalid address"
                            );
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            hosts: HostMatcher::new(&entry.hosts),
            path: PathPattern::parse(&entry.path),
            flags: RouteFlags::resolve(entry),
            entry: entry.clone(),
            destinations,
        }
    }

    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn cluster_id(&self) -> &str {
        &self.entry.cluster_id
    }

    pub fn entry(&self) -> &RouteEntry {
        &self.entry
    }

    pub fn hosts(&self) -> &HostMatcher {
        &self.hosts
    }

    pub fn flags(&self) -> RouteFlags {
        self.flags
    }

    pub fn destinations(&self) -> &[ResolvedDestination] {
        &self.destinations
    }

    /// Destination requests are forwarded to: the first by name.
    pub fn primary_destination(&self) -> Option<&ResolvedDestination> {
        self.destinations.first()
    }

    pub fn matches(&self, target: &RequestTarget<'_>) -> bool {
        self.hosts.matches(target) && self.path.matches(target)
    }
}

/// An immutable, compiled routing table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    version: u64,
    document: Arc<ConfigurationDocument>,
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile a document. The document is expected to be valid already.
    pub fn compile(document: ConfigurationDocument, version: u64) -> Self {
        let routes = document
            .routes
            .iter()
            .map(|route| CompiledRoute::compile(route, document.cluster(&route.cluster_id)))
            .collect();

        Self {
            version,
            document: Arc::new(document),
            routes,
        }
    }

    /// The table in place before any document has been published.
    pub fn empty() -> Self {
        Self::compile(ConfigurationDocument::default(), 0)
    }

    /// 0 until the first publish, then increasing by one per publish.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn document(&self) -> &Arc<ConfigurationDocument> {
        &self.document
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    pub fn route(&self, id: &str) -> Option<&CompiledRoute> {
        self.routes.iter().find(|r| r.id() == id)
    }

    /// Find the first route matching the request.
    pub fn match_request(&self, target: &RequestTarget<'_>) -> Option<&CompiledRoute> {
        self.routes.iter().find(|r| r.matches(target))
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// Shared handle to the currently published route table.
///
/// Cloning is cheap; all clones observe the same table.
#[derive(Debug, Clone)]
pub struct LiveRouteTable {
    current: Arc<ArcSwap<RouteTable>>,
    next_version: Arc<AtomicU64>,
}

impl LiveRouteTable {
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(RouteTable::empty())),
            next_version: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Compile `document` and swap it in. Returns the new table version.
    pub fn publish(&self, document: ConfigurationDocument) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let table = RouteTable::compile(document, version);
        let (routes, clusters) = (table.document.routes.len(), table.document.clusters.len());
        self.current.store(Arc::new(table));
        tracing::info!(version, routes, clusters, "Route table published");
        version
    }

    /// The published table. Constant time, never blocks on a publish.
    pub fn load(&self) -> Arc<RouteTable> {
        self.current.load_full()
    }

    /// Read-only snapshot of the published document.
    pub fn current(&self) -> Arc<ConfigurationDocument> {
        Arc::clone(&self.current.load().document)
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }
}

impl Default for LiveRouteTable {
    fn default() -> Self {
        Self::new()
    }
}
