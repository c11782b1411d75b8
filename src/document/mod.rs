//! Routing document subsystem.
//!
//! # Data Flow
//! ```text
//! store payload (JSON bytes)
//!     → codec.rs (decode, empty payload = empty document)
//!     → validation.rs (referential and structural checks)
//!     → ConfigurationDocument (immutable, replaced whole)
//!
//! Operator edits:
//!     current document + incoming document
//!     → reconcile.rs (merge by id, or replace)
//!     → validation.rs
//!     → store put
//! ```
//!
//! # Design Decisions
//! - Documents are values: every edit builds a new document from the old one
//! - Metadata stays an open string map; known keys are read through `routing::behavior`
//! - Wire names follow the `Routes`/`Clusters` layout shared with other writers of the key

pub mod codec;
pub mod reconcile;
pub mod validation;

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

pub use codec::{decode_document, encode_document, DocumentError};
pub use reconcile::{merge, reconcile, replace, ImportStrategy};
pub use validation::{validate_document, ValidationError};

/// Path pattern applied when a route does not specify one.
pub const CATCH_ALL_PATH: &str = "{**catch-all}";

/// Root aggregate: every route and cluster the proxy serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationDocument {
    /// Routes in match order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub routes: Vec<RouteEntry>,

    /// Clusters referenced by routes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub clusters: Vec<ClusterEntry>,
}

impl ConfigurationDocument {
    /// Build a document from routes and clusters.
    pub fn new(routes: Vec<RouteEntry>, clusters: Vec<ClusterEntry>) -> Self {
        Self { routes, clusters }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.clusters.is_empty()
    }

    /// Find a route by id.
    pub fn route(&self, id: &str) -> Option<&RouteEntry> {
        self.routes.iter().find(|r| r.id == id)
    }

    /// Find a cluster by id.
    pub fn cluster(&self, id: &str) -> Option<&ClusterEntry> {
        self.clusters.iter().find(|c| c.id == id)
    }

    /// New document with `route` upserted by id.
    pub fn with_route(&self, route: RouteEntry) -> Self {
        merge(self, &Self::new(vec![route], Vec::new()))
    }

    /// New document with `cluster` upserted by id.
    pub fn with_cluster(&self, cluster: ClusterEntry) -> Self {
        merge(self, &Self::new(Vec::new(), vec![cluster]))
    }

    /// New document without the route `id`. Clusters are untouched.
    pub fn without_route(&self, id: &str) -> Self {
        Self {
            routes: self.routes.iter().filter(|r| r.id != id).cloned().collect(),
            clusters: self.clusters.clone(),
        }
    }

    /// New document without the cluster `id`. Routes are untouched.
    pub fn without_cluster(&self, id: &str) -> Self {
        Self {
            routes: self.routes.clone(),
            clusters: self.clusters.iter().filter(|c| c.id != id).cloned().collect(),
        }
    }
}

/// A named rule mapping inbound requests to a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RouteWire", into = "RouteWire")]
pub struct RouteEntry {
    pub id: String,

    /// Host patterns, case-insensitive. Empty matches any host.
    pub hosts: Vec<String>,

    pub path: String,

    pub cluster_id: String,

    pub metadata: BTreeMap<String, String>,
}

impl RouteEntry {
    /// A catch-all route for `cluster_id` with no hosts and no metadata.
    pub fn new(id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            hosts: Vec::new(),
            path: CATCH_ALL_PATH.to_string(),
            cluster_id: cluster_id.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A named group of backend destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEntry {
    #[serde(rename = "ClusterId", default, deserialize_with = "null_as_default")]
    pub id: String,

    /// Destinations keyed by name.
    #[serde(rename = "Destinations", default, deserialize_with = "null_as_default")]
    pub destinations: BTreeMap<String, Destination>,
}

impl ClusterEntry {
    /// A cluster with no destinations yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            destinations: BTreeMap::new(),
        }
    }

    pub fn with_destination(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.destinations.insert(
            name.into(),
            Destination {
                address: address.into(),
            },
        );
        self
    }
}

/// One backend address within a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Absolute URL, e.g. `http://backend:8080`.
    #[serde(rename = "Address", default, deserialize_with = "null_as_default")]
    pub address: String,
}

/// Route layout as stored: match conditions nested under `Match`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RouteWire {
    #[serde(default, deserialize_with = "null_as_default")]
    route_id: String,

    #[serde(rename = "Match", default, deserialize_with = "null_as_default")]
    conditions: MatchWire,

    #[serde(default, deserialize_with = "null_as_default")]
    cluster_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MatchWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hosts: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
}

impl From<RouteWire> for RouteEntry {
    fn from(wire: RouteWire) -> Self {
        Self {
            id: wire.route_id,
            hosts: wire.conditions.hosts.unwrap_or_default(),
            path: wire
                .conditions
                .path
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| CATCH_ALL_PATH.to_string()),
            cluster_id: wire.cluster_id,
            metadata: wire.metadata.unwrap_or_default(),
        }
    }
}

impl From<RouteEntry> for RouteWire {
    fn from(route: RouteEntry) -> Self {
        Self {
            route_id: route.id,
            conditions: MatchWire {
                hosts: (!route.hosts.is_empty()).then_some(route.hosts),
                path: Some(route.path),
            },
            cluster_id: route.cluster_id,
            metadata: (!route.metadata.is_empty()).then_some(route.metadata),
        }
    }
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
