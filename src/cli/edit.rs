//! Route-level edits applied to a document before it is saved.
//!
//! Every route created here gets a cluster of its own, sharing the route's
//! id, so deleting a route also deletes its cluster.

use std::collections::BTreeMap;

use url::Url;
use uuid::Uuid;

use crate::cli::service::ConfigServiceError;
use crate::document::{ClusterEntry, ConfigurationDocument, RouteEntry, CATCH_ALL_PATH};
use crate::routing::MetadataFlag;

/// Everything needed to create a route and its cluster.
#[derive(Debug, Clone, Default)]
pub struct NewRoute {
    /// Empty means any host.
    pub hosts: Vec<String>,
    /// `None` means catch-all.
    pub path: Option<String>,
    /// Absolute URLs, stored as `dest1..destN`.
    pub destinations: Vec<String>,
    pub redirect_www: bool,
    pub use_original_host_header: bool,
    pub metadata: Vec<(String, String)>,
}

/// Changes to an existing route. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct RouteChanges {
    pub hosts: Option<Vec<String>>,
    pub path: Option<String>,
    pub destinations: Option<Vec<String>>,
    pub redirect_www: Option<bool>,
    pub use_original_host_header: Option<bool>,
    pub set_metadata: Vec<(String, String)>,
    pub remove_metadata: Vec<String>,
}

/// Short random id for a new route and its cluster.
pub fn new_route_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Parse a `KEY=VALUE` pair. The key must not be blank.
pub fn parse_metadata_pair(pair: &str) -> Option<(String, String)> {
    let (key, value) = pair.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

/// Add a route with a fresh id. Returns the new document and the id.
pub fn add_route(
    document: &ConfigurationDocument,
    route: NewRoute,
) -> Result<(ConfigurationDocument, String), ConfigServiceError> {
    let cluster = cluster_with(&new_route_id(), &route.destinations)?;
    let id = cluster.id.clone();

    let mut metadata = BTreeMap::new();
    set_flag(&mut metadata, MetadataFlag::RedirectWww, route.redirect_www);
    set_flag(&mut metadata, MetadataFlag::UseOriginalHostHeader, route.use_original_host_header);
    metadata.extend(route.metadata);

    let mut entry = RouteEntry::new(&id, &id).with_hosts(clean_hosts(route.hosts));
    entry.path = clean_path(route.path);
    entry.metadata = metadata;

    let updated = document.with_cluster(cluster).with_route(entry);
    tracing::info!(route_id = %id, "Route added");
    Ok((updated, id))
}

/// Apply `changes` to the route `id` and, for destinations, to its cluster.
pub fn update_route(
    document: &ConfigurationDocument,
    id: &str,
    changes: RouteChanges,
) -> Result<ConfigurationDocument, ConfigServiceError> {
    let mut entry = document
        .route(id)
        .cloned()
        .ok_or_else(|| ConfigServiceError::RouteNotFound(id.to_string()))?;

    if let Some(hosts) = changes.hosts {
        entry.hosts = clean_hosts(hosts);
    }
    if let Some(path) = changes.path {
        entry.path = clean_path(Some(path));
    }
    if let Some(on) = changes.redirect_www {
        set_flag(&mut entry.metadata, MetadataFlag::RedirectWww, on);
    }
    if let Some(on) = changes.use_original_host_header {
        set_flag(&mut entry.metadata, MetadataFlag::UseOriginalHostHeader, on);
    }
    for key in &changes.remove_metadata {
        entry.metadata.remove(key);
    }
    entry.metadata.extend(changes.set_metadata);

    let mut updated = document.with_route(entry.clone());
    if let Some(destinations) = changes.destinations {
        if entry.cluster_id.trim().is_empty() {
            return Err(ConfigServiceError::InvalidRoute(format!(
                "route '{id}' has no cluster to hold destinations"
            )));
        }
        updated = updated.with_cluster(cluster_with(&entry.cluster_id, &destinations)?);
    }

    tracing::info!(route_id = %id, "Route updated");
    Ok(updated)
}

/// Remove the route `id` together with the cluster it points at.
pub fn delete_route(document: &ConfigurationDocument, id: &str) -> Result<ConfigurationDocument, ConfigServiceError> {
    let route = document
        .route(id)
        .ok_or_else(|| ConfigServiceError::RouteNotFound(id.to_string()))?;
    let updated = document.without_route(id).without_cluster(&route.cluster_id);
    tracing::info!(route_id = %id, cluster_id = %route.cluster_id, "Route deleted");
    Ok(updated)
}

/// Routes whose id, hosts, path or cluster id contain `term`, ignoring case.
///
/// A blank term matches every route.
pub fn search_routes<'a>(document: &'a ConfigurationDocument, term: &str) -> Vec<&'a RouteEntry> {
    let term = term.trim().to_lowercase();
    document
        .routes
        .iter()
        .filter(|route| {
            term.is_empty()
                || route.id.to_lowercase().contains(&term)
                || route.hosts.iter().any(|h| h.to_lowercase().contains(&term))
                || route.path.to_lowercase().contains(&term)
                || route.cluster_id.to_lowercase().contains(&term)
        })
        .collect()
}

fn cluster_with(id: &str, destinations: &[String]) -> Result<ClusterEntry, ConfigServiceError> {
    if destinations.is_empty() {
        return Err(ConfigServiceError::InvalidRoute(
            "at least one destination is required".to_string(),
        ));
    }

    let mut cluster = ClusterEntry::new(id);
    for (index, address) in destinations.iter().enumerate() {
        let address = address.trim();
        let url = Url::parse(address).map_err(|e| ConfigServiceError::InvalidDestination {
            address: address.to_string(),
            message: e.to_string(),
        })?;
        if !url.has_host() {
            return Err(ConfigServiceError::InvalidDestination {
                address: address.to_string(),
                message: "destination must be an absolute URL with a host".to_string(),
            });
        }
        cluster = cluster.with_destination(format!("dest{}", index + 1), address);
    }
    Ok(cluster)
}

fn clean_hosts(hosts: Vec<String>) -> Vec<String> {
    hosts
        .into_iter()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect()
}

fn clean_path(path: Option<String>) -> String {
    match path {
        Some(path) if !path.trim().is_empty() => path.trim().to_string(),
        _ => CATCH_ALL_PATH.to_string(),
    }
}

fn set_flag(metadata: &mut BTreeMap<String, String>, flag: MetadataFlag, on: bool) {
    if on {
        metadata.insert(flag.key().to_string(), "true".to_string());
    } else {
        metadata.remove(flag.key());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::validate_document;

    fn new_route() -> NewRoute {
        NewRoute {
            hosts: vec![" shop.example ".to_string(), String::new()],
            path: None,
            destinations: vec!["http://10.0.0.1:8080".to_string(), "http://10.0.0.2:8080".to_string()],
            redirect_www: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_add_route_creates_matching_cluster() {
        let (document, id) = add_route(&ConfigurationDocument::default(), new_route()).unwrap();

        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        let route = document.route(&id).unwrap();
        assert_eq!(route.cluster_id, id);
        assert_eq!(route.hosts, vec!["shop.example".to_string()]);
        assert_eq!(route.path, CATCH_ALL_PATH);
        assert_eq!(route.metadata.get("RedirectWww").map(String::as_str), Some("true"));

        let cluster = document.cluster(&id).unwrap();
        assert_eq!(cluster.destinations.len(), 2);
        assert_eq!(cluster.destinations["dest2"].address, "http://10.0.0.2:8080");
        assert!(validate_document(&document).is_ok());
    }

    #[test]
    fn test_add_route_rejects_relative_destination() {
        let mut route = new_route();
        route.destinations = vec!["backend:8080/path".to_string(), "/relative".to_string()];
        assert!(matches!(
            add_route(&ConfigurationDocument::default(), route),
            Err(ConfigServiceError::InvalidDestination { .. })
        ));
    }

    #[test]
    fn test_update_route_keeps_unspecified_fields() {
        let (document, id) = add_route(&ConfigurationDocument::default(), new_route()).unwrap();
        let changes = RouteChanges {
            path: Some("/api/{**rest}".to_string()),
            redirect_www: Some(false),
            use_original_host_header: Some(true),
            destinations: Some(vec!["https://backend.internal".to_string()]),
            ..Default::default()
        };

        let updated = update_route(&document, &id, changes).unwrap();
        let route = updated.route(&id).unwrap();
        assert_eq!(route.hosts, vec!["shop.example".to_string()]);
        assert_eq!(route.path, "/api/{**rest}");
        assert!(!route.metadata.contains_key("RedirectWww"));
        assert_eq!(route.metadata.get("UseOriginalHostHeader").map(String::as_str), Some("true"));
        assert_eq!(updated.cluster(&id).unwrap().destinations.len(), 1);
        assert_eq!(updated.routes.len(), 1);
    }

    #[test]
    fn test_delete_route_removes_its_cluster() {
        let (document, id) = add_route(&ConfigurationDocument::default(), new_route()).unwrap();
        let (document, other) = add_route(&document, new_route()).unwrap();

        let remaining = delete_route(&document, &id).unwrap();
        assert!(remaining.route(&id).is_none());
        assert!(remaining.cluster(&id).is_none());
        assert!(remaining.cluster(&other).is_some());

        assert!(matches!(
            delete_route(&remaining, &id),
            Err(ConfigServiceError::RouteNotFound(_))
        ));
    }

    #[test]
    fn test_search_routes() {
        let document = ConfigurationDocument::new(
            vec![
                RouteEntry::new("shop", "c1").with_hosts(["Shop.Example"]),
                RouteEntry::new("api", "c2").with_path("/API/{**rest}"),
            ],
            vec![],
        );

        assert_eq!(search_routes(&document, "").len(), 2);
        assert_eq!(search_routes(&document, "shop.example")[0].id, "shop");
        assert_eq!(search_routes(&document, "api/")[0].id, "api");
        assert_eq!(search_routes(&document, "C2")[0].id, "api");
        assert!(search_routes(&document, "nothing").is_empty());
    }

    #[test]
    fn test_parse_metadata_pair() {
        assert_eq!(
            parse_metadata_pair("Team = storefront"),
            Some(("Team".to_string(), "storefront".to_string()))
        );
        assert_eq!(parse_metadata_pair("Flag="), Some(("Flag".to_string(), String::new())));
        assert_eq!(parse_metadata_pair("=x"), None);
        assert_eq!(parse_metadata_pair("novalue"), None);
    }
}
