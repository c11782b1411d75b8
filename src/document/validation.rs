//! Document validation.
//!
//! # Responsibilities
//! - Check referential integrity (routes reference existing clusters)
//! - Check structural integrity (ids present and unique, clusters have destinations)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ConfigurationDocument → Result<(), Vec<ValidationError>>
//! - A document with any violation is rejected whole

use std::collections::HashSet;

use thiserror::Error;

use crate::document::ConfigurationDocument;

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("route at position {index} has an empty RouteId")]
    EmptyRouteId { index: usize },

    #[error("route '{route_id}' has an empty ClusterId")]
    EmptyClusterReference { route_id: String },

    #[error("route '{route_id}' references non-existent cluster '{cluster_id}'")]
    UnknownCluster { route_id: String, cluster_id: String },

    #[error("RouteId '{route_id}' is used by more than one route")]
    DuplicateRouteId { route_id: String },

    #[error("cluster at position {index} has an empty ClusterId")]
    EmptyClusterId { index: usize },

    #[error("ClusterId '{cluster_id}' is used by more than one cluster")]
    DuplicateClusterId { cluster_id: String },

    #[error("cluster '{cluster_id}' has no destinations")]
    NoDestinations { cluster_id: String },
}

impl ValidationError {
    /// Stable rule name for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyRouteId { .. } => "empty_route_id",
            ValidationError::EmptyClusterReference { .. } => "empty_cluster_reference",
            ValidationError::UnknownCluster { .. } => "unknown_cluster",
            ValidationError::DuplicateRouteId { .. } => "duplicate_route_id",
            ValidationError::EmptyClusterId { .. } => "empty_cluster_id",
            ValidationError::DuplicateClusterId { .. } => "duplicate_cluster_id",
            ValidationError::NoDestinations { .. } => "no_destinations",
        }
    }
}

/// Validate a document, collecting every violation.
pub fn validate_document(doc: &ConfigurationDocument) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let cluster_ids: HashSet<&str> = doc.clusters.iter().map(|c| c.id.as_str()).collect();
    let mut seen_routes = HashSet::new();
    let mut seen_clusters = HashSet::new();

    for (index, route) in doc.routes.iter().enumerate() {
        if is_blank(&route.id) {
            errors.push(ValidationError::EmptyRouteId { index });
        } else if !seen_routes.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId {
                route_id: route.id.clone(),
            });
        }

        if is_blank(&route.cluster_id) {
            errors.push(ValidationError::EmptyClusterReference {
                route_id: route.id.clone(),
            });
        } else if !cluster_ids.contains(route.cluster_id.as_str()) {
            errors.push(ValidationError::UnknownCluster {
                route_id: route.id.clone(),
                cluster_id: route.cluster_id.clone(),
            });
        }
    }

    for (index, cluster) in doc.clusters.iter().enumerate() {
        if is_blank(&cluster.id) {
            errors.push(ValidationError::EmptyClusterId { index });
        } else if !seen_clusters.insert(cluster.id.as_str()) {
            errors.push(ValidationError::DuplicateClusterId {
                cluster_id: cluster.id.clone(),
            });
        }

        if cluster.destinations.is_empty() {
            errors.push(ValidationError::NoDestinations {
                cluster_id: cluster.id.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
