//! Operator-side configuration management, used by `route-cli`.
//!
//! # Responsibilities
//! - Load and save the routing document through the config store
//! - Refuse to save documents the proxy would reject
//! - Route-level edits (add, update, delete, search) and file import/export

pub mod edit;
pub mod service;

pub use edit::{add_route, delete_route, parse_metadata_pair, search_routes, update_route, NewRoute, RouteChanges};
pub use service::{read_document_file, write_document_file, ConfigServiceError, RouteConfigService};
