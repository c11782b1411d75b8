//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Publish (sync service, on every accepted document):
//!     ConfigurationDocument
//!     → table.rs (compile hosts, path templates, destinations)
//!     → behavior.rs (resolve metadata flags per route)
//!     → LiveRouteTable::publish (atomic swap)
//!
//! Incoming Request (host, path)
//!     → behavior.rs (www redirect decision)
//!     → table.rs (first matching route)
//!     → matcher.rs (evaluate host and path conditions)
//!     → Return: matched route + destination, or NoMatch
//! ```
//!
//! # Design Decisions
//! - The table is passed explicitly to writer and readers, never global
//! - No regex in hot path (segment matching only)
//! - Deterministic: same input always matches same route

pub mod behavior;
pub mod matcher;
pub mod table;

pub use behavior::{
    metadata_flag, resolve_host_header_policy, resolve_redirect, HostHeaderPolicy, MetadataFlag, RedirectDecision,
    RedirectRequest, RouteFlags,
};
pub use matcher::RequestTarget;
pub use table::{CompiledRoute, LiveRouteTable, ResolvedDestination, RouteTable};
