//! Reverse proxy whose routing table follows a document in a key-value store.
//!
//! # Architecture Overview
//!
//! ```text
//!     KV store (NATS JetStream / file / memory)
//!         │  load + watch
//!         ▼
//!     ┌──────────────┐   decode    ┌────────────┐  publish   ┌────────────────┐
//!     │ sync service │───────────▶│  document  │──────────▶│ LiveRouteTable │
//!     │ (pump+loop)  │  validate   │   model    │  (swap)    │   (arc-swap)   │
//!     └──────────────┘             └────────────┘            └───────┬────────┘
//!                                                                     │ load
//!     Client ──▶ http server ──▶ scheme ──▶ www redirect ──▶ proxy ───┘──▶ Destination
//!
//!     route-cli ──▶ cli::RouteConfigService ──▶ validate ──▶ KV store put
//! ```
//!
//! A document that fails validation never replaces the live table; requests
//! always see one complete table version.

// Core subsystems
pub mod config;
pub mod document;
pub mod routing;
pub mod store;
pub mod sync;

// Traffic
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

// Operator tooling
pub mod cli;

pub use config::ProxySettings;
pub use document::ConfigurationDocument;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::LiveRouteTable;
pub use sync::SyncService;
