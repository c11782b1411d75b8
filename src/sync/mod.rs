//! Configuration sync subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     store.load(key) → decode → validate → LiveRouteTable::publish
//!
//! Steady state:
//!     store.watch(key) → pump.rs (reconnect + catch-up) → mpsc
//!     → service.rs (decode → validate → dedupe) → LiveRouteTable::publish
//! ```
//!
//! # Design Decisions
//! - A single task applies updates, in the order the store delivers them
//! - A bad update never replaces a good table
//! - Shutdown stops the watch; the last table keeps serving

pub mod pump;
pub mod service;

pub use pump::WatchPump;
pub use service::{SyncError, SyncService, SyncState, SyncStats, UpdateOutcome};
