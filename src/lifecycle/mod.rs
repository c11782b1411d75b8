//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Connect store → Initial load → Spawn sync → Bind listener → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop sync watch → Stop accepting → Drain → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: the table is populated before the listener accepts traffic
//! - Fail fast: an unreachable store at startup is fatal
//! - After shutdown the last published table stays readable

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_shutdown_signal;
pub use startup::{run, start, ProxyHandle, StartupError};
