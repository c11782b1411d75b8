//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → middleware/scheme.rs (client-facing scheme)
//!     → middleware/redirect.rs (www → bare host, 301)
//!     → proxy.rs (route match, Host policy, forward)
//!     → Send upstream response to client
//! ```

pub mod middleware;
pub mod proxy;
pub mod server;

pub use middleware::ForwardedScheme;
pub use server::{AppState, HttpServer};
