//! Process settings.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (semantic checks)
//!     → ProxySettings (immutable for the process lifetime)
//!     → SettingsOverrides (CLI/env) applied, then validated once
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal (or no) settings files
//! - Validation separates syntactic (serde) from semantic checks
//! - Routing changes never go through here; they arrive through the store watch

pub mod loader;
pub mod schema;

pub use loader::{load_settings, parse_settings, resolve_settings, validate_settings, SettingsError, SettingsOverrides};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, ProxySettings, StoreBackend, StoreConfig, SyncConfig,
    TimeoutConfig,
};
