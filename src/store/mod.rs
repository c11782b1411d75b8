//! Config store clients.
//!
//! # Data Flow
//! ```text
//! external store (NATS KV / file / memory)
//!     → ConfigStore::load   (initial document bytes, or None)
//!     → ConfigStore::watch  (stream of payloads, one per change)
//!     → sync service
//!
//! route-cli:
//!     ConfigStore::load → edit → ConfigStore::put
//! ```
//!
//! # Design Decisions
//! - Payloads are opaque bytes; `document::codec` owns the format
//! - `watch` delivers updates only; callers load once to catch up
//! - A watch stream ending or erroring is not fatal; callers re-watch
//! - No compare-and-set: the last `put` wins

pub mod file;
pub mod memory;
pub mod nats;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use nats::NatsKvStore;

/// Stream of payloads delivered by a watch, one per change of the key.
pub type PayloadStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Errors raised by config store clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or authentication failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A single operation on a key failed.
    #[error("store operation '{operation}' on key '{key}' failed: {message}")]
    Operation {
        operation: &'static str,
        key: String,
        message: String,
    },

    /// The watch subscription failed or broke.
    #[error("watch on key '{key}' failed: {message}")]
    Watch { key: String, message: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn operation(operation: &'static str, key: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Operation {
            operation,
            key: key.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn watch(key: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Watch {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

/// Get/put/watch access to the key holding the routing document.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Current value of `key`, or `None` when the key does not exist.
    async fn load(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Overwrite `key`.
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Create `key` with `value` unless it already exists.
    async fn create(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Subscribe to future changes of `key`.
    async fn watch(&self, key: &str) -> Result<PayloadStream, StoreError>;
}

/// Open the store selected by `config`.
pub async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn ConfigStore>, StoreError> {
    let store: Arc<dyn ConfigStore> = match config.backend {
        StoreBackend::Nats => Arc::new(NatsKvStore::connect(config).await?),
        StoreBackend::File => Arc::new(FileStore::new(&config.file_path)),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::info!(backend = ?config.backend, key = %config.key, "Config store ready");
    Ok(store)
}
