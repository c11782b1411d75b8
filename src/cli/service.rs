//! Load, validate and save the routing document on behalf of operators.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use thiserror::Error;

use crate::document::{
    decode_document, encode_document, reconcile, validate_document, ConfigurationDocument, DocumentError,
    ImportStrategy, ValidationError,
};
use crate::store::{ConfigStore, StoreError};

#[derive(Debug, Error)]
pub enum ConfigServiceError {
    #[error("failed to load configuration: {0}")]
    Load(#[source] StoreError),

    #[error("failed to save configuration: {0}")]
    Save(#[source] StoreError),

    #[error("configuration is not a valid document: {0}")]
    Malformed(#[from] DocumentError),

    #[error("configuration rejected with {} violation(s)", violations.len())]
    Rejected { violations: Vec<ValidationError> },

    #[error("route '{0}' not found")]
    RouteNotFound(String),

    #[error("invalid destination '{address}': {message}")]
    InvalidDestination { address: String, message: String },

    #[error("invalid route definition: {0}")]
    InvalidRoute(String),

    #[error("failed to access '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Operator-side access to the routing document in the store.
///
/// Every save is validated first, so a document the proxy would reject is
/// never written.
pub struct RouteConfigService {
    store: Arc<dyn ConfigStore>,
    key: String,
    cache: ArcSwapOption<ConfigurationDocument>,
}

impl RouteConfigService {
    pub fn new(store: Arc<dyn ConfigStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            cache: ArcSwapOption::empty(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fetch the stored document. A missing or empty key reads as the empty document.
    pub async fn load_config(&self) -> Result<ConfigurationDocument, ConfigServiceError> {
        let payload = self.store.load(&self.key).await.map_err(ConfigServiceError::Load)?;
        let document = match payload {
            Some(payload) => decode_document(&payload)?.unwrap_or_default(),
            None => {
                tracing::warn!(key = %self.key, "Configuration key not found, using an empty document");
                ConfigurationDocument::default()
            }
        };
        self.set_cached_config(document.clone());
        Ok(document)
    }

    /// Validate and write `document`, replacing whatever the key holds.
    pub async fn save_config(&self, document: &ConfigurationDocument) -> Result<(), ConfigServiceError> {
        if let Err(violations) = validate_document(document) {
            for violation in &violations {
                tracing::error!(rule = violation.kind(), "{violation}");
            }
            return Err(ConfigServiceError::Rejected { violations });
        }

        let payload = encode_document(document)?;
        self.store
            .put(&self.key, Bytes::from(payload))
            .await
            .map_err(ConfigServiceError::Save)?;
        self.set_cached_config(document.clone());

        tracing::info!(
            key = %self.key,
            routes = document.routes.len(),
            clusters = document.clusters.len(),
            "Configuration saved"
        );
        Ok(())
    }

    /// Whether `document` would be accepted by the proxy.
    pub fn validate_config(&self, document: &ConfigurationDocument) -> bool {
        match validate_document(document) {
            Ok(()) => true,
            Err(violations) => {
                for violation in &violations {
                    tracing::warn!(rule = violation.kind(), "{violation}");
                }
                false
            }
        }
    }

    pub fn cached_config(&self) -> Option<Arc<ConfigurationDocument>> {
        self.cache.load_full()
    }

    pub fn set_cached_config(&self, document: ConfigurationDocument) {
        self.cache.store(Some(Arc::new(document)));
    }

    /// The cached document, loading it on first use.
    pub async fn current(&self) -> Result<Arc<ConfigurationDocument>, ConfigServiceError> {
        if let Some(document) = self.cached_config() {
            return Ok(document);
        }
        Ok(Arc::new(self.load_config().await?))
    }

    /// Combine `incoming` with the stored document and save the result.
    pub async fn import(
        &self,
        incoming: &ConfigurationDocument,
        strategy: ImportStrategy,
    ) -> Result<ConfigurationDocument, ConfigServiceError> {
        let current = self.load_config().await?;
        let combined = reconcile(&current, incoming, strategy);
        self.save_config(&combined).await?;
        tracing::info!(%strategy, routes = combined.routes.len(), "Configuration imported");
        Ok(combined)
    }
}

/// Read a document from a JSON file. An empty file is the empty document.
pub fn read_document_file(path: &Path) -> Result<ConfigurationDocument, ConfigServiceError> {
    let content = std::fs::read(path).map_err(|source| ConfigServiceError::File {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(decode_document(&content)?.unwrap_or_default())
}

/// Write `document` to a JSON file in the store's wire layout.
pub fn write_document_file(path: &Path, document: &ConfigurationDocument) -> Result<(), ConfigServiceError> {
    let payload = encode_document(document)?;
    std::fs::write(path, payload).map_err(|source| ConfigServiceError::File {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ClusterEntry, RouteEntry};
    use crate::store::MemoryStore;

    fn document() -> ConfigurationDocument {
        ConfigurationDocument::new(
            vec![RouteEntry::new("r1", "c1").with_hosts(["a.example"])],
            vec![ClusterEntry::new("c1").with_destination("dest1", "http://10.0.0.1:8080")],
        )
    }

    #[tokio::test]
    async fn test_missing_key_loads_empty() {
        let service = RouteConfigService::new(Arc::new(MemoryStore::new()), "route-config");
        assert!(service.load_config().await.unwrap().is_empty());
        assert!(service.cached_config().is_some());
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_document() {
        let store = Arc::new(MemoryStore::new());
        let service = RouteConfigService::new(store.clone(), "route-config");
        let invalid = ConfigurationDocument::new(vec![RouteEntry::new("r1", "nowhere")], vec![]);

        let err = service.save_config(&invalid).await.unwrap_err();
        assert!(matches!(err, ConfigServiceError::Rejected { ref violations } if violations.len() == 1));
        assert_eq!(store.load("route-config").await.unwrap(), None);
        assert!(!service.validate_config(&invalid));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let service = RouteConfigService::new(Arc::new(MemoryStore::new()), "route-config");
        service.save_config(&document()).await.unwrap();
        assert_eq!(service.load_config().await.unwrap(), document());
        assert_eq!(*service.current().await.unwrap(), document());
    }

    #[tokio::test]
    async fn test_malformed_stored_value_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        store.put("route-config", Bytes::from_static(b"{oops")).await.unwrap();
        let service = RouteConfigService::new(store, "route-config");
        assert!(matches!(service.load_config().await, Err(ConfigServiceError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_import_replace_and_merge() {
        let service = RouteConfigService::new(Arc::new(MemoryStore::new()), "route-config");
        service.save_config(&document()).await.unwrap();

        let incoming = ConfigurationDocument::new(
            vec![RouteEntry::new("r2", "c2")],
            vec![ClusterEntry::new("c2").with_destination("dest1", "http://10.0.0.2:8080")],
        );
        let merged = service.import(&incoming, ImportStrategy::Merge).await.unwrap();
        assert_eq!(merged.routes.len(), 2);

        let replaced = service.import(&incoming, ImportStrategy::Replace).await.unwrap();
        assert_eq!(replaced, incoming);
        assert_eq!(service.load_config().await.unwrap(), incoming);
    }

    #[test]
    fn test_document_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        write_document_file(&path, &document()).unwrap();
        assert_eq!(read_document_file(&path).unwrap(), document());

        let missing = dir.path().join("missing.json");
        assert!(matches!(read_document_file(&missing), Err(ConfigServiceError::File { .. })));
    }
}
