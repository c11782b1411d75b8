//! File-backed config store for hot reload.
//!
//! The document lives in a single file. Watching observes the file's parent
//! directory so atomic replace-by-rename (how `put` writes, and how most
//! editors save) is seen as a change of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::store::{ConfigStore, PayloadStream, StoreError};

/// A config store backed by one JSON file.
///
/// Every key maps to the same file; the key only appears in logs and errors.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn watch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn is_our_file(&self, candidate: &Path) -> bool {
        candidate.file_name().is_some() && candidate.file_name() == self.path.file_name()
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(content) => Ok(Some(Bytes::from(content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::operation("load", key, e)),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, &value)
            .await
            .map_err(|e| StoreError::operation("put", key, e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| StoreError::operation("put", key, e))?;
        Ok(())
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        if tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| StoreError::operation("create", key, e))?
        {
            return Ok(());
        }
        self.put(key, value).await
    }

    async fn watch(&self, key: &str) -> Result<PayloadStream, StoreError> {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let key_for_events = key.to_string();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let touches_file = event.paths.iter().any(|p| store.is_our_file(p));
                    if touches_file && (event.kind.is_modify() || event.kind.is_create()) {
                        match std::fs::read(&store.path) {
                            Ok(content) => {
                                tracing::debug!(path = ?store.path, "Config file change detected");
                                let _ = update_tx.send(Ok(Bytes::from(content)));
                            }
                            // Mid-rename; the follow-up event carries the content.
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                            Err(e) => {
                                let _ = update_tx.send(Err(StoreError::watch(&key_for_events, e)));
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = update_tx.send(Err(StoreError::watch(&key_for_events, e)));
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| StoreError::watch(key, e))?;

        let dir = self.watch_dir();
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| StoreError::watch(key, e))?;
        tracing::info!(path = ?self.path, "Config file watcher started");

        // The watcher travels with the stream; dropping the stream stops it.
        let payloads = stream::unfold((update_rx, watcher), |(mut rx, watcher)| async move {
            rx.recv().await.map(|item| (item, (rx, watcher)))
        });
        Ok(payloads.boxed())
    }
}
