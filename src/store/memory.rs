//! In-process config store.
//!
//! Backs tests and single-process runs with `backend = "memory"`. Watchers
//! receive every `put` made after they subscribed; a lagging watcher skips
//! ahead to newer values.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::store::{ConfigStore, PayloadStream, StoreError};

const UPDATE_BUFFER: usize = 16;

struct Slot {
    value: Option<Bytes>,
    updates: broadcast::Sender<Bytes>,
}

impl Slot {
    fn empty() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self { value: None, updates }
    }
}

/// A config store that lives in process memory.
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the store connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// End every open watch stream, as a dropped connection would.
    pub fn disconnect_watchers(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in slots.values_mut() {
            let (updates, _) = broadcast::channel(UPDATE_BUFFER);
            slot.updates = updates;
        }
    }

    /// Number of open watch streams on `key`.
    pub fn watcher_count(&self, key: &str) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map(|s| s.updates.receiver_count()).unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store marked unavailable".to_string()))
        }
    }

    fn write(&self, key: &str, value: Bytes, only_if_absent: bool) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.to_string()).or_insert_with(Slot::empty);
        if only_if_absent && slot.value.is_some() {
            return;
        }
        slot.value = Some(value.clone());
        // No subscribers is fine.
        let _ = slot.updates.send(value);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.ensure_available()?;
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).and_then(|s| s.value.clone()))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.write(key, value, false);
        Ok(())
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.write(key, value, true);
        Ok(())
    }

    async fn watch(&self, key: &str) -> Result<PayloadStream, StoreError> {
        self.ensure_available()?;
        let receiver = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots
                .entry(key.to_string())
                .or_insert_with(Slot::empty)
                .updates
                .subscribe()
        };

        let key = key.to_string();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            let key = key.clone();
            async move {
                match item {
                    Ok(payload) => Some(Ok::<_, StoreError>(payload)),
                    Err(lagged) => {
                        tracing::debug!(key = %key, error = %lagged, "Watcher lagged, skipping to newer values");
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}
