//! Feeds store watch notifications into the sync loop.
//!
//! # Responsibilities
//! - Hold the store watch open, re-establishing it when it breaks
//! - Catch up with a fresh load every time a watch is (re-)established
//! - Forward payloads, in delivery order, into a bounded channel
//!
//! # Design Decisions
//! - The pump never decodes or validates; it only moves bytes
//! - Stops when the receiving side is dropped or the task is aborted

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::config::SyncConfig;
use crate::observability::metrics;
use crate::resilience::Backoff;
use crate::store::ConfigStore;

/// Long-running task moving watch payloads into a channel.
pub struct WatchPump {
    store: Arc<dyn ConfigStore>,
    key: String,
    backoff: Backoff,
}

impl WatchPump {
    pub fn new(store: Arc<dyn ConfigStore>, key: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            store,
            key: key.into(),
            backoff: Backoff::new(config.watch_backoff_base_ms, config.watch_backoff_max_ms),
        }
    }

    /// Run until `tx` is closed.
    pub async fn run(mut self, tx: mpsc::Sender<Bytes>) {
        let mut reconnecting = false;

        loop {
            match self.store.watch(&self.key).await {
                Ok(mut payloads) => {
                    if reconnecting {
                        metrics::record_watch_restart();
                        tracing::info!(key = %self.key, "Store watch re-established");
                    } else {
                        tracing::info!(key = %self.key, "Store watch started");
                    }

                    // Changes made while no watch was open are only visible through a load.
                    match self.store.load(&self.key).await {
                        Ok(Some(payload)) => {
                            if tx.send(payload).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!(key = %self.key, error = %e, "Catch-up load failed"),
                    }

                    while let Some(item) = payloads.next().await {
                        match item {
                            Ok(payload) => {
                                self.backoff.reset();
                                if tx.send(payload).await.is_err() {
                                    tracing::debug!(key = %self.key, "Sync loop gone, stopping watch pump");
                                    return;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(key = %self.key, error = %e, "Store watch failed");
                                break;
                            }
                        }
                    }
                    tracing::warn!(key = %self.key, "Store watch ended");
                }
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "Could not establish store watch");
                }
            }

            if tx.is_closed() {
                return;
            }

            reconnecting = true;
            let delay = self.backoff.next_delay();
            tracing::info!(
                key = %self.key,
                attempt = self.backoff.failures(),
                delay_ms = delay.as_millis() as u64,
                "Retrying store watch"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
