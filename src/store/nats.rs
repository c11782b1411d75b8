//! NATS JetStream key-value config store.

use async_nats::jetstream::{self, kv};
use async_nats::ConnectOptions;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{future, Stream, StreamExt};

use crate::config::StoreConfig;
use crate::store::{ConfigStore, PayloadStream, StoreError};

/// Config store backed by a JetStream key-value bucket.
pub struct NatsKvStore {
    bucket: String,
    store: kv::Store,
}

impl NatsKvStore {
    /// Connect to NATS and open (or create) the configured bucket.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = connect_options(config).await?;
        let client = options
            .connect(config.nats_url.as_str())
            .await
            .map_err(|e| StoreError::Unavailable(format!("connect to {}: {}", config.nats_url, e)))?;

        tracing::info!(url = %config.nats_url, bucket = %config.bucket, "Connected to NATS");

        let context = jetstream::new(client);
        let store = match context.get_key_value(config.bucket.as_str()).await {
            Ok(store) => store,
            Err(_) => context
                .create_key_value(kv::Config {
                    bucket: config.bucket.clone(),
                    history: 1,
                    ..Default::default()
                })
                .await
                .map_err(|e| StoreError::Unavailable(format!("open bucket {}: {}", config.bucket, e)))?,
        };

        Ok(Self {
            bucket: config.bucket.clone(),
            store,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

async fn connect_options(config: &StoreConfig) -> Result<ConnectOptions, StoreError> {
    if let Some(path) = &config.creds_file {
        return ConnectOptions::with_credentials_file(path.clone())
            .await
            .map_err(|e| StoreError::Unavailable(format!("read credentials {}: {}", path.display(), e)));
    }
    if let Some(token) = &config.token {
        return Ok(ConnectOptions::with_token(token.clone()));
    }
    if let (Some(user), Some(password)) = (&config.user, &config.password) {
        return Ok(ConnectOptions::with_user_and_password(user.clone(), password.clone()));
    }
    Ok(ConnectOptions::new())
}

#[async_trait]
impl ConfigStore for NatsKvStore {
    async fn load(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.store
            .get(key)
            .await
            .map_err(|e| StoreError::operation("load", key, e))
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let revision = self
            .store
            .put(key, value)
            .await
            .map_err(|e| StoreError::operation("put", key, e))?;
        tracing::debug!(key = %key, revision, "Stored document");
        Ok(())
    }

    async fn create(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        // Revision 0 only succeeds while the key has never been written.
        match self.store.update(key, value, 0).await {
            Ok(_) => Ok(()),
            // Lost a race with another writer, or the key was there already.
            Err(e) => match self.load(key).await? {
                Some(_) => Ok(()),
                None => Err(StoreError::operation("create", key, e)),
            },
        }
    }

    async fn watch(&self, key: &str) -> Result<PayloadStream, StoreError> {
        let store = self.store.clone();
        let watched = key.to_string();

        // `Ok(None)` marks the point where the subscription is in place.
        let updates = async_stream::stream! {
            let mut entries = match store.watch(&watched).await {
                Ok(entries) => entries,
                Err(e) => {
                    yield Err(StoreError::watch(&watched, e));
                    return;
                }
            };
            yield Ok(None);

            while let Some(entry) = entries.next().await {
                match entry {
                    Ok(entry) => match entry.operation {
                        kv::Operation::Put => yield Ok(Some(entry.value)),
                        kv::Operation::Delete | kv::Operation::Purge => {
                            tracing::warn!(key = %watched, revision = entry.revision, "Config key removed");
                            yield Ok(Some(Bytes::new()));
                        }
                    },
                    Err(e) => {
                        yield Err(StoreError::watch(&watched, e));
                        return;
                    }
                }
            }
        };

        subscribed(key, updates).await
    }
}

/// Drive `updates` until its subscription is in place, then hand back the
/// payloads. A caller that loads the key after this returns cannot miss a
/// write made in between.
async fn subscribed<S>(key: &str, updates: S) -> Result<PayloadStream, StoreError>
where
    S: Stream<Item = Result<Option<Bytes>, StoreError>> + Send + 'static,
{
    let mut updates = Box::pin(updates);
    match updates.next().await {
        Some(Ok(None)) => {}
        Some(Ok(Some(_))) => return Err(StoreError::watch(key, "update delivered before subscription")),
        Some(Err(e)) => return Err(e),
        None => return Err(StoreError::watch(key, "watch closed before it started")),
    }
    Ok(updates
        .filter_map(|item| future::ready(item.transpose()))
        .boxed())
}
