use nr_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::CacheBackend;
use crate::keys::lock_key;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of the fill lock. A crashed producer frees the key after this.
    pub lock_ttl: Duration,
    pub poll_interval: Duration,
    /// How long a caller that lost the lock waits for the winner's value.
    pub max_wait: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(5),
        }
    }
}

impl CacheConfig {
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }
}

/// Read-through cache with stampede protection.
///
/// On a miss the first caller takes `lock:<key>` and runs the producer; the
/// others poll for the value it stores. At most one producer runs per key
/// while the lock is held. The lock holds a per-call token so a producer that
/// outlived its lock never releases a lock taken by someone else.
#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Arc<dyn CacheBackend>,
    config: CacheConfig,
}

impl ReadThroughCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self::with_config(backend, CacheConfig::default())
    }

    pub fn with_config(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn get_or_compute<F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Vec<u8>>> + Send,
    {
        if let Some(bytes) = self.backend.get(key).await? {
            debug!(key, "Cache hit");
            return Ok(bytes);
        }

        let lock = lock_key(key);
        let token = Uuid::new_v4().to_string().into_bytes();
        let acquired = self
            .backend
            .set_nx(&lock, token.clone(), self.config.lock_ttl)
            .await?;

        if !acquired {
            return self.wait_for(key).await;
        }

        debug!(key, "Cache miss, computing");
        let produced = producer().await;
        let stored = match &produced {
            Ok(bytes) => self.backend.set(key, bytes.clone(), ttl).await,
            Err(_) => Ok(()),
        };
        match self.backend.del_if_eq(&lock, &token).await {
            Ok(true) => {}
            Ok(false) => warn!(key, "Cache lock expired before the producer finished"),
            Err(e) => warn!(key, error = %e, "Failed to release cache lock"),
        }

        let bytes = produced?;
        stored?;
        Ok(bytes)
    }

    /// [`get_or_compute`](Self::get_or_compute) for values stored as JSON.
    pub async fn get_or_compute_json<T, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let bytes = self
            .get_or_compute(key, ttl, || async move {
                let value = producer().await?;
                Ok(serde_json::to_vec(&value)?)
            })
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn wait_for(&self, key: &str) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.config.max_wait;
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            if let Some(bytes) = self.backend.get(key).await? {
                return Ok(bytes);
            }
            if Instant::now() >= deadline {
                warn!(key, "Timed out waiting for another caller to fill the cache");
                return Err(Error::CacheTimeout(key.to_string()));
            }
        }
    }
}
