use async_trait::async_trait;
use nr_core::{Error, Result};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::backend::CacheBackend;

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Sorted(Vec<(String, f64)>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Single-node cache. Expiry is lazy on access plus an optional janitor
/// task calling [`MemoryCache::purge_expired`].
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Live entry count.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn spawn_janitor(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired().await;
                if purged > 0 {
                    debug!(purged, "Purged expired cache entries");
                }
            }
        })
    }

    async fn live(&self, key: &str) -> Option<CacheEntry> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .cloned()
    }
}

fn by_score_desc(a: &(String, f64), b: &(String, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.live(key).await.map(|entry| entry.value) {
            None => Ok(None),
            Some(Value::Bytes(bytes)) => Ok(Some(bytes)),
            Some(Value::Sorted(_)) => Err(Error::Cache(format!(
                "key {} holds a sorted set, not a value",
                key
            ))),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry::new(Value::Bytes(value), ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let occupied = entries
            .get(key)
            .map(|entry| !entry.is_expired(Instant::now()))
            .unwrap_or(false);
        if occupied {
            return Ok(false);
        }
        entries.insert(key.to_string(), CacheEntry::new(Value::Bytes(value), ttl));
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(key)
            .map(|entry| !entry.is_expired(Instant::now()))
            .unwrap_or(false))
    }

    async fn del_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let matches = match entries.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                matches!(&entry.value, Value::Bytes(bytes) if bytes.as_slice() == expected)
            }
            _ => false,
        };
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.live(key).await.is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn replace_sorted(
        &self,
        key: &str,
        mut members: Vec<(String, f64)>,
        ttl: Duration,
    ) -> Result<()> {
        members.sort_by(by_score_desc);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), CacheEntry::new(Value::Sorted(members), ttl));
        Ok(())
    }

    async fn rev_range_with_scores(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        match self.live(key).await.map(|entry| entry.value) {
            None => Ok(Vec::new()),
            Some(Value::Sorted(members)) => Ok(members.into_iter().take(limit).collect()),
            Some(Value::Bytes(_)) => Err(Error::Cache(format!(
                "key {} holds a value, not a sorted set",
                key
            ))),
        }
    }
}
