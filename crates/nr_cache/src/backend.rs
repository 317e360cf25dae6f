use async_trait::async_trait;
use nr_core::Result;
use std::time::Duration;

/// Key/value store with per-key expiry and sorted score sets.
///
/// Expired keys behave exactly like missing ones for every operation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Set only if the key is absent. Returns whether the write happened.
    async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;

    /// Returns whether a live key was removed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Remove `key` only while it still holds `expected`. Returns whether it was removed.
    async fn del_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Reset the expiry of a live key. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Atomically replace the whole sorted set stored at `key`.
    async fn replace_sorted(&self, key: &str, members: Vec<(String, f64)>, ttl: Duration)
        -> Result<()>;

    /// Up to `limit` members by descending score, ties by ascending member.
    async fn rev_range_with_scores(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>>;
}
