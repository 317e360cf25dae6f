//! Cache key derivation. Every key is a pure function of its inputs.

use nr_core::Strategy;
use sha2::{Digest, Sha256};

pub const NAMESPACE: &str = "cache";
pub const VERSION: &str = "v1";

pub const TRENDING_META_KEY: &str = "news:trending:global:meta";

fn hex_digest(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

fn hashed_key(strategy: Strategy, canonical: &str) -> String {
    format!("{}:{}:{}:{}", NAMESPACE, VERSION, strategy, hex_digest(canonical))
}

pub fn category_key(name: &str, limit: usize) -> String {
    hashed_key(Strategy::Category, &format!("category:{}:{}", name, limit))
}

pub fn source_key(name: &str, limit: usize) -> String {
    hashed_key(Strategy::Source, &format!("source:{}:{}", name, limit))
}

pub fn score_key(min: f64, limit: usize) -> String {
    hashed_key(Strategy::Score, &format!("score:{:.2}:{}", min, limit))
}

pub fn search_key(query: &str, limit: usize) -> String {
    hashed_key(Strategy::Search, &format!("{}|{}", query, limit))
}

pub fn nearby_key(lat: f64, lon: f64, radius_km: f64, limit: usize) -> String {
    hashed_key(
        Strategy::Nearby,
        &format!("nearby:{:.6}:{:.6}:{:.1}:{}", lat, lon, radius_km, limit),
    )
}

pub fn trending_key(tile: &str, limit: usize) -> String {
    format!("trending:geohash:{}:limit:{}", tile, limit)
}

pub fn summary_key(id: &str) -> String {
    format!("news:summary:{}", id)
}

pub fn rate_limit_key(client: &str) -> String {
    format!("ratelimit:ip:{}", client)
}

pub fn lock_key(key: &str) -> String {
    format!("lock:{}", key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_pure() {
        assert_eq!(category_key("Technology", 5), category_key("Technology", 5));
        assert_eq!(
            nearby_key(37.7749, -122.4194, 10.0, 5),
            nearby_key(37.7749, -122.4194, 10.0, 5)
        );
    }

    #[test]
    fn test_limit_changes_key() {
        assert_ne!(search_key("rust", 5), search_key("rust", 6));
        assert_ne!(source_key("Reuters", 5), source_key("Reuters", 10));
    }

    #[test]
    fn test_fixed_precision_formatting() {
        assert_eq!(score_key(0.8, 5), score_key(0.80, 5));
        assert_eq!(score_key(0.801, 5), score_key(0.8, 5));
        assert_ne!(score_key(0.81, 5), score_key(0.8, 5));
        assert_eq!(
            nearby_key(37.77490001, -122.4194, 10.04, 5),
            nearby_key(37.7749, -122.4194, 10.0, 5)
        );
    }

    #[test]
    fn test_key_layout() {
        let key = search_key("climate change", 5);
        let digest = key.strip_prefix("cache:v1:search:").unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, hex_digest("climate change|5"));

        assert!(category_key("Sports", 5).starts_with("cache:v1:category:"));
        assert_eq!(trending_key("9q8yy", 50), "trending:geohash:9q8yy:limit:50");
        assert_eq!(lock_key("cache:v1:score:ab"), "lock:cache:v1:score:ab");
        assert_eq!(rate_limit_key("203.0.113.7"), "ratelimit:ip:203.0.113.7");
    }
}
