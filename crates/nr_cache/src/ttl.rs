use nr_core::Strategy;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// Expiry for each class of cached data.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    pub summary: Duration,
    pub search: Duration,
    pub category: Duration,
    pub source: Duration,
    pub score: Duration,
    pub nearby: Duration,
    pub trending: Duration,
    pub event_retention: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            summary: Duration::from_secs(7 * 24 * HOUR),
            search: Duration::from_secs(90),
            category: Duration::from_secs(2 * HOUR),
            source: Duration::from_secs(2 * HOUR),
            score: Duration::from_secs(2 * HOUR),
            nearby: Duration::from_secs(5 * MINUTE),
            trending: Duration::from_secs(2 * MINUTE),
            event_retention: Duration::from_secs(24 * HOUR),
        }
    }
}

impl TtlPolicy {
    pub fn with_search(mut self, ttl: Duration) -> Self {
        self.search = ttl;
        self
    }

    pub fn with_nearby(mut self, ttl: Duration) -> Self {
        self.nearby = ttl;
        self
    }

    pub fn with_trending(mut self, ttl: Duration) -> Self {
        self.trending = ttl;
        self
    }

    pub fn with_event_retention(mut self, ttl: Duration) -> Self {
        self.event_retention = ttl;
        self
    }

    pub fn for_strategy(&self, strategy: Strategy) -> Duration {
        match strategy {
            Strategy::Category => self.category,
            Strategy::Source => self.source,
            Strategy::Score => self.score,
            Strategy::Search => self.search,
            Strategy::Nearby => self.nearby,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.for_strategy(Strategy::Search), Duration::from_secs(90));
        assert_eq!(policy.for_strategy(Strategy::Nearby), Duration::from_secs(300));
        assert_eq!(policy.trending, Duration::from_secs(120));
        assert_eq!(policy.summary, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(policy.event_retention, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_strategy_classes_follow_overrides() {
        let policy = TtlPolicy::default().with_search(Duration::from_secs(10));
        assert_eq!(policy.for_strategy(Strategy::Search), Duration::from_secs(10));
        assert_eq!(policy.for_strategy(Strategy::Category), Duration::from_secs(7200));
    }
}
