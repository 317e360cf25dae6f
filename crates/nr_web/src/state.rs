use chrono::{DateTime, Utc};
use nr_core::ArticleStorage;
use nr_query::QueryEngine;
use nr_trending::TrendingEngine;
use std::sync::Arc;

use crate::rate_limit::RateLimitConfig;

pub struct AppState {
    pub engine: QueryEngine,
    pub trending: Arc<TrendingEngine>,
    pub articles: Arc<dyn ArticleStorage>,
    pub rate_limit: RateLimitConfig,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        engine: QueryEngine,
        trending: Arc<TrendingEngine>,
        articles: Arc<dyn ArticleStorage>,
    ) -> Self {
        Self {
            engine,
            trending,
            articles,
            rate_limit: RateLimitConfig::default(),
            started_at: Utc::now(),
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }
}
