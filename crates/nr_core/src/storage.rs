use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{Article, EventWithLocation, NewUserEvent, UserEvent};
use crate::Result;

/// Article lookups. Every query returns the full match set in insertion
/// order; ranking and truncation happen above the store.
#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Insert an article, replacing any previous article with the same id
    async fn store_article(&self, article: &Article) -> Result<()>;

    async fn get_article(&self, id: &str) -> Result<Option<Article>>;

    /// Articles with a category containing `name`, case-insensitively
    async fn get_by_category(&self, name: &str) -> Result<Vec<Article>>;

    /// Articles whose source name contains `name`, case-insensitively
    async fn get_by_source(&self, name: &str) -> Result<Vec<Article>>;

    async fn get_by_min_score(&self, min: f64) -> Result<Vec<Article>>;

    /// Articles whose title or description contains `text`, case-folded
    async fn search(&self, text: &str) -> Result<Vec<Article>>;

    /// Articles with coordinates within `radius_km` of the point, paired
    /// with their distance in kilometres
    async fn get_nearby(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<(Article, f64)>>;

    async fn count(&self) -> Result<usize>;
}

#[async_trait]
pub trait EventStorage: Send + Sync {
    async fn record_event(&self, event: NewUserEvent) -> Result<UserEvent>;

    /// Events that occurred at or after `since`, joined with article coordinates
    async fn recent_events(&self, since: DateTime<Utc>) -> Result<Vec<EventWithLocation>>;

    /// Drop events older than `before`, returning how many were removed
    async fn prune_events(&self, before: DateTime<Utc>) -> Result<usize>;
}
