use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nr_core::geo::haversine_km;
use nr_core::{
    Article, ArticleStorage, EventStorage, EventWithLocation, NewUserEvent, Result, UserEvent,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::StorageBackend;

#[derive(Default)]
pub struct MemoryStore {
    articles: Vec<Article>,
    index: HashMap<String, usize>,
    events: Vec<UserEvent>,
    next_event_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_event_id: 1,
            ..Default::default()
        }
    }

    pub fn store_article(&mut self, article: &Article) {
        match self.index.get(&article.id) {
            Some(&position) => self.articles[position] = article.clone(),
            None => {
                self.index.insert(article.id.clone(), self.articles.len());
                self.articles.push(article.clone());
            }
        }
    }

    pub fn get_article(&self, id: &str) -> Option<Article> {
        self.index.get(id).map(|&position| self.articles[position].clone())
    }

    fn filter<F>(&self, predicate: F) -> Vec<Article>
    where
        F: Fn(&Article) -> bool,
    {
        self.articles.iter().filter(|a| predicate(a)).cloned().collect()
    }

    pub fn record_event(&mut self, event: NewUserEvent) -> UserEvent {
        let event = UserEvent {
            id: self.next_event_id,
            article_id: event.article_id,
            kind: event.kind,
            occurred_at: event.occurred_at,
            user_lat: event.user_lat,
            user_lon: event.user_lon,
        };
        self.next_event_id += 1;
        self.events.push(event.clone());
        event
    }

    pub fn recent_events(&self, since: DateTime<Utc>) -> Vec<EventWithLocation> {
        self.events
            .iter()
            .filter(|event| event.occurred_at >= since)
            .map(|event| {
                let location = self
                    .get_article(&event.article_id)
                    .and_then(|article| article.coordinates());
                EventWithLocation {
                    event: event.clone(),
                    latitude: location.map(|(lat, _)| lat),
                    longitude: location.map(|(_, lon)| lon),
                }
            })
            .collect()
    }

    pub fn prune_events(&mut self, before: DateTime<Utc>) -> usize {
        let previous = self.events.len();
        self.events.retain(|event| event.occurred_at >= before);
        previous - self.events.len()
    }
}

/// Process-local storage. Iteration follows insertion order so lookups are
/// deterministic for identical data.
#[derive(Clone)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(MemoryStore::new())),
        }
    }

    pub async fn with_articles(articles: &[Article]) -> Result<Self> {
        let storage = Self::new();
        for article in articles {
            storage.store_article(article).await?;
        }
        Ok(storage)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn new() -> Result<Self>
    where
        Self: Sized,
    {
        Ok(InMemoryStorage::new())
    }
}

#[async_trait]
impl ArticleStorage for InMemoryStorage {
    async fn store_article(&self, article: &Article) -> Result<()> {
        let mut store = self.store.write().await;
        store.store_article(article);
        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let store = self.store.read().await;
        Ok(store.get_article(id))
    }

    async fn get_by_category(&self, name: &str) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        Ok(store.filter(|article| article.has_category(name)))
    }

    async fn get_by_source(&self, name: &str) -> Result<Vec<Article>> {
        let needle = name.to_lowercase();
        let store = self.store.read().await;
        Ok(store.filter(|article| article.source_name.to_lowercase().contains(&needle)))
    }

    async fn get_by_min_score(&self, min: f64) -> Result<Vec<Article>> {
        let store = self.store.read().await;
        Ok(store.filter(|article| article.relevance_score >= min))
    }

    async fn search(&self, text: &str) -> Result<Vec<Article>> {
        let needle = text.to_lowercase();
        let store = self.store.read().await;
        Ok(store.filter(|article| {
            article.title.to_lowercase().contains(&needle)
                || article
                    .description
                    .as_ref()
                    .map(|d| d.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        }))
    }

    async fn get_nearby(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<(Article, f64)>> {
        let store = self.store.read().await;
        Ok(store
            .articles
            .iter()
            .filter_map(|article| {
                let (article_lat, article_lon) = article.coordinates()?;
                let distance = haversine_km(lat, lon, article_lat, article_lon);
                (distance <= radius_km).then(|| (article.clone(), distance))
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.store.read().await.articles.len())
    }
}

#[async_trait]
impl EventStorage for InMemoryStorage {
    async fn record_event(&self, event: NewUserEvent) -> Result<UserEvent> {
        let mut store = self.store.write().await;
        Ok(store.record_event(event))
    }

    async fn recent_events(&self, since: DateTime<Utc>) -> Result<Vec<EventWithLocation>> {
        let store = self.store.read().await;
        Ok(store.recent_events(since))
    }

    async fn prune_events(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut store = self.store.write().await;
        Ok(store.prune_events(before))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nr_core::testing::{article, base_time, sample_articles};
    use nr_core::EventKind;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = InMemoryStorage::with_articles(&sample_articles()).await.unwrap();
        assert_eq!(storage.count().await.unwrap(), 5);

        let tech = storage.get_by_category("technology").await.unwrap();
        let ids: Vec<_> = tech.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a3"]);

        let reuters = storage.get_by_source("reuters").await.unwrap();
        assert_eq!(reuters.len(), 1);
        assert_eq!(reuters[0].id, "a2");

        let high = storage.get_by_min_score(0.85).await.unwrap();
        assert!(high.iter().all(|a| a.relevance_score >= 0.85));
        assert_eq!(high.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_on_conflict_keeps_position() {
        let storage = InMemoryStorage::with_articles(&sample_articles()).await.unwrap();
        let mut updated = article("a1", "AI chips, revised");
        updated.relevance_score = 0.1;
        storage.store_article(&updated).await.unwrap();

        assert_eq!(storage.count().await.unwrap(), 5);
        let stored = storage.get_article("a1").await.unwrap().unwrap();
        assert_eq!(stored.title, "AI chips, revised");
        let all = storage.get_by_min_score(0.0).await.unwrap();
        assert_eq!(all[0].id, "a1");
    }

    #[tokio::test]
    async fn test_search_matches_title_or_description() {
        let storage = InMemoryStorage::with_articles(&sample_articles()).await.unwrap();
        let hits = storage.search("TECHNOLOGY").await.unwrap();
        let ids: Vec<_> = hits.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
        assert!(storage.search("quantum").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nearby_filters_by_radius() {
        let storage = InMemoryStorage::with_articles(&sample_articles()).await.unwrap();
        let hits = storage.get_nearby(37.7749, -122.4194, 20.0).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|(a, _)| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
        assert!(hits.iter().all(|(_, distance)| *distance <= 20.0));

        let hits = storage.get_nearby(37.7749, -122.4194, 5.0).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_events_join_article_location() {
        let storage = InMemoryStorage::with_articles(&sample_articles()).await.unwrap();
        let now = base_time();
        storage
            .record_event(
                NewUserEvent::new("a1", EventKind::Click)
                    .at(now - Duration::hours(1))
                    .from_location(37.77, -122.41),
            )
            .await
            .unwrap();
        storage
            .record_event(NewUserEvent::new("a5", EventKind::View).at(now - Duration::hours(30)))
            .await
            .unwrap();

        let recent = storage.recent_events(now - Duration::hours(24)).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event.id, 1);
        assert_eq!(recent[0].article_coordinates(), Some((37.7749, -122.4194)));

        let pruned = storage.prune_events(now - Duration::hours(24)).await.unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(storage.recent_events(now - Duration::days(7)).await.unwrap().len(), 1);
    }
}
