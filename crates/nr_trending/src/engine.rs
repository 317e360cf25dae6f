use chrono::{DateTime, Duration as ChronoDuration, Utc};
use nr_cache::{keys, CacheBackend};
use nr_core::{
    Article, ArticleStorage, Error, EventKind, EventStorage, EventWithLocation, NewUserEvent,
    Result,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::scorer::{group_by_tile, score_tile, tile_of, TrendingMeta, TrendingScore};
use crate::worker::TrendingHandle;

/// Limit segment of every tile key. The set behind the key holds every scored
/// article; reads apply their own limit.
pub const TILE_SET_LIMIT: usize = 50;
pub const TRENDING_DEFAULT_LIMIT: usize = 5;

const SIMULATION_MIN_SCORE: f64 = 0.5;
const SIMULATION_POOL: usize = 20;
const CLICK_PROBABILITY: f64 = 0.3;
/// Half-width of the jitter box around an article, about 2.5 km.
const JITTER_DEGREES: f64 = 0.025;

#[derive(Debug, Clone)]
pub struct TrendingConfig {
    pub interval: Duration,
    /// How far back events count towards a tile.
    pub window: Duration,
    pub tile_ttl: Duration,
    pub meta_ttl: Duration,
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window: Duration::from_secs(24 * 60 * 60),
            tile_ttl: Duration::from_secs(2 * 60),
            meta_ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub events: usize,
    pub tiles: usize,
    pub failed_tiles: usize,
}

/// An article hydrated with its trending score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingArticle {
    #[serde(flatten)]
    pub article: Article,
    pub trending_score: f64,
}

/// Owns the trending tiles. Nothing else writes `trending:geohash:*` keys.
pub struct TrendingEngine {
    events: Arc<dyn EventStorage>,
    articles: Arc<dyn ArticleStorage>,
    cache: Arc<dyn CacheBackend>,
    config: TrendingConfig,
}

impl TrendingEngine {
    pub fn new(
        events: Arc<dyn EventStorage>,
        articles: Arc<dyn ArticleStorage>,
        cache: Arc<dyn CacheBackend>,
        config: TrendingConfig,
    ) -> Self {
        Self {
            events,
            articles,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &TrendingConfig {
        &self.config
    }

    /// Spawn the periodic recompute loop.
    pub fn start(self: Arc<Self>) -> TrendingHandle {
        TrendingHandle::spawn(self)
    }

    fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let window = ChronoDuration::from_std(self.config.window)
            .map_err(|e| Error::validation(format!("trending window out of range: {}", e)))?;
        Ok(now - window)
    }

    async fn recent_events(&self, now: DateTime<Utc>) -> Result<Vec<EventWithLocation>> {
        self.events.recent_events(self.window_start(now)?).await
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Recompute every tile that has events in the window ending at `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let started = std::time::Instant::now();
        let events = self.recent_events(now).await?;
        if events.is_empty() {
            info!("No recent events to compute trending scores");
            return Ok(CycleReport::default());
        }

        let mut report = CycleReport {
            events: events.len(),
            ..Default::default()
        };
        for (tile, tile_events) in group_by_tile(events) {
            match self.compute_tile(&tile, &tile_events, now).await {
                Ok(_) => report.tiles += 1,
                Err(e) => {
                    warn!(tile = %tile, error = %e, "Failed to compute tile score");
                    report.failed_tiles += 1;
                }
            }
        }

        let meta = TrendingMeta {
            last_computed_at: now,
            event_count: report.events,
            tile_count: report.tiles,
        };
        self.cache
            .set(
                keys::TRENDING_META_KEY,
                serde_json::to_vec(&meta)?,
                self.config.meta_ttl,
            )
            .await?;

        match self.events.prune_events(self.window_start(now)?).await {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, "Pruned expired events"),
            Err(e) => warn!(error = %e, "Failed to prune expired events"),
        }

        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            events = report.events,
            tiles = report.tiles,
            "Completed trending computation"
        );
        Ok(report)
    }

    /// Score one tile and atomically replace its stored set. Returns the
    /// number of scored articles.
    async fn compute_tile(
        &self,
        tile: &str,
        events: &[EventWithLocation],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let scores = score_tile(events, now);
        let members: Vec<(String, f64)> = scores
            .into_iter()
            .map(|s| (s.article_id, s.score))
            .collect();
        let count = members.len();

        self.cache
            .replace_sorted(&keys::trending_key(tile, TILE_SET_LIMIT), members, self.config.tile_ttl)
            .await
            .map_err(|e| Error::TrendingCompute {
                tile: tile.to_string(),
                reason: e.to_string(),
            })?;

        debug!(tile, events = events.len(), articles = count, "Computed trending scores for tile");
        Ok(count)
    }

    /// Stored scores for the tile containing the point. Never recomputes.
    pub async fn get_trending_scores(
        &self,
        lat: f64,
        lon: f64,
        limit: usize,
    ) -> Result<Vec<TrendingScore>> {
        let tile = tile_of(lat, lon);
        let members = self
            .cache
            .rev_range_with_scores(&keys::trending_key(&tile, TILE_SET_LIMIT), limit)
            .await?;
        Ok(members
            .into_iter()
            .map(|(article_id, score)| TrendingScore { article_id, score })
            .collect())
    }

    pub async fn force_recompute(&self, lat: f64, lon: f64) -> Result<usize> {
        self.force_recompute_at(lat, lon, Utc::now()).await
    }

    /// Recompute only the tile containing the point.
    pub async fn force_recompute_at(&self, lat: f64, lon: f64, now: DateTime<Utc>) -> Result<usize> {
        let tile = tile_of(lat, lon);
        let events = self.recent_events(now).await?;
        let tile_events = group_by_tile(events).remove(&tile).unwrap_or_default();
        info!(tile = %tile, events = tile_events.len(), "Forced trending recompute");
        self.compute_tile(&tile, &tile_events, now).await
    }

    pub async fn meta(&self) -> Result<Option<TrendingMeta>> {
        match self.cache.get(keys::TRENDING_META_KEY).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Trending scores joined with their articles. Articles that no longer
    /// exist are skipped.
    pub async fn enrich_trending(
        &self,
        lat: f64,
        lon: f64,
        limit: usize,
    ) -> Result<Vec<TrendingArticle>> {
        let scores = self.get_trending_scores(lat, lon, limit).await?;
        let mut hydrated = Vec::with_capacity(scores.len());
        for score in scores {
            match self.articles.get_article(&score.article_id).await? {
                Some(article) => hydrated.push(TrendingArticle {
                    article,
                    trending_score: score.score,
                }),
                None => debug!(article = %score.article_id, "Trending article no longer stored"),
            }
        }
        Ok(hydrated)
    }

    /// Record `count` synthetic events around well-scored articles.
    pub async fn simulate_events(&self, count: usize) -> Result<usize> {
        let pool: Vec<Article> = self
            .articles
            .get_by_min_score(SIMULATION_MIN_SCORE)
            .await?
            .into_iter()
            .take(SIMULATION_POOL)
            .collect();
        if pool.is_empty() {
            info!("No articles available for event simulation");
            return Ok(0);
        }

        let events: Vec<NewUserEvent> = {
            let mut rng = rand::thread_rng();
            (0..count)
                .map(|_| {
                    let article = &pool[rng.gen_range(0..pool.len())];
                    let (lat, lon) = match article.coordinates() {
                        Some((lat, lon)) => (
                            lat + rng.gen_range(-JITTER_DEGREES..JITTER_DEGREES),
                            lon + rng.gen_range(-JITTER_DEGREES..JITTER_DEGREES),
                        ),
                        None => (rng.gen_range(-90.0..90.0), rng.gen_range(-180.0..180.0)),
                    };
                    let kind = if rng.gen_bool(CLICK_PROBABILITY) {
                        EventKind::Click
                    } else {
                        EventKind::View
                    };
                    NewUserEvent::new(article.id.clone(), kind).from_location(lat, lon)
                })
                .collect()
        };

        let mut created = 0;
        for event in events {
            let article_id = event.article_id.clone();
            match self.events.record_event(event).await {
                Ok(_) => created += 1,
                Err(e) => warn!(article = %article_id, error = %e, "Failed to create simulated event"),
            }
        }
        info!(events_created = created, "Simulated user events");
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nr_cache::MemoryCache;
    use nr_core::testing::{base_time, sample_articles};
    use nr_storage::InMemoryStorage;

    const SF: (f64, f64) = (37.7749, -122.4194);
    const PARIS: (f64, f64) = (48.8566, 2.3522);

    async fn setup() -> (Arc<TrendingEngine>, InMemoryStorage, Arc<MemoryCache>) {
        let storage = InMemoryStorage::with_articles(&sample_articles()).await.unwrap();
        let cache = Arc::new(MemoryCache::new());
        let engine = Arc::new(TrendingEngine::new(
            Arc::new(storage.clone()),
            Arc::new(storage.clone()),
            cache.clone(),
            TrendingConfig::default(),
        ));
        (engine, storage, cache)
    }

    async fn record(
        storage: &InMemoryStorage,
        article: &str,
        kind: EventKind,
        at: DateTime<Utc>,
        (lat, lon): (f64, f64),
    ) {
        storage
            .record_event(NewUserEvent::new(article, kind).at(at).from_location(lat, lon))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_events_is_a_no_op() {
        let (engine, _, cache) = setup().await;
        let report = engine.run_cycle_at(base_time()).await.unwrap();
        assert_eq!(report, CycleReport::default());
        assert!(engine.meta().await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cycle_scores_tiles_and_writes_meta() {
        let (engine, storage, _) = setup().await;
        let now = base_time();
        record(&storage, "a1", EventKind::Click, now - ChronoDuration::minutes(5), SF).await;
        record(&storage, "a3", EventKind::View, now - ChronoDuration::minutes(5), SF).await;
        record(&storage, "a4", EventKind::View, now - ChronoDuration::hours(1), PARIS).await;

        let report = engine.run_cycle_at(now).await.unwrap();
        assert_eq!(report.events, 3);
        assert_eq!(report.tiles, 2);

        let scores = engine.get_trending_scores(SF.0, SF.1, 10).await.unwrap();
        let ids: Vec<_> = scores.iter().map(|s| s.article_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
        assert_eq!(engine.get_trending_scores(SF.0, SF.1, 1).await.unwrap().len(), 1);

        let meta = engine.meta().await.unwrap().unwrap();
        assert_eq!(meta.event_count, 3);
        assert_eq!(meta.tile_count, 2);
        assert_eq!(meta.last_computed_at, now);
    }

    #[tokio::test]
    async fn test_recompute_is_idempotent() {
        let (engine, storage, _) = setup().await;
        let now = base_time();
        record(&storage, "a1", EventKind::Click, now - ChronoDuration::hours(2), SF).await;
        record(&storage, "a3", EventKind::View, now - ChronoDuration::hours(1), SF).await;

        engine.force_recompute_at(SF.0, SF.1, now).await.unwrap();
        let first = engine.get_trending_scores(SF.0, SF.1, 50).await.unwrap();
        engine.force_recompute_at(SF.0, SF.1, now).await.unwrap();
        let second = engine.get_trending_scores(SF.0, SF.1, 50).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_tile_set_is_fully_replaced() {
        let (engine, storage, _) = setup().await;
        let now = base_time();
        record(&storage, "a1", EventKind::Click, now - ChronoDuration::hours(1), SF).await;
        engine.run_cycle_at(now).await.unwrap();

        let later = now + ChronoDuration::hours(30);
        record(&storage, "a3", EventKind::View, later - ChronoDuration::minutes(1), SF).await;
        engine.run_cycle_at(later).await.unwrap();

        let scores = engine.get_trending_scores(SF.0, SF.1, 50).await.unwrap();
        let ids: Vec<_> = scores.iter().map(|s| s.article_id.as_str()).collect();
        assert_eq!(ids, vec!["a3"]);
    }

    #[tokio::test]
    async fn test_tile_keeps_every_scored_article() {
        let (engine, storage, _) = setup().await;
        let now = base_time();
        for i in 0..60 {
            let id = format!("x{:02}", i);
            record(&storage, &id, EventKind::View, now - ChronoDuration::minutes(i), SF).await;
        }
        assert_eq!(engine.force_recompute_at(SF.0, SF.1, now).await.unwrap(), 60);

        let scores = engine.get_trending_scores(SF.0, SF.1, 100).await.unwrap();
        assert_eq!(scores.len(), 60);
        assert_eq!(scores[0].article_id, "x00");
        assert_eq!(scores[59].article_id, "x59");
    }

    #[tokio::test]
    async fn test_force_recompute_touches_one_tile() {
        let (engine, storage, _) = setup().await;
        let now = base_time();
        record(&storage, "a1", EventKind::View, now, SF).await;
        record(&storage, "a4", EventKind::View, now, PARIS).await;

        assert_eq!(engine.force_recompute_at(PARIS.0, PARIS.1, now).await.unwrap(), 1);
        assert_eq!(engine.get_trending_scores(PARIS.0, PARIS.1, 5).await.unwrap().len(), 1);
        assert!(engine.get_trending_scores(SF.0, SF.1, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enrich_trending_hydrates_articles() {
        let (engine, storage, _) = setup().await;
        let now = Utc::now();
        record(&storage, "a1", EventKind::Click, now, SF).await;
        record(&storage, "missing", EventKind::Click, now, SF).await;
        engine.run_cycle_at(now).await.unwrap();

        let trending = engine.enrich_trending(SF.0, SF.1, 10).await.unwrap();
        assert_eq!(trending.len(), 1);
        assert_eq!(trending[0].article.id, "a1");
        assert!(trending[0].trending_score > 0.0);
    }

    #[tokio::test]
    async fn test_simulate_events() {
        let (engine, storage, _) = setup().await;
        assert_eq!(engine.simulate_events(50).await.unwrap(), 50);

        let events = storage
            .recent_events(Utc::now() - ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(events.len(), 50);
        assert!(events.iter().all(|e| e.event.user_coordinates().is_some()));
        assert!(events
            .iter()
            .all(|e| matches!(e.event.kind, EventKind::View | EventKind::Click)));
        assert!(events.iter().all(|e| e.event.article_id != "a5"));
    }

    /// Cache that refuses to write one tile.
    struct FlakyCache {
        inner: MemoryCache,
        broken_key: String,
    }

    #[async_trait]
    impl CacheBackend for FlakyCache {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
            self.inner.set(key, value, ttl).await
        }
        async fn set_nx(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
            self.inner.set_nx(key, value, ttl).await
        }
        async fn del(&self, key: &str) -> Result<bool> {
            self.inner.del(key).await
        }
        async fn del_if_eq(&self, key: &str, expected: &[u8]) -> Result<bool> {
            self.inner.del_if_eq(key, expected).await
        }
        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }
        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
            self.inner.expire(key, ttl).await
        }
        async fn replace_sorted(
            &self,
            key: &str,
            members: Vec<(String, f64)>,
            ttl: Duration,
        ) -> Result<()> {
            if key == self.broken_key {
                return Err(Error::Cache("write refused".to_string()));
            }
            self.inner.replace_sorted(key, members, ttl).await
        }
        async fn rev_range_with_scores(&self, key: &str, limit: usize) -> Result<Vec<(String, f64)>> {
            self.inner.rev_range_with_scores(key, limit).await
        }
    }

    #[tokio::test]
    async fn test_failed_tile_does_not_stop_cycle() {
        let storage = InMemoryStorage::with_articles(&sample_articles()).await.unwrap();
        let cache = Arc::new(FlakyCache {
            inner: MemoryCache::new(),
            broken_key: keys::trending_key(&tile_of(PARIS.0, PARIS.1), TILE_SET_LIMIT),
        });
        let engine = TrendingEngine::new(
            Arc::new(storage.clone()),
            Arc::new(storage.clone()),
            cache,
            TrendingConfig::default(),
        );
        let now = base_time();
        record(&storage, "a1", EventKind::View, now, SF).await;
        record(&storage, "a4", EventKind::View, now, PARIS).await;

        let report = engine.run_cycle_at(now).await.unwrap();
        assert_eq!(report.tiles, 1);
        assert_eq!(report.failed_tiles, 1);
        assert_eq!(engine.get_trending_scores(SF.0, SF.1, 5).await.unwrap().len(), 1);

        let err = engine.force_recompute_at(PARIS.0, PARIS.1, now).await.unwrap_err();
        assert!(matches!(err, Error::TrendingCompute { .. }));
    }
}
