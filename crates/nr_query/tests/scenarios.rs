use async_trait::async_trait;
use nr_cache::{MemoryCache, ReadThroughCache, TtlPolicy};
use nr_core::testing::{sample_articles, EchoSummarizer, StaticClassifier};
use nr_core::{
    Article, ArticleStorage, Error, Extraction, Intent, IntentClassifier, QueryRequest, Result,
    Strategy,
};
use nr_inference::models::KeywordModel;
use nr_query::{EngineConfig, Enricher, EnricherConfig, QueryEngine, RetrievalGateway};
use nr_storage::InMemoryStorage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SF: (f64, f64) = (37.7749, -122.4194);

/// Article store that counts every lookup.
struct CountingStore {
    inner: InMemoryStorage,
    calls: AtomicUsize,
}

impl CountingStore {
    async fn seeded() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryStorage::with_articles(&sample_articles()).await.unwrap(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArticleStorage for CountingStore {
    async fn store_article(&self, article: &Article) -> Result<()> {
        self.inner.store_article(article).await
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        self.hit();
        self.inner.get_article(id).await
    }

    async fn get_by_category(&self, name: &str) -> Result<Vec<Article>> {
        self.hit();
        self.inner.get_by_category(name).await
    }

    async fn get_by_source(&self, name: &str) -> Result<Vec<Article>> {
        self.hit();
        self.inner.get_by_source(name).await
    }

    async fn get_by_min_score(&self, min: f64) -> Result<Vec<Article>> {
        self.hit();
        self.inner.get_by_min_score(min).await
    }

    async fn search(&self, text: &str) -> Result<Vec<Article>> {
        self.hit();
        self.inner.search(text).await
    }

    async fn get_nearby(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<(Article, f64)>> {
        self.hit();
        self.inner.get_nearby(lat, lon, radius_km).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}

fn engine(
    classifier: Arc<dyn IntentClassifier>,
    store: Arc<CountingStore>,
    summarizer: EchoSummarizer,
    config: EngineConfig,
) -> QueryEngine {
    let cache = ReadThroughCache::new(Arc::new(MemoryCache::new()));
    let gateway = RetrievalGateway::new(store, cache, TtlPolicy::default());
    let enricher = Enricher::new(Arc::new(summarizer), EnricherConfig::default());
    QueryEngine::new(classifier, gateway, enricher, config)
}

async fn keyword_engine() -> (QueryEngine, Arc<CountingStore>) {
    let store = CountingStore::seeded().await;
    let engine = engine(
        Arc::new(KeywordModel::new()),
        store.clone(),
        EchoSummarizer::new(),
        EngineConfig::default(),
    );
    (engine, store)
}

fn ids(response: &nr_query::QueryResponse) -> Vec<&str> {
    response.articles.iter().map(|r| r.article.id.as_str()).collect()
}

#[tokio::test]
async fn category_query_orders_newest_first() {
    let (engine, _) = keyword_engine().await;
    let response = engine
        .query(QueryRequest::new("Technology").with_limit(3))
        .await
        .unwrap();

    assert_eq!(response.meta.strategy, Strategy::Category);
    assert_eq!(response.meta.intent, "category");
    assert!(response.meta.entities.contains(&"Technology".to_string()));
    assert_eq!(ids(&response), vec!["a3", "a1"]);
    assert_eq!(response.meta.total, 2);
    assert!(response.articles.iter().all(|r| r.summary.is_some()));

    let published: Vec<_> = response.articles.iter().map(|r| r.article.published_at).collect();
    assert!(published.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn score_threshold_is_parsed_from_query() {
    let (engine, _) = keyword_engine().await;
    let response = engine
        .query(QueryRequest::new("score above 0.85").with_limit(2))
        .await
        .unwrap();

    assert_eq!(response.meta.strategy, Strategy::Score);
    assert_eq!(ids(&response), vec!["a1", "a4"]);
    assert!(response
        .articles
        .iter()
        .all(|r| r.article.relevance_score >= 0.85));
}

#[tokio::test]
async fn coordinates_override_textual_intent() {
    let (engine, _) = keyword_engine().await;
    let response = engine
        .query(
            QueryRequest::new("technology")
                .with_location(SF.0, SF.1)
                .with_radius(10.0),
        )
        .await
        .unwrap();

    assert_eq!(response.meta.strategy, Strategy::Nearby);
    assert_eq!(ids(&response), vec!["a1"]);
    assert!(response
        .articles
        .iter()
        .all(|r| r.distance_meters.unwrap() <= 10_000.0 && r.search_score.is_none()));
}

#[tokio::test]
async fn nearby_without_coordinates_is_missing_geo() {
    let store = CountingStore::seeded().await;
    let mut extraction = Extraction {
        intents: vec![Intent::new("nearby", 0.8)],
        ..Default::default()
    };
    extraction.entities.locations.push("Paris".to_string());

    let engine = engine(
        Arc::new(StaticClassifier::new(extraction)),
        store.clone(),
        EchoSummarizer::new(),
        EngineConfig::default(),
    );

    let err = engine
        .query(QueryRequest::new("news from paris"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingGeo(_)));
    assert!(err.is_client_error());
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn nearby_distances_are_ascending_and_bounded() {
    let (engine, _) = keyword_engine().await;
    let response = engine
        .query(
            QueryRequest::new("what is happening")
                .with_location(SF.0, SF.1)
                .with_radius(20.0)
                .with_limit(10),
        )
        .await
        .unwrap();

    assert_eq!(ids(&response), vec!["a1", "a3"]);
    let distances: Vec<f64> = response
        .articles
        .iter()
        .map(|r| r.distance_meters.unwrap())
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    assert!(distances.iter().all(|d| *d <= 20_000.0));
}

#[tokio::test]
async fn score_floor_holds_for_every_threshold() {
    let (engine, _) = keyword_engine().await;
    for min in [0.0, 0.4, 0.5, 0.81, 0.9, 1.0] {
        let response = engine
            .gateway()
            .by_score(min, 50)
            .await
            .unwrap();
        assert!(response.iter().all(|r| r.article.relevance_score >= min));
    }
    assert!(engine.gateway().by_score(1.0, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let (engine, store) = keyword_engine().await;
    let request = QueryRequest::new("robots").with_limit(5);

    let first = engine.query(request.clone()).await.unwrap();
    assert_eq!(first.meta.strategy, Strategy::Search);
    assert_eq!(ids(&first), vec!["a3"]);
    assert!(first.articles[0].search_score.unwrap() > 0.7);
    let calls = store.calls();

    let second = engine.query(request).await.unwrap();
    assert_eq!(store.calls(), calls);
    assert_eq!(ids(&second), ids(&first));
}

#[tokio::test]
async fn invalid_requests_fail_before_retrieval() {
    let (engine, store) = keyword_engine().await;
    for request in [
        QueryRequest::new(""),
        QueryRequest::new("technology").with_limit(0),
        QueryRequest::new("technology").with_location(95.0, 0.0),
        QueryRequest::new("technology").with_radius(500.0),
    ] {
        let err = engine.query(request).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn deadline_aborts_slow_queries() {
    let store = CountingStore::seeded().await;
    let engine = engine(
        Arc::new(KeywordModel::new()),
        store,
        EchoSummarizer::new().with_delay(Duration::from_secs(2)),
        EngineConfig::default(),
    );

    let err = engine
        .query_with_deadline(QueryRequest::new("Technology"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DeadlineExceeded(_)));
}

#[tokio::test]
async fn nearby_convenience_uses_wide_radius() {
    let (engine, _) = keyword_engine().await;
    let response = engine.nearby(SF.0, SF.1, Some(5)).await.unwrap();

    assert_eq!(response.meta.strategy, Strategy::Nearby);
    assert_eq!(ids(&response), vec!["a1", "a3"]);
    let query = response.meta.query.unwrap();
    assert_eq!(query.endpoint, "nearby");
    assert_eq!(query.params["radius"], 50.0);
}
