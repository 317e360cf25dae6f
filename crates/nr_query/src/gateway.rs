use lazy_static::lazy_static;
use nr_cache::{keys, ReadThroughCache, TtlPolicy};
use nr_core::types::{MAX_RADIUS_KM, MIN_RADIUS_KM};
use nr_core::{
    Article, ArticleStorage, Error, Extraction, NormalizedResult, QueryRequest, Result, Strategy,
};
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

use crate::ranker::rank;
use crate::strategy::{is_known_category, is_known_source};

pub const DEFAULT_CATEGORY: &str = "Technology";
pub const DEFAULT_SOURCE: &str = "TechNews";
pub const DEFAULT_MIN_SCORE: f64 = 0.8;
pub const DEFAULT_RADIUS_KM: f64 = 10.0;

const TITLE_WEIGHT: f64 = 0.7;
const DESCRIPTION_WEIGHT: f64 = 0.3;
const RELEVANCE_WEIGHT: f64 = 0.2;

lazy_static! {
    static ref DECIMAL: Regex = Regex::new(r"\d*\.?\d+").unwrap();
}

/// Category to query for: the first extracted category on the known list.
pub fn category_name(extraction: &Extraction) -> &str {
    extraction
        .categories
        .iter()
        .find(|c| is_known_category(c))
        .map(String::as_str)
        .unwrap_or(DEFAULT_CATEGORY)
}

pub fn source_name(extraction: &Extraction) -> &str {
    extraction
        .sources
        .iter()
        .find(|s| is_known_source(s))
        .map(String::as_str)
        .unwrap_or(DEFAULT_SOURCE)
}

/// Relevance floor for a score query. Only queries that say "above" or
/// "threshold" may override the default, with the first number after that
/// keyword when it lies in [0, 1].
pub fn min_score(query: &str) -> f64 {
    let query = query.to_lowercase();
    let keyword_end = ["above", "threshold"]
        .iter()
        .filter_map(|keyword| query.find(keyword).map(|at| at + keyword.len()))
        .min();
    let Some(start) = keyword_end else {
        return DEFAULT_MIN_SCORE;
    };
    DECIMAL
        .find(&query[start..])
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|score| (0.0..=1.0).contains(score))
        .unwrap_or(DEFAULT_MIN_SCORE)
}

/// Unnormalized: 0.7 for a title hit, 0.3 for a description hit, plus a
/// fifth of the article's relevance.
pub fn search_score(article: &Article, text: &str) -> f64 {
    let needle = text.to_lowercase();
    let mut score = 0.0;
    if article.title.to_lowercase().contains(&needle) {
        score += TITLE_WEIGHT;
    }
    if article
        .description
        .as_ref()
        .map(|d| d.to_lowercase().contains(&needle))
        .unwrap_or(false)
    {
        score += DESCRIPTION_WEIGHT;
    }
    score + article.relevance_score * RELEVANCE_WEIGHT
}

fn finish(mut results: Vec<NormalizedResult>, strategy: Strategy, limit: usize) -> Vec<NormalizedResult> {
    rank(&mut results, strategy);
    results.truncate(limit);
    results
}

/// Dispatches each strategy to the article store through the read-through
/// cache. Every result set is filtered fully, ranked, then truncated before
/// it is cached.
#[derive(Clone)]
pub struct RetrievalGateway {
    store: Arc<dyn ArticleStorage>,
    cache: ReadThroughCache,
    ttl: TtlPolicy,
}

impl RetrievalGateway {
    pub fn new(store: Arc<dyn ArticleStorage>, cache: ReadThroughCache, ttl: TtlPolicy) -> Self {
        Self { store, cache, ttl }
    }

    pub fn store(&self) -> &Arc<dyn ArticleStorage> {
        &self.store
    }

    pub fn cache(&self) -> &ReadThroughCache {
        &self.cache
    }

    pub fn ttl(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Resolve the parameters for `strategy` and run it.
    pub async fn retrieve(
        &self,
        strategy: Strategy,
        extraction: &Extraction,
        request: &QueryRequest,
    ) -> Result<Vec<NormalizedResult>> {
        let limit = request.effective_limit();
        match strategy {
            Strategy::Category => self.by_category(category_name(extraction), limit).await,
            Strategy::Source => self.by_source(source_name(extraction), limit).await,
            Strategy::Score => self.by_score(min_score(&request.query), limit).await,
            Strategy::Search => self.search(request.query.trim(), limit).await,
            Strategy::Nearby => {
                let (lat, lon) = request.coordinates().ok_or_else(|| {
                    Error::MissingGeo("latitude and longitude are required for nearby search".to_string())
                })?;
                let radius_km = request
                    .radius_km
                    .or(extraction.radius_km)
                    .unwrap_or(DEFAULT_RADIUS_KM)
                    .clamp(MIN_RADIUS_KM, MAX_RADIUS_KM);
                self.nearby(lat, lon, radius_km, limit).await
            }
        }
    }

    pub async fn by_category(&self, name: &str, limit: usize) -> Result<Vec<NormalizedResult>> {
        let key = keys::category_key(name, limit);
        let store = self.store.clone();
        let name = name.to_string();
        self.cache
            .get_or_compute_json(&key, self.ttl.for_strategy(Strategy::Category), || async move {
                debug!(category = %name, "Loading articles by category");
                let articles = store.get_by_category(&name).await?;
                let results = articles.into_iter().map(NormalizedResult::new).collect();
                Ok(finish(results, Strategy::Category, limit))
            })
            .await
    }

    pub async fn by_source(&self, name: &str, limit: usize) -> Result<Vec<NormalizedResult>> {
        let key = keys::source_key(name, limit);
        let store = self.store.clone();
        let name = name.to_string();
        self.cache
            .get_or_compute_json(&key, self.ttl.for_strategy(Strategy::Source), || async move {
                debug!(source = %name, "Loading articles by source");
                let articles = store.get_by_source(&name).await?;
                let results = articles.into_iter().map(NormalizedResult::new).collect();
                Ok(finish(results, Strategy::Source, limit))
            })
            .await
    }

    pub async fn by_score(&self, min: f64, limit: usize) -> Result<Vec<NormalizedResult>> {
        let key = keys::score_key(min, limit);
        let store = self.store.clone();
        self.cache
            .get_or_compute_json(&key, self.ttl.for_strategy(Strategy::Score), || async move {
                debug!(min, "Loading articles by score");
                let articles = store.get_by_min_score(min).await?;
                let results = articles.into_iter().map(NormalizedResult::new).collect();
                Ok(finish(results, Strategy::Score, limit))
            })
            .await
    }

    pub async fn search(&self, text: &str, limit: usize) -> Result<Vec<NormalizedResult>> {
        let key = keys::search_key(text, limit);
        let store = self.store.clone();
        let text = text.to_string();
        self.cache
            .get_or_compute_json(&key, self.ttl.for_strategy(Strategy::Search), || async move {
                debug!(text = %text, "Searching articles");
                let articles = store.search(&text).await?;
                let results = articles
                    .into_iter()
                    .map(|article| {
                        let score = search_score(&article, &text);
                        NormalizedResult::with_search_score(article, score)
                    })
                    .collect();
                Ok(finish(results, Strategy::Search, limit))
            })
            .await
    }

    pub async fn nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<NormalizedResult>> {
        let key = keys::nearby_key(lat, lon, radius_km, limit);
        let store = self.store.clone();
        self.cache
            .get_or_compute_json(&key, self.ttl.for_strategy(Strategy::Nearby), || async move {
                debug!(lat, lon, radius_km, "Loading nearby articles");
                let hits = store.get_nearby(lat, lon, radius_km).await?;
                let results = hits
                    .into_iter()
                    .map(|(article, km)| NormalizedResult::with_distance(article, km * 1000.0))
                    .collect();
                Ok(finish(results, Strategy::Nearby, limit))
            })
            .await
    }
}
