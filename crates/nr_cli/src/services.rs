use anyhow::{Context, Result};
use chrono::Utc;
use nr_cache::{CacheBackend, MemoryCache, ReadThroughCache};
use nr_query::{EngineConfig, Enricher, QueryEngine, RetrievalGateway};
use nr_storage::Stores;
use nr_trending::TrendingEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::GlobalArgs;
use crate::ingest;

const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Everything a subcommand needs, wired from the global arguments.
pub struct Services {
    pub stores: Stores,
    pub cache: Arc<MemoryCache>,
    pub engine: QueryEngine,
    pub trending: Arc<TrendingEngine>,
}

impl Services {
    pub async fn build(
        args: &GlobalArgs,
        engine_config: EngineConfig,
        trending_interval: Duration,
    ) -> Result<Self> {
        let stores = nr_storage::create_storage(&args.storage, args.database_path.as_deref())
            .await
            .context("Failed to initialise storage")?;
        info!("💾 Storage initialized (using {})", args.storage);

        let mut seeded = 0;
        for path in &args.seed {
            seeded += ingest::load_path(stores.articles.as_ref(), path).await?;
        }
        if args.sample_data {
            seeded +=
                ingest::load_articles(stores.articles.as_ref(), &ingest::sample_articles(Utc::now()))
                    .await?;
        }
        if seeded > 0 {
            info!(articles = seeded, "Seeded article store");
        }

        let models = nr_inference::create_model(&args.inference_config()?)
            .context("Failed to initialise inference model")?;
        info!("🧠 Inference model initialized (using {})", models.classifier.name());

        let cache = Arc::new(MemoryCache::new());
        let backend: Arc<dyn CacheBackend> = cache.clone();
        let gateway = RetrievalGateway::new(
            stores.articles.clone(),
            ReadThroughCache::with_config(backend.clone(), args.cache_config()),
            args.ttl_policy(),
        );
        let enricher = Enricher::new(models.summarizer, args.enricher_config()).with_cache(backend.clone());
        let engine = QueryEngine::new(models.classifier, gateway, enricher, engine_config);

        let trending = Arc::new(TrendingEngine::new(
            stores.events.clone(),
            stores.articles.clone(),
            backend,
            args.trending_config(trending_interval),
        ));

        Ok(Self {
            stores,
            cache,
            engine,
            trending,
        })
    }

    pub fn spawn_janitor(&self) -> tokio::task::JoinHandle<()> {
        self.cache.clone().spawn_janitor(JANITOR_INTERVAL)
    }
}
