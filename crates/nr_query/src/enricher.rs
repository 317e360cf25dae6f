use nr_cache::{keys, CacheBackend};
use nr_core::{Error, NormalizedResult, Summarizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub concurrency: usize,
    /// Bound on the whole fan-out, not on each call.
    pub timeout: Duration,
    pub summary_ttl: Duration,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: Duration::from_secs(10),
            summary_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Attaches summaries to ranked results. Output order always matches input
/// order; a failed or timed-out summary is simply left absent.
#[derive(Clone)]
pub struct Enricher {
    summarizer: Arc<dyn Summarizer>,
    cache: Option<Arc<dyn CacheBackend>>,
    config: EnricherConfig,
}

impl Enricher {
    pub fn new(summarizer: Arc<dyn Summarizer>, config: EnricherConfig) -> Self {
        Self {
            summarizer,
            cache: None,
            config,
        }
    }

    /// Reuse summaries stored under `news:summary:<id>`.
    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn enrich(&self, mut results: Vec<NormalizedResult>) -> Vec<NormalizedResult> {
        if results.is_empty() {
            return results;
        }

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (index, result) in results.iter().enumerate() {
            let summarizer = self.summarizer.clone();
            let cache = self.cache.clone();
            let permits = permits.clone();
            let ttl = self.config.summary_ttl;
            let article = result.article.clone();

            tasks.spawn(async move {
                let summary = async {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::Enrichment(e.to_string()))?;
                    summarize_cached(summarizer.as_ref(), cache.as_deref(), &article, ttl).await
                }
                .await;
                (index, article.id, summary)
            });
        }

        let mut summaries: Vec<Option<String>> = vec![None; results.len()];
        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, _, Ok(summary))) => summaries[index] = Some(summary),
                    Ok((_, id, Err(e))) => {
                        warn!(article = %id, error = %e, "Summary failed");
                    }
                    Err(e) => warn!(error = %e, "Summary task aborted"),
                }
            }
        };
        if tokio::time::timeout(self.config.timeout, collect).await.is_err() {
            warn!(
                pending = tasks.len(),
                "Enrichment timed out, leaving remaining summaries empty"
            );
            tasks.abort_all();
        }

        for (result, summary) in results.iter_mut().zip(summaries) {
            result.summary = summary;
        }
        results
    }
}

async fn summarize_cached(
    summarizer: &dyn Summarizer,
    cache: Option<&dyn CacheBackend>,
    article: &nr_core::Article,
    ttl: Duration,
) -> nr_core::Result<String> {
    let key = keys::summary_key(&article.id);
    if let Some(cache) = cache {
        if let Some(bytes) = cache.get(&key).await? {
            if let Ok(summary) = String::from_utf8(bytes) {
                debug!(article = %article.id, "Summary cache hit");
                return Ok(summary);
            }
        }
    }

    let summary = summarizer
        .summarize(
            &article.title,
            article.description.as_deref(),
            &article.source_name,
            article.published_at,
        )
        .await
        .map_err(|e| Error::Enrichment(e.to_string()))?;

    if let Some(cache) = cache {
        if let Err(e) = cache.set(&key, summary.clone().into_bytes(), ttl).await {
            warn!(article = %article.id, error = %e, "Failed to cache summary");
        }
    }
    Ok(summary)
}
