use clap::Args;
use nr_cache::{CacheConfig, TtlPolicy};
use nr_inference::Provider;
use nr_query::{EngineConfig, EnricherConfig};
use nr_trending::TrendingConfig;
use nr_web::RateLimitConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// A humantime duration that must be longer than zero.
fn positive_duration(value: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Storage backend: memory, or sqlite when built with the `sqlite` feature
    #[arg(long, env = "STORAGE", default_value = "memory", global = true)]
    pub storage: String,

    #[arg(long, env = "DATABASE_PATH", global = true)]
    pub database_path: Option<PathBuf>,

    /// Intent model: auto, keyword or openai
    #[arg(long, env = "MODEL_PROVIDER", default_value = "auto", global = true)]
    pub model: String,

    #[arg(long, env = "OPENAI_API_KEY", global = true, hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "LLM_MODEL", global = true)]
    pub llm_model: Option<String>,

    #[arg(long, env = "LLM_BASE_URL", global = true)]
    pub llm_base_url: Option<String>,

    #[arg(long, env = "LLM_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration, global = true)]
    pub llm_timeout: Duration,

    /// JSON article files or directories loaded at startup
    #[arg(long = "seed", global = true)]
    pub seed: Vec<PathBuf>,

    /// Load the built-in sample articles at startup
    #[arg(long, global = true)]
    pub sample_data: bool,

    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[arg(long, env = "SEARCH_TTL", default_value = "90s", value_parser = humantime::parse_duration, global = true)]
    pub search_ttl: Duration,

    #[arg(long, env = "NEARBY_TTL", default_value = "5m", value_parser = humantime::parse_duration, global = true)]
    pub nearby_ttl: Duration,

    #[arg(long, env = "TRENDING_TTL", default_value = "2m", value_parser = humantime::parse_duration, global = true)]
    pub trending_ttl: Duration,

    /// How far back user events count towards trending
    #[arg(long, env = "TRENDING_WINDOW", default_value = "24h", value_parser = humantime::parse_duration, global = true)]
    pub trending_window: Duration,

    #[arg(long, env = "ENRICH_CONCURRENCY", default_value_t = 8, global = true)]
    pub enrich_concurrency: usize,
}

impl GlobalArgs {
    pub fn inference_config(&self) -> nr_core::Result<nr_inference::Config> {
        Ok(nr_inference::Config {
            provider: Provider::from_str(&self.model)?,
            api_key: self.openai_api_key.clone(),
            model_name: self.llm_model.clone(),
            base_url: self.llm_base_url.clone(),
            request_timeout: self.llm_timeout,
        })
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::default()
            .with_search(self.search_ttl)
            .with_nearby(self.nearby_ttl)
            .with_trending(self.trending_ttl)
            .with_event_retention(self.trending_window)
    }

    pub fn enricher_config(&self) -> EnricherConfig {
        EnricherConfig {
            concurrency: self.enrich_concurrency.max(1),
            summary_ttl: self.ttl_policy().summary,
            ..Default::default()
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default()
    }

    pub fn trending_config(&self, interval: Duration) -> TrendingConfig {
        let ttl = self.ttl_policy();
        TrendingConfig {
            interval,
            window: ttl.event_retention,
            tile_ttl: ttl.trending,
            ..Default::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "TRENDING_WORKER_INTERVAL", default_value = "60s", value_parser = positive_duration)]
    pub trending_interval: Duration,

    /// Whole-request deadline for queries
    #[arg(long, env = "QUERY_TIMEOUT", default_value = "30s", value_parser = positive_duration)]
    pub query_timeout: Duration,

    #[arg(long, env = "RATE_LIMIT_RPM", default_value_t = 60)]
    pub rate_limit_rpm: u32,

    #[arg(long, env = "RATE_LIMIT_BURST", default_value_t = 10)]
    pub rate_limit_burst: u32,

    /// Record this many synthetic user events after startup
    #[arg(long, default_value_t = 0)]
    pub simulate: usize,
}

impl ServeArgs {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            deadline: Some(self.query_timeout),
            ..Default::default()
        }
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: self.rate_limit_rpm.max(1),
            burst: self.rate_limit_burst.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        global: GlobalArgs,
        #[command(flatten)]
        serve: ServeArgs,
    }

    #[test]
    fn test_humantime_durations() {
        let harness = Harness::parse_from([
            "nr",
            "--trending-ttl",
            "1h15m",
            "--trending-interval",
            "90s",
            "--model",
            "keyword",
        ]);
        assert_eq!(harness.global.trending_ttl, Duration::from_secs(75 * 60));
        assert_eq!(harness.serve.trending_interval, Duration::from_secs(90));

        let trending = harness.global.trending_config(harness.serve.trending_interval);
        assert_eq!(trending.tile_ttl, Duration::from_secs(75 * 60));
        assert_eq!(trending.window, Duration::from_secs(24 * 60 * 60));
        assert_eq!(
            harness.global.inference_config().unwrap().provider,
            Provider::Keyword
        );
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        assert!(Harness::try_parse_from(["nr", "--trending-interval", "0s"]).is_err());
        assert!(Harness::try_parse_from(["nr", "--query-timeout", "0ms"]).is_err());
        assert!(Harness::try_parse_from(["nr", "--trending-interval", "soon"]).is_err());

        let harness = Harness::try_parse_from(["nr", "--trending-interval", "250ms"]).unwrap();
        assert_eq!(harness.serve.trending_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let harness = Harness::parse_from(["nr", "--model", "llama"]);
        assert!(harness.global.inference_config().is_err());
    }
}
