//! Shared fixtures for tests across the workspace crates.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::{IntentClassifier, Summarizer};
use crate::types::{Article, Extraction};
use crate::{Error, Result};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

pub fn article(id: &str, title: &str) -> Article {
    Article {
        id: id.to_string(),
        title: title.to_string(),
        description: None,
        url: format!("https://news.example.com/{}", id),
        published_at: base_time(),
        source_name: "TechNews".to_string(),
        categories: vec![],
        relevance_score: 0.5,
        latitude: None,
        longitude: None,
    }
}

/// A small catalogue spread over categories, sources, scores and places.
pub fn sample_articles() -> Vec<Article> {
    let mut ai = article("a1", "AI chips reshape the data center");
    ai.description = Some("Technology giants race to build AI accelerators".to_string());
    ai.categories = vec!["Technology".to_string(), "AI".to_string()];
    ai.relevance_score = 0.92;
    ai.published_at = base_time() - Duration::hours(1);
    ai.latitude = Some(37.7749);
    ai.longitude = Some(-122.4194);

    let mut markets = article("a2", "Markets rally on rate cut hopes");
    markets.description = Some("Stocks climbed as investors priced in easing".to_string());
    markets.categories = vec!["Business".to_string()];
    markets.source_name = "Reuters".to_string();
    markets.relevance_score = 0.81;
    markets.published_at = base_time() - Duration::hours(5);
    markets.latitude = Some(40.7128);
    markets.longitude = Some(-74.0060);

    let mut robots = article("a3", "Household robots get cheaper");
    robots.description = Some("New technology lowers the price of home automation".to_string());
    robots.categories = vec!["Technology".to_string()];
    robots.relevance_score = 0.64;
    robots.published_at = base_time() - Duration::minutes(10);
    robots.latitude = Some(37.8044);
    robots.longitude = Some(-122.2712);

    let mut climate = article("a4", "Climate summit ends with pledge");
    climate.description = Some("Delegates agree on emissions targets".to_string());
    climate.categories = vec!["Environment".to_string(), "Politics".to_string()];
    climate.source_name = "BBC".to_string();
    climate.relevance_score = 0.88;
    climate.published_at = base_time() - Duration::hours(3);
    climate.latitude = Some(48.8566);
    climate.longitude = Some(2.3522);

    let mut football = article("a5", "Derby ends in a draw");
    football.categories = vec!["Sports".to_string()];
    football.source_name = "GlobalNews".to_string();
    football.relevance_score = 0.41;
    football.published_at = base_time() - Duration::hours(2);

    vec![ai, markets, robots, climate, football]
}

/// Classifier that returns the same extraction for every query.
pub struct StaticClassifier {
    extraction: Extraction,
    calls: AtomicUsize,
}

impl StaticClassifier {
    pub fn new(extraction: Extraction) -> Self {
        Self {
            extraction,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntentClassifier for StaticClassifier {
    fn name(&self) -> &str {
        "Static"
    }

    async fn extract(&self, _query: &str) -> Result<Extraction> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.extraction.clone())
    }
}

/// Summarizer that echoes the title, failing for titles containing `fail_on`.
pub struct EchoSummarizer {
    fail_on: Option<String>,
    delay: Option<std::time::Duration>,
    calls: AtomicUsize,
}

impl EchoSummarizer {
    pub fn new() -> Self {
        Self {
            fail_on: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for EchoSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(
        &self,
        title: &str,
        _description: Option<&str>,
        source_name: &str,
        _published_at: DateTime<Utc>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(needle) = &self.fail_on {
            if title.contains(needle.as_str()) {
                return Err(Error::Inference(format!("summarizer refused: {}", title)));
            }
        }
        Ok(format!("Summary of {} ({})", title, source_name))
    }
}
