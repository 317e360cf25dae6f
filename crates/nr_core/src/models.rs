use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::Extraction;
use crate::Result;

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// Turn raw query text into an extraction. Only fails on classifier
    /// faults; a query with no recognizable intent yields
    /// [`Extraction::default_search`].
    async fn extract(&self, query: &str) -> Result<Extraction>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize an article in two or three sentences
    async fn summarize(
        &self,
        title: &str,
        description: Option<&str>,
        source_name: &str,
        published_at: DateTime<Utc>,
    ) -> Result<String>;
}
