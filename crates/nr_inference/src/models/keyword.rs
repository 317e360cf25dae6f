use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use nr_core::{Extraction, Intent, IntentClassifier, Result, Summarizer};
use regex::Regex;
use std::fmt;
use tracing::debug;

fn word_pattern(words: &[&str]) -> Regex {
    let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).unwrap()
}

struct Rule {
    label: &'static str,
    pattern: Regex,
}

impl Rule {
    fn new(label: &'static str, words: &[&str]) -> Self {
        Self {
            label,
            pattern: word_pattern(words),
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

lazy_static! {
    static ref SCORE_WORDS: Regex = word_pattern(&[
        "score",
        "relevance",
        "above",
        "threshold",
        "high quality",
        "best",
    ]);
    static ref NEAR_WORDS: Regex = word_pattern(&["near", "nearby", "local", "location"]);
    static ref CATEGORY_RULES: Vec<Rule> = vec![
        Rule::new("Technology", &["technology", "tech"]),
        Rule::new("Business", &["business", "finance"]),
        Rule::new("Sports", &["sports"]),
        Rule::new("Health", &["health", "medical"]),
        Rule::new("Science", &["science"]),
        Rule::new("Environment", &["environment", "climate"]),
        Rule::new("Entertainment", &["entertainment", "movie", "gaming"]),
        Rule::new("Politics", &["politics", "government"]),
    ];
    static ref SOURCE_RULES: Vec<Rule> = vec![
        Rule::new("New York Times", &["new york times", "nyt"]),
        Rule::new("Reuters", &["reuters"]),
        Rule::new("BBC", &["bbc"]),
        Rule::new("CNN", &["cnn"]),
        Rule::new("DW", &["dw"]),
        Rule::new("TechNews", &["technews"]),
        Rule::new("SpaceNews", &["spacenews"]),
        Rule::new("FinanceDaily", &["financedaily"]),
        Rule::new("HealthScience", &["healthscience"]),
        Rule::new("GlobalNews", &["globalnews"]),
    ];
    static ref LOCATION_RULES: Vec<Rule> = vec![
        Rule::new("Paris", &["paris"]),
        Rule::new("New York", &["new york", "nyc"]),
        Rule::new("London", &["london"]),
    ];
    static ref PEOPLE_RULES: Vec<Rule> = vec![
        Rule::new("Elon Musk", &["elon musk"]),
        Rule::new("John Smith", &["john smith"]),
    ];
    static ref ORGANIZATION_RULES: Vec<Rule> = vec![
        Rule::new("SpaceX", &["spacex"]),
        Rule::new("Tesla", &["tesla"]),
    ];
    static ref CONCEPT_RULES: Vec<Rule> = vec![
        Rule::new("Artificial Intelligence", &["ai", "artificial intelligence"]),
        Rule::new("Climate Change", &["climate change"]),
        Rule::new("Stock Market", &["stock market"]),
    ];
}

fn matching_labels(rules: &[Rule], text: &str) -> Vec<String> {
    rules
        .iter()
        .filter(|rule| rule.matches(text))
        .map(|rule| rule.label.to_string())
        .collect()
}

/// Deterministic rule-based classifier and template summarizer. Needs no
/// network access, so it is the default when no API key is configured.
#[derive(Default)]
pub struct KeywordModel;

impl fmt::Debug for KeywordModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeywordModel").finish()
    }
}

impl KeywordModel {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str) -> Extraction {
        let mut extraction = Extraction::default();
        let mut intents = Vec::new();

        if SCORE_WORDS.is_match(query) {
            intents.push(Intent::new("score", 0.9));
        }

        extraction.categories = matching_labels(&CATEGORY_RULES, query);
        intents.extend(extraction.categories.iter().map(|_| Intent::new("category", 0.9)));

        extraction.sources = matching_labels(&SOURCE_RULES, query);
        intents.extend(extraction.sources.iter().map(|_| Intent::new("source", 0.9)));

        extraction.entities.locations = matching_labels(&LOCATION_RULES, query);
        intents.extend(
            extraction
                .entities
                .locations
                .iter()
                .map(|_| Intent::new("nearby", 0.8)),
        );
        if NEAR_WORDS.is_match(query) {
            intents.push(Intent::new("nearby", 0.7));
        }

        extraction.entities.people = matching_labels(&PEOPLE_RULES, query);
        extraction.entities.organizations = matching_labels(&ORGANIZATION_RULES, query);
        extraction.concepts = matching_labels(&CONCEPT_RULES, query);

        if intents.is_empty() {
            intents.push(Intent::new(
                Extraction::DEFAULT_INTENT,
                Extraction::DEFAULT_CONFIDENCE,
            ));
        }
        extraction.intents = intents;
        extraction
    }
}

#[async_trait]
impl IntentClassifier for KeywordModel {
    fn name(&self) -> &str {
        "Keyword"
    }

    async fn extract(&self, query: &str) -> Result<Extraction> {
        let extraction = self.classify(query);
        debug!(query, intent = extraction.intent_label(), "Keyword extraction");
        Ok(extraction)
    }
}

#[async_trait]
impl Summarizer for KeywordModel {
    async fn summarize(
        &self,
        title: &str,
        description: Option<&str>,
        source_name: &str,
        published_at: DateTime<Utc>,
    ) -> Result<String> {
        let summary = format!(
            "This article discusses {}, published by {} on {}. {}",
            title,
            source_name,
            published_at.format("%Y-%m-%d"),
            description.unwrap_or_default()
        );
        Ok(summary.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn labels(extraction: &Extraction) -> Vec<&str> {
        extraction.intents.iter().map(|i| i.label.as_str()).collect()
    }

    #[tokio::test]
    async fn test_category_query() {
        let model = KeywordModel::new();
        let extraction = model.extract("Technology").await.unwrap();
        assert_eq!(extraction.categories, vec!["Technology"]);
        assert_eq!(extraction.intent_label(), "category");
    }

    #[test]
    fn test_score_query_wins_tie_by_order() {
        let extraction = KeywordModel::new().classify("best tech stories");
        assert_eq!(labels(&extraction), vec!["score", "category"]);
        assert_eq!(extraction.intent_label(), "score");
    }

    #[test]
    fn test_sources_and_locations() {
        let extraction = KeywordModel::new().classify("Reuters coverage from Paris");
        assert_eq!(extraction.sources, vec!["Reuters"]);
        assert_eq!(extraction.entities.locations, vec!["Paris"]);
        assert_eq!(extraction.intent_label(), "source");

        let extraction = KeywordModel::new().classify("what is happening near me");
        assert_eq!(labels(&extraction), vec!["nearby"]);
    }

    #[test]
    fn test_short_tokens_match_whole_words_only() {
        let extraction = KeywordModel::new().classify("download the sandwich recipe again");
        assert!(extraction.sources.is_empty());
        assert!(extraction.concepts.is_empty());
        assert_eq!(labels(&extraction), vec!["search"]);

        let extraction = KeywordModel::new().classify("AI news from DW");
        assert_eq!(extraction.sources, vec!["DW"]);
        assert_eq!(extraction.concepts, vec!["Artificial Intelligence"]);
    }

    #[test]
    fn test_entities() {
        let extraction = KeywordModel::new().classify("Elon Musk says SpaceX and Tesla lead on AI");
        assert_eq!(extraction.entities.people, vec!["Elon Musk"]);
        assert_eq!(extraction.entities.organizations, vec!["SpaceX", "Tesla"]);
        assert_eq!(extraction.intent_label(), "search");
    }

    #[tokio::test]
    async fn test_template_summary() {
        let model = KeywordModel::new();
        let published = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let summary = model
            .summarize("Rust 2.0 released", Some("A major release."), "TechNews", published)
            .await
            .unwrap();
        assert_eq!(
            summary,
            "This article discusses Rust 2.0 released, published by TechNews on 2025-03-01. A major release."
        );

        let summary = model
            .summarize("Quiet day", None, "BBC", published)
            .await
            .unwrap();
        assert!(summary.ends_with("on 2025-03-01."));
    }
}
