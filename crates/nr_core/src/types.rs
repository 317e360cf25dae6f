use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

pub const DEFAULT_LIMIT: usize = 5;
pub const MAX_LIMIT: usize = 50;
pub const MAX_QUERY_CHARS: usize = 500;
pub const MIN_RADIUS_KM: f64 = 0.1;
pub const MAX_RADIUS_KM: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(rename = "publication_date")]
    pub published_at: DateTime<Utc>,
    pub source_name: String,
    #[serde(rename = "category", default)]
    pub categories: Vec<String>,
    pub relevance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Article {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    pub fn has_category(&self, name: &str) -> bool {
        let needle = name.to_lowercase();
        self.categories
            .iter()
            .any(|category| category.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default, rename = "orgs", alias = "organizations")]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(rename = "type")]
    pub label: String,
    pub confidence: f64,
}

impl Intent {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Structured output of an intent classifier for a single query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default, rename = "intent")]
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, rename = "source_names")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<f64>,
}

impl Extraction {
    pub const DEFAULT_INTENT: &'static str = "search";
    pub const DEFAULT_CONFIDENCE: f64 = 0.7;

    /// Extraction used when a classifier finds nothing to say about a query.
    pub fn default_search() -> Self {
        Self {
            intents: vec![Intent::new(Self::DEFAULT_INTENT, Self::DEFAULT_CONFIDENCE)],
            ..Default::default()
        }
    }

    /// Highest-confidence intent; the earliest one wins a tie.
    pub fn best_intent(&self) -> Option<&Intent> {
        self.intents.iter().fold(None, |best: Option<&Intent>, intent| match best {
            Some(current) if intent.confidence <= current.confidence => Some(current),
            _ => Some(intent),
        })
    }

    pub fn intent_label(&self) -> &str {
        self.best_intent()
            .map(|intent| intent.label.as_str())
            .unwrap_or(Self::DEFAULT_INTENT)
    }

    /// People, organizations, locations, concepts, categories and sources in that order.
    pub fn all_entities(&self) -> Vec<String> {
        self.entities
            .people
            .iter()
            .chain(&self.entities.organizations)
            .chain(&self.entities.locations)
            .chain(&self.concepts)
            .chain(&self.categories)
            .chain(&self.sources)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Category,
    Source,
    Score,
    Search,
    Nearby,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Category => "category",
            Strategy::Source => "source",
            Strategy::Score => "score",
            Strategy::Search => "search",
            Strategy::Nearby => "nearby",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "category" => Ok(Strategy::Category),
            "source" => Ok(Strategy::Source),
            "score" => Ok(Strategy::Score),
            "search" => Ok(Strategy::Search),
            "nearby" => Ok(Strategy::Nearby),
            other => Err(Error::validation(format!("unknown strategy: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default, alias = "radius")]
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            lat: None,
            lon: None,
            radius_km: None,
            limit: None,
        }
    }

    pub fn with_location(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    pub fn with_radius(mut self, radius_km: f64) -> Self {
        self.radius_km = Some(radius_km);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.lat.zip(self.lon)
    }

    /// Requested limit clamped to `[1, MAX_LIMIT]`.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::validation("query is required"));
        }
        if self.query.chars().count() > MAX_QUERY_CHARS {
            return Err(Error::validation(format!(
                "query must be at most {} characters",
                MAX_QUERY_CHARS
            )));
        }
        if let Some(lat) = self.lat {
            crate::geo::validate_latitude(lat)?;
        }
        if let Some(lon) = self.lon {
            crate::geo::validate_longitude(lon)?;
        }
        if let Some(radius) = self.radius_km {
            if !(MIN_RADIUS_KM..=MAX_RADIUS_KM).contains(&radius) {
                return Err(Error::validation(format!(
                    "radius_km must be between {} and {}",
                    MIN_RADIUS_KM, MAX_RADIUS_KM
                )));
            }
        }
        if let Some(limit) = self.limit {
            if !(1..=MAX_LIMIT).contains(&limit) {
                return Err(Error::validation(format!(
                    "limit must be between 1 and {}",
                    MAX_LIMIT
                )));
            }
        }
        Ok(())
    }
}

/// An article as returned by a retrieval strategy. At most one of
/// `search_score` and `distance_meters` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    #[serde(flatten)]
    pub article: Article,
    #[serde(default, rename = "llm_summary", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_score: Option<f64>,
}

impl NormalizedResult {
    pub fn new(article: Article) -> Self {
        Self {
            article,
            summary: None,
            distance_meters: None,
            search_score: None,
        }
    }

    pub fn with_search_score(article: Article, score: f64) -> Self {
        Self {
            search_score: Some(score),
            ..Self::new(article)
        }
    }

    pub fn with_distance(article: Article, distance_meters: f64) -> Self {
        Self {
            distance_meters: Some(distance_meters),
            ..Self::new(article)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    View,
    Click,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::View => "view",
            EventKind::Click => "click",
            EventKind::Other(kind) => kind,
        }
    }
}

impl From<String> for EventKind {
    fn from(kind: String) -> Self {
        match kind.to_lowercase().as_str() {
            "view" => EventKind::View,
            "click" => EventKind::Click,
            _ => EventKind::Other(kind),
        }
    }
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        EventKind::from(kind.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub id: i64,
    pub article_id: String,
    #[serde(rename = "event")]
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub user_lat: Option<f64>,
    #[serde(default)]
    pub user_lon: Option<f64>,
}

impl UserEvent {
    pub fn user_coordinates(&self) -> Option<(f64, f64)> {
        self.user_lat.zip(self.user_lon)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUserEvent {
    pub article_id: String,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    pub user_lat: Option<f64>,
    pub user_lon: Option<f64>,
}

impl NewUserEvent {
    pub fn new(article_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            article_id: article_id.into(),
            kind,
            occurred_at: Utc::now(),
            user_lat: None,
            user_lon: None,
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn from_location(mut self, lat: f64, lon: f64) -> Self {
        self.user_lat = Some(lat);
        self.user_lon = Some(lon);
        self
    }
}

/// A user event joined with the coordinates of the article it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWithLocation {
    #[serde(flatten)]
    pub event: UserEvent,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl EventWithLocation {
    pub fn article_coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}
