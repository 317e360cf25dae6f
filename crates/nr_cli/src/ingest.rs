use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use nr_core::geo::{validate_latitude, validate_longitude};
use nr_core::{Article, ArticleStorage};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// An article as it appears in ingestion files. Ids are optional.
#[derive(Debug, Deserialize)]
pub struct ArticleRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    pub publication_date: DateTime<Utc>,
    pub source_name: String,
    #[serde(default)]
    pub category: Vec<String>,
    pub relevance_score: f64,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl ArticleRecord {
    pub fn into_article(self) -> nr_core::Result<Article> {
        if !(0.0..=1.0).contains(&self.relevance_score) {
            return Err(nr_core::Error::validation(format!(
                "relevance_score {} outside [0, 1]",
                self.relevance_score
            )));
        }
        if let Some(lat) = self.latitude {
            validate_latitude(lat)?;
        }
        if let Some(lon) = self.longitude {
            validate_longitude(lon)?;
        }
        Ok(Article {
            id: self
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            title: self.title,
            description: self.description,
            url: self.url,
            published_at: self.publication_date,
            source_name: self.source_name,
            categories: self.category,
            relevance_score: self.relevance_score,
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

/// Load every `.json` file under `path`, or `path` itself when it is a file.
/// Invalid records are logged and skipped.
pub async fn load_path(storage: &dyn ArticleStorage, path: &Path) -> Result<usize> {
    if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .with_context(|| format!("Failed to read directory {}", path.display()))?
            .collect::<std::io::Result<Vec<_>>>()?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        entries.sort();

        let mut loaded = 0;
        for entry in entries {
            let is_json = entry
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if entry.is_dir() || is_json {
                loaded += Box::pin(load_path(storage, &entry)).await?;
            }
        }
        return Ok(loaded);
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let records: Vec<ArticleRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to decode JSON from {}", path.display()))?;
    info!(file = %path.display(), articles = records.len(), "Loading article file");

    let mut loaded = 0;
    for (index, record) in records.into_iter().enumerate() {
        let title = record.title.clone();
        match record.into_article() {
            Ok(article) => {
                storage.store_article(&article).await?;
                loaded += 1;
            }
            Err(e) => warn!(index, title = %title, error = %e, "Skipping invalid article"),
        }
    }
    Ok(loaded)
}

pub async fn load_articles(storage: &dyn ArticleStorage, articles: &[Article]) -> Result<usize> {
    for article in articles {
        storage.store_article(article).await?;
    }
    Ok(articles.len())
}

struct Sample {
    title: &'static str,
    description: &'static str,
    slug: &'static str,
    source: &'static str,
    categories: &'static [&'static str],
    relevance: f64,
    lat: f64,
    lon: f64,
}

const SAMPLES: &[Sample] = &[
    Sample { title: "Tech Giants Announce AI Partnership", description: "Major technology companies have announced a collaborative partnership to advance artificial intelligence research.", slug: "tech-ai-partnership", source: "TechNews", categories: &["Technology", "AI"], relevance: 0.90, lat: 37.7749, lon: -122.4194 },
    Sample { title: "Climate Change Summit in Paris", description: "World leaders gather in Paris for the annual climate change summit to discuss global warming solutions.", slug: "climate-summit-paris", source: "GlobalNews", categories: &["Environment", "Politics"], relevance: 0.95, lat: 48.8566, lon: 2.3522 },
    Sample { title: "Stock Market Reaches New Highs", description: "Global stock markets have reached unprecedented levels as investors show confidence in the recovery.", slug: "stock-market-highs", source: "FinanceDaily", categories: &["Business", "Finance"], relevance: 0.85, lat: 40.7128, lon: -74.0060 },
    Sample { title: "New Medical Breakthrough in Cancer Research", description: "Scientists have discovered a promising new treatment approach for certain types of cancer.", slug: "cancer-research-breakthrough", source: "HealthScience", categories: &["Health", "Science"], relevance: 0.98, lat: 43.6532, lon: -79.3832 },
    Sample { title: "SpaceX Launches New Satellite Constellation", description: "Another batch of satellites was launched for a global internet constellation.", slug: "spacex-satellite-launch", source: "SpaceNews", categories: &["Science", "Technology"], relevance: 0.92, lat: 28.5729, lon: -80.6490 },
    Sample { title: "Olympic Games Opening Ceremony", description: "The world's greatest athletes gather for the opening ceremony of the Olympic Games.", slug: "olympics-opening", source: "SportsCentral", categories: &["Sports"], relevance: 0.88, lat: 35.6762, lon: 139.6503 },
    Sample { title: "New Electric Vehicle Factory Opens", description: "A major automaker has opened a new factory dedicated to electric vehicle production.", slug: "ev-factory-opens", source: "AutoIndustry", categories: &["Technology", "Business"], relevance: 0.87, lat: 52.5200, lon: 13.4050 },
    Sample { title: "Global Food Security Conference", description: "Experts discuss solutions to global food security challenges at an international conference.", slug: "food-security-conference", source: "WorldFood", categories: &["World", "Environment"], relevance: 0.83, lat: 41.9028, lon: 12.4964 },
    Sample { title: "Cybersecurity Threat Alert", description: "Government agencies issue a warning about new cyber attack patterns.", slug: "cybersecurity-alert", source: "CyberNews", categories: &["Technology", "Security"], relevance: 0.96, lat: 51.5074, lon: -0.1278 },
    Sample { title: "Renewable Energy Milestone Reached", description: "Global renewable energy production has reached a new milestone.", slug: "renewable-energy-milestone", source: "GreenEnergy", categories: &["Environment", "Technology"], relevance: 0.91, lat: 55.6761, lon: 12.5683 },
    Sample { title: "Major Sports League Expansion", description: "A professional sports league announces expansion to new cities and markets.", slug: "sports-league-expansion", source: "SportsBiz", categories: &["Sports", "Business"], relevance: 0.84, lat: 34.0522, lon: -118.2437 },
    Sample { title: "New Quantum Computing Breakthrough", description: "Researchers solve complex computational problems on quantum hardware.", slug: "quantum-computing-breakthrough", source: "QuantumTech", categories: &["Science", "Technology"], relevance: 0.97, lat: 55.7558, lon: 37.6176 },
    Sample { title: "Global Trade Agreement Signed", description: "Major economies sign a comprehensive trade agreement to boost international commerce.", slug: "global-trade-agreement", source: "TradeNews", categories: &["Business", "World"], relevance: 0.89, lat: 46.9479, lon: 7.4474 },
    Sample { title: "New Archaeological Discovery", description: "Archaeologists uncover ancient ruins that could rewrite human history.", slug: "archaeological-discovery", source: "AncientWorld", categories: &["Science", "History"], relevance: 0.86, lat: 30.0444, lon: 31.2357 },
    Sample { title: "Digital Currency Adoption Surges", description: "Central banks accelerate digital currency development and testing.", slug: "digital-currency-adoption", source: "CryptoNews", categories: &["Finance", "Technology"], relevance: 0.93, lat: 1.3521, lon: 103.8198 },
    Sample { title: "New Movie Franchise Announced", description: "A major studio announces a new blockbuster movie franchise based on popular books.", slug: "movie-franchise-announced", source: "EntertainmentNow", categories: &["Entertainment"], relevance: 0.82, lat: 34.0522, lon: -118.2437 },
    Sample { title: "Global Internet Connectivity Initiative", description: "An international consortium launches a project to bring internet access to remote areas.", slug: "internet-connectivity-initiative", source: "TechGlobal", categories: &["Technology", "World"], relevance: 0.88, lat: 28.7041, lon: 77.1025 },
    Sample { title: "New Educational Technology Platform", description: "An online learning platform launches with AI-powered personalized education.", slug: "educational-tech-platform", source: "EduTech", categories: &["Education", "Technology"], relevance: 0.90, lat: -33.8688, lon: 151.2093 },
    Sample { title: "Sustainable Fashion Revolution", description: "Major fashion brands commit to sustainable practices and eco-friendly materials.", slug: "sustainable-fashion-revolution", source: "FashionForward", categories: &["Lifestyle", "Environment"], relevance: 0.85, lat: 59.3293, lon: 18.0686 },
    Sample { title: "New Gaming Console Launch", description: "A next-generation gaming console launches with new graphics and AI features.", slug: "gaming-console-launch", source: "GameTech", categories: &["Technology", "Entertainment"], relevance: 0.94, lat: 35.6762, lon: 139.6503 },
];

/// Twenty demo articles spread over world cities, published two hours apart
/// going back from `now`.
pub fn sample_articles(now: DateTime<Utc>) -> Vec<Article> {
    SAMPLES
        .iter()
        .enumerate()
        .map(|(i, sample)| Article {
            id: format!("sample-{:02}", i + 1),
            title: sample.title.to_string(),
            description: Some(sample.description.to_string()),
            url: format!("https://example.com/{}", sample.slug),
            published_at: now - Duration::hours(2 * (i as i64 + 1)),
            source_name: sample.source.to_string(),
            categories: sample.categories.iter().map(|c| c.to_string()).collect(),
            relevance_score: sample.relevance,
            latitude: Some(sample.lat),
            longitude: Some(sample.lon),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nr_storage::InMemoryStorage;
    use std::io::Write;

    const RECORDS: &str = r#"[
        {
            "title": "Harbor reopens after storm",
            "url": "https://example.com/harbor",
            "publication_date": "2025-03-01T08:00:00Z",
            "source_name": "Coastal Daily",
            "category": ["World"],
            "relevance_score": 0.7,
            "latitude": 37.8,
            "longitude": -122.4
        },
        {
            "id": "fixed-id",
            "title": "Budget vote delayed",
            "description": "Lawmakers postpone the vote.",
            "url": "https://example.com/budget",
            "publication_date": "2025-03-01T09:00:00Z",
            "source_name": "Reuters",
            "category": ["Politics"],
            "relevance_score": 0.9
        },
        {
            "title": "Broken score",
            "url": "https://example.com/broken",
            "publication_date": "2025-03-01T09:00:00Z",
            "source_name": "Reuters",
            "relevance_score": 1.7
        }
    ]"#;

    #[tokio::test]
    async fn test_load_file_skips_invalid_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(RECORDS.as_bytes())
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let storage = InMemoryStorage::new();
        assert_eq!(load_path(&storage, dir.path()).await.unwrap(), 2);
        assert_eq!(storage.count().await.unwrap(), 2);

        let fixed = storage.get_article("fixed-id").await.unwrap().unwrap();
        assert_eq!(fixed.source_name, "Reuters");
        let harbor = storage.search("harbor").await.unwrap();
        assert_eq!(harbor.len(), 1);
        assert!(uuid::Uuid::parse_str(&harbor[0].id).is_ok());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let storage = InMemoryStorage::new();
        assert!(load_path(&storage, &path).await.is_err());
    }

    #[test]
    fn test_sample_articles() {
        let now = Utc::now();
        let articles = sample_articles(now);
        assert_eq!(articles.len(), 20);
        assert!(articles.iter().all(|a| a.coordinates().is_some()));
        assert!(articles.iter().all(|a| a.published_at < now));
        assert_eq!(articles[0].id, "sample-01");
    }
}
