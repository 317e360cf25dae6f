use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nr_core::geo::haversine_km;
use nr_core::{
    Article, ArticleStorage, Error, EventKind, EventStorage, EventWithLocation, NewUserEvent,
    Result, UserEvent,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::StorageBackend;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        url TEXT NOT NULL,
        published_at TEXT NOT NULL,
        source_name TEXT NOT NULL,
        categories TEXT NOT NULL,
        relevance_score REAL NOT NULL,
        latitude REAL,
        longitude REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        occurred_at TEXT NOT NULL,
        user_lat REAL,
        user_lon REAL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_user_events_occurred_at ON user_events (occurred_at)",
];

const ARTICLE_COLUMNS: &str = "id, title, description, url, published_at, source_name, \
     categories, relevance_score, latitude, longitude";

fn storage_error(context: &str, e: sqlx::Error) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

/// Fixed-width timestamps so lexical order in SQLite matches time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Failed to parse date {}: {}", raw, e)))
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    let categories: String = row.get("categories");
    Ok(Article {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get::<Option<String>, _>("description"),
        url: row.get("url"),
        published_at: parse_timestamp(&row.get::<String, _>("published_at"))?,
        source_name: row.get("source_name"),
        categories: serde_json::from_str(&categories)?,
        relevance_score: row.get("relevance_score"),
        latitude: row.get::<Option<f64>, _>("latitude"),
        longitude: row.get::<Option<f64>, _>("longitude"),
    })
}

fn event_from_row(row: &SqliteRow) -> Result<UserEvent> {
    Ok(UserEvent {
        id: row.get("id"),
        article_id: row.get("article_id"),
        kind: EventKind::from(row.get::<String, _>("event_type")),
        occurred_at: parse_timestamp(&row.get::<String, _>("occurred_at"))?,
        user_lat: row.get::<Option<f64>, _>("user_lat"),
        user_lon: row.get::<Option<f64>, _>("user_lon"),
    })
}

pub struct SQLiteStorage {
    pool: Arc<SqlitePool>,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be available at ./articles.db"
    }

    async fn new() -> Result<Self> {
        Self::new_with_path(Path::new("articles.db")).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| storage_error("Failed to connect to database", e))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| storage_error(&format!("Failed to run migration {}", i), e))?;
        }
        debug!("Opened SQLite storage at {}", db_path.display());

        Ok(Self {
            pool: Arc::new(pool),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    async fn fetch_articles(&self, context: &str) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM articles ORDER BY rowid",
            ARTICLE_COLUMNS
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage_error(context, e))?;

        rows.iter().map(article_from_row).collect()
    }
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn store_article(&self, article: &Article) -> Result<()> {
        let categories = serde_json::to_string(&article.categories)?;

        // Upsert rather than INSERT OR REPLACE so the row keeps its rowid and
        // therefore its position in insertion order.
        sqlx::query(
            r#"
            INSERT INTO articles
            (id, title, description, url, published_at, source_name, categories,
             relevance_score, latitude, longitude)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                url = excluded.url,
                published_at = excluded.published_at,
                source_name = excluded.source_name,
                categories = excluded.categories,
                relevance_score = excluded.relevance_score,
                latitude = excluded.latitude,
                longitude = excluded.longitude
            "#,
        )
        .bind(&article.id)
        .bind(&article.title)
        .bind(article.description.as_deref())
        .bind(&article.url)
        .bind(format_timestamp(article.published_at))
        .bind(&article.source_name)
        .bind(categories)
        .bind(article.relevance_score)
        .bind(article.latitude)
        .bind(article.longitude)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to store article", e))?;

        Ok(())
    }

    async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM articles WHERE id = ?",
            ARTICLE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to get article", e))?;

        row.as_ref().map(article_from_row).transpose()
    }

    async fn get_by_category(&self, name: &str) -> Result<Vec<Article>> {
        // Categories live in a JSON column, so matching happens here.
        let articles = self.fetch_articles("Failed to get articles by category").await?;
        Ok(articles.into_iter().filter(|a| a.has_category(name)).collect())
    }

    async fn get_by_source(&self, name: &str) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM articles WHERE instr(lower(source_name), lower(?)) > 0 ORDER BY rowid",
            ARTICLE_COLUMNS
        ))
        .bind(name)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to get articles by source", e))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn get_by_min_score(&self, min: f64) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM articles WHERE relevance_score >= ? ORDER BY rowid",
            ARTICLE_COLUMNS
        ))
        .bind(min)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to get articles by score", e))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn search(&self, text: &str) -> Result<Vec<Article>> {
        // SQLite's lower() only folds ASCII; match in Rust to agree with the
        // in-memory backend on other scripts.
        let needle = text.to_lowercase();
        let articles = self.fetch_articles("Failed to search articles").await?;
        Ok(articles
            .into_iter()
            .filter(|a| {
                a.title.to_lowercase().contains(&needle)
                    || a.description
                        .as_ref()
                        .map(|d| d.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .collect())
    }

    async fn get_nearby(&self, lat: f64, lon: f64, radius_km: f64) -> Result<Vec<(Article, f64)>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM articles WHERE latitude IS NOT NULL AND longitude IS NOT NULL ORDER BY rowid",
            ARTICLE_COLUMNS
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to get nearby articles", e))?;

        let mut nearby = Vec::new();
        for row in &rows {
            let article = article_from_row(row)?;
            if let Some((article_lat, article_lon)) = article.coordinates() {
                let distance = haversine_km(lat, lon, article_lat, article_lon);
                if distance <= radius_km {
                    nearby.push((article, distance));
                }
            }
        }
        Ok(nearby)
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM articles")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| storage_error("Failed to count articles", e))?
            .get("n");
        Ok(count as usize)
    }
}

#[async_trait]
impl EventStorage for SQLiteStorage {
    async fn record_event(&self, event: NewUserEvent) -> Result<UserEvent> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_events (article_id, event_type, occurred_at, user_lat, user_lon)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.article_id)
        .bind(event.kind.as_str())
        .bind(format_timestamp(event.occurred_at))
        .bind(event.user_lat)
        .bind(event.user_lon)
        .execute(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to record event", e))?;

        Ok(UserEvent {
            id: result.last_insert_rowid(),
            article_id: event.article_id,
            kind: event.kind,
            occurred_at: event.occurred_at,
            user_lat: event.user_lat,
            user_lon: event.user_lon,
        })
    }

    async fn recent_events(&self, since: DateTime<Utc>) -> Result<Vec<EventWithLocation>> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.article_id, e.event_type, e.occurred_at, e.user_lat, e.user_lon,
                   a.latitude, a.longitude
            FROM user_events e
            LEFT JOIN articles a ON a.id = e.article_id
            WHERE e.occurred_at >= ?
            ORDER BY e.id
            "#,
        )
        .bind(format_timestamp(since))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| storage_error("Failed to load recent events", e))?;

        rows.iter()
            .map(|row| {
                Ok(EventWithLocation {
                    event: event_from_row(row)?,
                    latitude: row.get::<Option<f64>, _>("latitude"),
                    longitude: row.get::<Option<f64>, _>("longitude"),
                })
            })
            .collect()
    }

    async fn prune_events(&self, before: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query("DELETE FROM user_events WHERE occurred_at < ?")
            .bind(format_timestamp(before))
            .execute(&*self.pool)
            .await
            .map_err(|e| storage_error("Failed to prune events", e))?;
        Ok(result.rows_affected() as usize)
    }
}
