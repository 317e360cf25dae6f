use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use nr_core::geo::{validate_latitude, validate_longitude};
use nr_core::QueryRequest;
use nr_query::QueryResponse;
use nr_trending::{TrendingArticle, TRENDING_DEFAULT_LIMIT};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MAX_LIMIT: usize = 50;

pub async fn query_get(
    State(state): State<Arc<AppState>>,
    request: Result<Query<QueryRequest>, QueryRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Query(request) = request.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(state.engine.query(request).await?))
}

pub async fn query_post(
    State(state): State<Arc<AppState>>,
    request: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Json(request) = request.map_err(|e| ApiError::bad_request(e.body_text()))?;
    Ok(Json(state.engine.query(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct LocationParams {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub limit: Option<usize>,
}

impl LocationParams {
    fn coordinates(&self) -> ApiResult<(f64, f64)> {
        let (lat, lon) = self
            .lat
            .zip(self.lon)
            .ok_or_else(|| ApiError::bad_request("lat and lon are required"))?;
        validate_latitude(lat)?;
        validate_longitude(lon)?;
        Ok((lat, lon))
    }

    /// Out-of-range limits fall back to the default.
    fn limit(&self) -> usize {
        self.limit
            .filter(|limit| (1..=MAX_LIMIT).contains(limit))
            .unwrap_or(TRENDING_DEFAULT_LIMIT)
    }
}

pub async fn nearby(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LocationParams>, QueryRejection>,
) -> ApiResult<Json<QueryResponse>> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (lat, lon) = params.coordinates()?;
    Ok(Json(state.engine.nearby(lat, lon, params.limit).await?))
}

#[derive(Debug, Serialize)]
pub struct TrendingMetaInfo {
    pub total: usize,
    pub geohash: String,
    pub last_computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TrendingResponse {
    pub articles: Vec<TrendingArticle>,
    pub meta: TrendingMetaInfo,
}

pub async fn trending(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LocationParams>, QueryRejection>,
) -> ApiResult<Json<TrendingResponse>> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (lat, lon) = params.coordinates()?;

    let articles = state.trending.enrich_trending(lat, lon, params.limit()).await?;
    let meta = state.trending.meta().await?;
    Ok(Json(TrendingResponse {
        meta: TrendingMetaInfo {
            total: articles.len(),
            geohash: nr_trending::scorer::tile_of(lat, lon),
            last_computed_at: meta.map(|m| m.last_computed_at),
        },
        articles,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecomputeRequest {
    pub lat: f64,
    pub lon: f64,
}

pub async fn recompute_trending(
    State(state): State<Arc<AppState>>,
    request: Result<Json<RecomputeRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request.map_err(|e| ApiError::bad_request(e.body_text()))?;
    validate_latitude(request.lat)?;
    validate_longitude(request.lon)?;

    let scored = state.trending.force_recompute(request.lat, request.lon).await?;
    let geohash = nr_trending::scorer::tile_of(request.lat, request.lon);
    info!(geohash = %geohash, articles = scored, "Trending tile recomputed on request");
    Ok(Json(json!({
        "geohash": geohash,
        "articles": scored,
        "computed_at": Utc::now().to_rfc3339(),
    })))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
    }))
}

pub async fn ready(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let articles = state.articles.count().await?;
    Ok(Json(json!({
        "status": "ready",
        "timestamp": Utc::now().to_rfc3339(),
        "articles": articles,
    })))
}
