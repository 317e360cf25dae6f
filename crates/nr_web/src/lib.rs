use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod state;

pub use error::{ApiError, ErrorCode};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();
    let limiter = Arc::new(RateLimiter::new(state.rate_limit.clone()));

    let api = Router::new()
        .route(
            "/api/v1/news/query",
            get(handlers::query_get).post(handlers::query_post),
        )
        .route("/api/v1/news/nearby", get(handlers::nearby))
        .route("/api/v1/news/trending", get(handlers::trending))
        .route(
            "/api/v1/news/trending/recompute",
            post(handlers::recompute_trending),
        )
        .layer(middleware::from_fn_with_state(limiter, rate_limit::rate_limit));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

pub mod prelude {
    pub use crate::{create_app, AppState, RateLimitConfig};
    pub use nr_core::{Error, Result};
}
