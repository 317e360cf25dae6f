//! Geospatial trending: user events are bucketed into geohash tiles and
//! scored with click weighting, recency decay and proximity decay. Scores
//! live in the shared cache and are refreshed by a periodic worker.

pub mod engine;
pub mod scorer;
pub mod worker;

pub use engine::{
    CycleReport, TrendingArticle, TrendingConfig, TrendingEngine, TILE_SET_LIMIT,
    TRENDING_DEFAULT_LIMIT,
};
pub use scorer::{TrendingMeta, TrendingScore};
pub use worker::TrendingHandle;

pub mod prelude {
    pub use super::{TrendingArticle, TrendingConfig, TrendingEngine, TrendingHandle, TrendingScore};
}
