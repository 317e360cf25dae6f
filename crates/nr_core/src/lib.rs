pub mod error;
pub mod geo;
pub mod logging;
pub mod models;
pub mod storage;
pub mod types;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod testing;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use models::{IntentClassifier, Summarizer};
pub use storage::{ArticleStorage, EventStorage};
pub use types::{
    Article, Entities, EventKind, EventWithLocation, Extraction, Intent, NewUserEvent,
    NormalizedResult, QueryRequest, Strategy, UserEvent,
};

pub mod prelude {
    pub use super::types::*;
    pub use super::{ArticleStorage, Error, EventStorage, IntentClassifier, Result, Summarizer};
}
