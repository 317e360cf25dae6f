use async_trait::async_trait;
use nr_core::{ArticleStorage, Error, EventStorage, Result};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub mod backends;

pub use backends::*;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn get_error_message() -> &'static str;
    async fn new() -> Result<Self>
    where
        Self: Sized;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            #[cfg(feature = "sqlite")]
            "sqlite" => Ok(StorageKind::Sqlite),
            other => Err(Error::Storage(format!("unsupported storage backend: {}", other))),
        }
    }
}

/// The article and event views of one backend.
#[derive(Clone)]
pub struct Stores {
    pub articles: Arc<dyn ArticleStorage>,
    pub events: Arc<dyn EventStorage>,
}

impl Stores {
    pub fn from_backend<T>(backend: T) -> Self
    where
        T: ArticleStorage + EventStorage + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            articles: backend.clone(),
            events: backend,
        }
    }
}

pub async fn create_storage(kind: &str, path: Option<&Path>) -> Result<Stores> {
    let kind = StorageKind::from_str(kind)?;
    let stores = match kind {
        StorageKind::Memory => {
            let storage = <InMemoryStorage as StorageBackend>::new()
                .await
                .map_err(|e| {
                    Error::Storage(format!("{} ({})", InMemoryStorage::get_error_message(), e))
                })?;
            Stores::from_backend(storage)
        }
        #[cfg(feature = "sqlite")]
        StorageKind::Sqlite => {
            let storage = match path {
                Some(path) => SQLiteStorage::new_with_path(path).await,
                None => <SQLiteStorage as StorageBackend>::new().await,
            }
            .map_err(|e| {
                Error::Storage(format!("{} ({})", SQLiteStorage::get_error_message(), e))
            })?;
            Stores::from_backend(storage)
        }
    };
    if kind == StorageKind::Memory && path.is_some() {
        info!("Ignoring database path for in-memory storage");
    }
    Ok(stores)
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend, Stores};
}
