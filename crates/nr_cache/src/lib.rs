//! Shared cache for query results, summaries and trending tiles.
//!
//! [`CacheBackend`] is the storage contract, [`MemoryCache`] the single-node
//! implementation, and [`ReadThroughCache`] adds the lock-guarded fill that
//! keeps concurrent misses from stampeding the article store.

pub mod backend;
pub mod keys;
pub mod memory;
pub mod read_through;
pub mod ttl;

pub use backend::CacheBackend;
pub use memory::MemoryCache;
pub use read_through::{CacheConfig, ReadThroughCache};
pub use ttl::TtlPolicy;

pub mod prelude {
    pub use super::keys;
    pub use super::{CacheBackend, CacheConfig, MemoryCache, ReadThroughCache, TtlPolicy};
}
