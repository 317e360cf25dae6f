//! Query routing: strategy selection, cached retrieval, ranking and
//! summary enrichment.

pub mod enricher;
pub mod engine;
pub mod gateway;
pub mod ranker;
pub mod response;
pub mod strategy;

pub use enricher::{Enricher, EnricherConfig};
pub use engine::{EngineConfig, QueryEngine};
pub use gateway::RetrievalGateway;
pub use response::{MetaInfo, QueryInfo, QueryResponse};
pub use strategy::select_strategy;

pub mod prelude {
    pub use super::{
        select_strategy, EngineConfig, Enricher, EnricherConfig, QueryEngine, QueryResponse,
        RetrievalGateway,
    };
}
