use nr_core::{Error, IntentClassifier, QueryRequest, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::enricher::Enricher;
use crate::gateway::RetrievalGateway;
use crate::response::{QueryInfo, QueryResponse};
use crate::strategy::select_strategy;

pub const NEARBY_QUERY: &str = "trending news near me";
pub const NEARBY_RADIUS_KM: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attach summaries to results. Off for callers that only need ids.
    pub enrich: bool,
    pub deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enrich: true,
            deadline: None,
        }
    }
}

/// Runs a query end to end: classify, select a strategy, retrieve through
/// the cache, enrich, assemble.
#[derive(Clone)]
pub struct QueryEngine {
    classifier: Arc<dyn IntentClassifier>,
    gateway: RetrievalGateway,
    enricher: Enricher,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        gateway: RetrievalGateway,
        enricher: Enricher,
        config: EngineConfig,
    ) -> Self {
        Self {
            classifier,
            gateway,
            enricher,
            config,
        }
    }

    pub fn gateway(&self) -> &RetrievalGateway {
        &self.gateway
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    /// Run a query, bounded by the configured deadline if there is one.
    pub async fn query(&self, request: QueryRequest) -> Result<QueryResponse> {
        match self.config.deadline {
            Some(deadline) => self.query_with_deadline(request, deadline).await,
            None => self.execute(request, "query").await,
        }
    }

    pub async fn query_with_deadline(
        &self,
        request: QueryRequest,
        deadline: Duration,
    ) -> Result<QueryResponse> {
        tokio::time::timeout(deadline, self.execute(request, "query"))
            .await
            .map_err(|_| Error::DeadlineExceeded(deadline))?
    }

    /// Articles near a point, as served by the nearby convenience route.
    pub async fn nearby(&self, lat: f64, lon: f64, limit: Option<usize>) -> Result<QueryResponse> {
        let mut request = QueryRequest::new(NEARBY_QUERY)
            .with_location(lat, lon)
            .with_radius(NEARBY_RADIUS_KM);
        request.limit = limit;
        self.execute(request, "nearby").await
    }

    async fn execute(&self, request: QueryRequest, endpoint: &str) -> Result<QueryResponse> {
        request.validate()?;

        let extraction = self.classifier.extract(&request.query).await?;
        let strategy = select_strategy(&extraction, &request);
        debug!(
            query = %request.query,
            intent = extraction.intent_label(),
            strategy = %strategy,
            "Routing query"
        );

        let mut results = self.gateway.retrieve(strategy, &extraction, &request).await?;
        if self.config.enrich {
            results = self.enricher.enrich(results).await;
        }

        info!(strategy = %strategy, total = results.len(), "Query served");
        Ok(QueryResponse::assemble(
            results,
            &extraction,
            strategy,
            QueryInfo::from_request(endpoint, &request),
        ))
    }
}
