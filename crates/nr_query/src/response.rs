use nr_core::{Extraction, NormalizedResult, QueryRequest, Strategy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryInfo {
    pub endpoint: String,
    pub params: Value,
}

impl QueryInfo {
    pub fn from_request(endpoint: &str, request: &QueryRequest) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            params: json!({
                "query": request.query,
                "lat": request.lat,
                "lon": request.lon,
                "radius": request.radius_km,
                "limit": request.effective_limit(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub total: usize,
    pub intent: String,
    pub entities: Vec<String>,
    pub strategy: Strategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub articles: Vec<NormalizedResult>,
    pub meta: MetaInfo,
}

impl QueryResponse {
    pub fn assemble(
        articles: Vec<NormalizedResult>,
        extraction: &Extraction,
        strategy: Strategy,
        query: QueryInfo,
    ) -> Self {
        Self {
            meta: MetaInfo {
                total: articles.len(),
                intent: extraction.intent_label().to_string(),
                entities: extraction.all_entities(),
                strategy,
                query: Some(query),
            },
            articles,
        }
    }
}
