use nr_core::{Extraction, QueryRequest, Strategy};

pub const KNOWN_SOURCES: &[&str] = &[
    "new york times",
    "reuters",
    "bbc",
    "cnn",
    "dw",
    "technews",
    "globalnews",
    "financedaily",
];

pub const KNOWN_CATEGORIES: &[&str] = &[
    "technology",
    "business",
    "sports",
    "health",
    "science",
    "environment",
    "politics",
    "entertainment",
];

fn contains_any(entity: &str, known: &[&str]) -> bool {
    let entity = entity.to_lowercase();
    known.iter().any(|name| entity.contains(name))
}

pub fn is_known_source(entity: &str) -> bool {
    contains_any(entity, KNOWN_SOURCES)
}

pub fn is_known_category(entity: &str) -> bool {
    contains_any(entity, KNOWN_CATEGORIES)
}

/// Map an intent label and its synonyms onto a strategy.
pub fn strategy_for_intent(label: &str) -> Option<Strategy> {
    match label.to_lowercase().as_str() {
        "category" | "topic" => Some(Strategy::Category),
        "source" | "publisher" => Some(Strategy::Source),
        "score" | "relevance" => Some(Strategy::Score),
        "nearby" | "location" | "local" => Some(Strategy::Nearby),
        "search" | "query" => Some(Strategy::Search),
        _ => None,
    }
}

/// Pick the retrieval strategy for a query. The first matching rule wins:
/// coordinates on the request, then the best intent, then known sources or
/// categories among the extracted entities, then plain search.
pub fn select_strategy(extraction: &Extraction, request: &QueryRequest) -> Strategy {
    if request.coordinates().is_some() {
        return Strategy::Nearby;
    }

    if let Some(strategy) = extraction
        .best_intent()
        .and_then(|intent| strategy_for_intent(&intent.label))
    {
        return strategy;
    }

    let entities = extraction.all_entities();
    if entities.iter().any(|e| is_known_source(e)) {
        Strategy::Source
    } else if entities.iter().any(|e| is_known_category(e)) {
        Strategy::Category
    } else {
        Strategy::Search
    }
}
