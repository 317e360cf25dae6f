use nr_core::{NormalizedResult, Strategy};
use std::cmp::Ordering;

fn by_published_desc(a: &NormalizedResult, b: &NormalizedResult) -> Ordering {
    b.article.published_at.cmp(&a.article.published_at)
}

fn by_relevance_desc(a: &NormalizedResult, b: &NormalizedResult) -> Ordering {
    b.article.relevance_score.total_cmp(&a.article.relevance_score)
}

fn by_search_score_desc(a: &NormalizedResult, b: &NormalizedResult) -> Ordering {
    match (a.search_score, b.search_score) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        _ => Ordering::Equal,
    }
}

/// Closest first; results without a distance sink to the end.
fn by_distance_asc(a: &NormalizedResult, b: &NormalizedResult) -> Ordering {
    match (a.distance_meters, b.distance_meters) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Order results for a strategy. The sort is stable, so equal keys keep
/// retrieval order.
pub fn rank(results: &mut [NormalizedResult], strategy: Strategy) {
    match strategy {
        Strategy::Category | Strategy::Source => results.sort_by(by_published_desc),
        Strategy::Score => results.sort_by(by_relevance_desc),
        Strategy::Search => {
            // Mixing the two keys pairwise is not a total order, so pick one
            // key for the whole set.
            if results.iter().all(|r| r.search_score.is_some()) {
                results.sort_by(by_search_score_desc)
            } else {
                results.sort_by(by_relevance_desc)
            }
        }
        Strategy::Nearby => results.sort_by(by_distance_asc),
    }
}
