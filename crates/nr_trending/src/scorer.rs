use chrono::{DateTime, Utc};
use nr_core::geo::{encode_geohash, haversine_km};
use nr_core::{EventKind, EventWithLocation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Geohash length of a tile, roughly 5 km on a side.
pub const TILE_PRECISION: usize = 5;

pub const CLICK_WEIGHT: f64 = 2.0;
pub const VIEW_WEIGHT: f64 = 1.0;
pub const OTHER_WEIGHT: f64 = 1.0;

/// e-folding time of the recency decay.
pub const DECAY_HOURS: f64 = 6.0;
/// Distance at which the proximity factor halves.
pub const GEO_SCALE_KM: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingScore {
    pub article_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingMeta {
    pub last_computed_at: DateTime<Utc>,
    pub event_count: usize,
    pub tile_count: usize,
}

pub fn tile_of(lat: f64, lon: f64) -> String {
    encode_geohash(lat, lon, TILE_PRECISION)
}

pub fn event_weight(kind: &EventKind) -> f64 {
    match kind {
        EventKind::Click => CLICK_WEIGHT,
        EventKind::View => VIEW_WEIGHT,
        EventKind::Other(_) => OTHER_WEIGHT,
    }
}

/// `exp(-hours / 6)`. Events from the future count as fresh.
pub fn time_decay(age_hours: f64) -> f64 {
    (-age_hours.max(0.0) / DECAY_HOURS).exp()
}

pub fn geo_decay(distance_km: f64) -> f64 {
    1.0 / (1.0 + distance_km / GEO_SCALE_KM)
}

pub fn event_score(event: &EventWithLocation, now: DateTime<Utc>) -> f64 {
    let age_hours = (now - event.event.occurred_at).num_milliseconds() as f64 / 3_600_000.0;
    let geo = match (event.event.user_coordinates(), event.article_coordinates()) {
        (Some((user_lat, user_lon)), Some((lat, lon))) => {
            geo_decay(haversine_km(user_lat, user_lon, lat, lon))
        }
        _ => 1.0,
    };
    event_weight(&event.event.kind) * time_decay(age_hours) * geo
}

/// Group events by the tile of the user's location. Events without user
/// coordinates are dropped.
pub fn group_by_tile(events: Vec<EventWithLocation>) -> BTreeMap<String, Vec<EventWithLocation>> {
    let mut tiles: BTreeMap<String, Vec<EventWithLocation>> = BTreeMap::new();
    for event in events {
        if let Some((lat, lon)) = event.event.user_coordinates() {
            tiles.entry(tile_of(lat, lon)).or_default().push(event);
        }
    }
    tiles
}

/// Per-article totals for one tile, highest first with ties by article id.
pub fn score_tile(events: &[EventWithLocation], now: DateTime<Utc>) -> Vec<TrendingScore> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for event in events {
        *totals.entry(event.event.article_id.as_str()).or_default() += event_score(event, now);
    }

    let mut scores: Vec<TrendingScore> = totals
        .into_iter()
        .map(|(article_id, score)| TrendingScore {
            article_id: article_id.to_string(),
            score,
        })
        .collect();
    scores.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.article_id.cmp(&b.article_id))
    });
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nr_core::testing::base_time;
    use nr_core::UserEvent;

    fn event(id: i64, article: &str, kind: EventKind, age: Duration) -> EventWithLocation {
        EventWithLocation {
            event: UserEvent {
                id,
                article_id: article.to_string(),
                kind,
                occurred_at: base_time() - age,
                user_lat: Some(37.7749),
                user_lon: Some(-122.4194),
            },
            latitude: Some(37.7749),
            longitude: Some(-122.4194),
        }
    }

    #[test]
    fn test_time_decay() {
        assert_eq!(time_decay(0.0), 1.0);
        assert!((time_decay(6.0) - 0.367_879).abs() < 1e-5);
        let samples: Vec<f64> = (0..48).map(|h| time_decay(h as f64 * 0.5)).collect();
        assert!(samples.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(time_decay(-2.0), 1.0);
    }

    #[test]
    fn test_geo_decay() {
        assert_eq!(geo_decay(0.0), 1.0);
        assert_eq!(geo_decay(10.0), 0.5);
        assert!(geo_decay(100.0) < geo_decay(20.0));
    }

    #[test]
    fn test_event_weights_and_missing_article_location() {
        let now = base_time();
        let click = event(1, "a1", EventKind::Click, Duration::zero());
        let share = event(2, "a1", EventKind::from("share"), Duration::zero());
        assert_eq!(event_score(&click, now), 2.0);
        assert_eq!(event_score(&share, now), 1.0);

        let mut far = event(3, "a1", EventKind::View, Duration::zero());
        far.latitude = Some(37.8644);
        assert!(event_score(&far, now) < 1.0);
        far.latitude = None;
        assert_eq!(event_score(&far, now), 1.0);
    }

    #[test]
    fn test_score_tile_orders_and_breaks_ties() {
        let now = base_time();
        let events = vec![
            event(1, "b", EventKind::View, Duration::zero()),
            event(2, "a", EventKind::View, Duration::zero()),
            event(3, "c", EventKind::Click, Duration::zero()),
            event(4, "a", EventKind::View, Duration::hours(30)),
        ];
        let scores = score_tile(&events, now);
        let ids: Vec<_> = scores.iter().map(|s| s.article_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert!(scores[1].score > scores[2].score);
    }

    #[test]
    fn test_group_by_tile_drops_unlocated_events() {
        let mut unlocated = event(1, "a", EventKind::View, Duration::zero());
        unlocated.event.user_lat = None;
        let mut paris = event(2, "b", EventKind::View, Duration::zero());
        paris.event.user_lat = Some(48.8566);
        paris.event.user_lon = Some(2.3522);

        let tiles = group_by_tile(vec![
            unlocated,
            paris,
            event(3, "c", EventKind::Click, Duration::zero()),
        ]);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles["9q8yy"].len(), 1);
        assert_eq!(tiles[&tile_of(48.8566, 2.3522)][0].event.article_id, "b");
    }
}
