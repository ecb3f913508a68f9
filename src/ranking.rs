// 📏 Proximity Ranking - Order places by distance from a reference point
//
// Pure and stateless. The origin is supplied per call and never stored.

use crate::geo::{distance, GeoPoint};
use crate::place::Place;
use std::cmp::Ordering;

/// Distance in meters from `origin` to the place's coordinates
pub fn distance_to(origin: GeoPoint, place: &Place) -> f64 {
    distance(origin, place.point())
}

/// Places paired with their distance from `origin`, nearest first.
///
/// Each distance is computed once. The sort is stable, so places at equal
/// distance keep their input order. NaN distances sort after every number.
pub fn rank_by_proximity(places: &[Place], origin: GeoPoint) -> Vec<(Place, f64)> {
    let mut ranked: Vec<(Place, f64)> = places
        .iter()
        .map(|p| (p.clone(), distance_to(origin, p)))
        .collect();

    ranked.sort_by(|a, b| compare_distance(a.1, b.1));
    ranked
}

fn compare_distance(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b)
        .unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}

/// A new vector of places ordered nearest first; the input is untouched
pub fn sort_by_proximity(places: &[Place], origin: GeoPoint) -> Vec<Place> {
    rank_by_proximity(places, origin)
        .into_iter()
        .map(|(place, _)| place)
        .collect()
}

/// The `limit` nearest places
pub fn nearest(places: &[Place], origin: GeoPoint, limit: usize) -> Vec<(Place, f64)> {
    let mut ranked = rank_by_proximity(places, origin);
    ranked.truncate(limit);
    ranked
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{format_distance, EARTH_RADIUS_METERS};

    /// Meters per degree of latitude on the model sphere
    fn meters_per_degree() -> f64 {
        EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0
    }

    /// A place due north of the equator origin at roughly `meters`
    fn place_at(id: i64, meters: f64) -> Place {
        Place::new(
            id,
            &format!("Place {}", id),
            "Hospital",
            meters / meters_per_degree(),
            0.0,
            "",
        )
    }

    fn ids(places: &[Place]) -> Vec<i64> {
        places.iter().map(|p| p.id).collect()
    }

    #[test]
    fn test_three_places_end_to_end() {
        let origin = GeoPoint::new(0.0, 0.0);
        let places = vec![place_at(1, 700.0), place_at(2, 50.0), place_at(3, 1200.0)];

        let ranked = rank_by_proximity(&places, origin);

        let order: Vec<i64> = ranked.iter().map(|(p, _)| p.id).collect();
        let labels: Vec<String> = ranked.iter().map(|(_, d)| format_distance(*d)).collect();

        println!("Ranked: {:?} {:?}", order, labels);
        assert_eq!(order, vec![2, 1, 3]);
        assert_eq!(labels, vec!["50 m", "700 m", "1.20 km"]);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let origin = GeoPoint::new(0.0, 0.0);
        let places = vec![place_at(1, 900.0), place_at(2, 100.0)];
        let before = places.clone();

        let sorted = sort_by_proximity(&places, origin);

        assert_eq!(places, before);
        assert_eq!(ids(&sorted), vec![2, 1]);
    }

    #[test]
    fn test_sort_is_idempotent() {
        let origin = GeoPoint::new(0.0, 0.0);
        let places = vec![
            place_at(1, 5000.0),
            place_at(2, 10.0),
            place_at(3, 320.0),
            place_at(4, 75.0),
        ];

        let once = sort_by_proximity(&places, origin);
        let twice = sort_by_proximity(&once, origin);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_preserves_multiset_for_small_inputs() {
        let origin = GeoPoint::new(0.0, 0.0);

        assert!(sort_by_proximity(&[], origin).is_empty());

        let single = vec![place_at(7, 42.0)];
        assert_eq!(sort_by_proximity(&single, origin), single);

        let many: Vec<Place> = (0..25).map(|i| place_at(i, ((i * 37) % 11) as f64 * 100.0)).collect();
        let mut sorted_ids = ids(&sort_by_proximity(&many, origin));
        sorted_ids.sort();
        assert_eq!(sorted_ids, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_equal_distances_keep_input_order() {
        let origin = GeoPoint::new(0.0, 0.0);
        // 10, 12 and 13 are the same distance north and south of the origin
        let places = vec![
            Place::new(10, "North", "Police", 0.01, 0.0, ""),
            Place::new(11, "Near", "Police", 0.001, 0.0, ""),
            Place::new(12, "South", "Police", -0.01, 0.0, ""),
            Place::new(13, "Also north", "Police", 0.01, 0.0, ""),
        ];

        let sorted = sort_by_proximity(&places, origin);

        assert_eq!(ids(&sorted), vec![11, 10, 12, 13]);
    }

    #[test]
    fn test_nan_distances_sort_last() {
        let origin = GeoPoint::new(0.0, 0.0);
        let places = vec![
            Place::new(1, "Broken", "Library", f64::NAN, 0.0, ""),
            place_at(2, 300.0),
        ];

        assert_eq!(ids(&sort_by_proximity(&places, origin)), vec![2, 1]);
    }

    #[test]
    fn test_nearest_limits_results() {
        let origin = GeoPoint::new(0.0, 0.0);
        let places: Vec<Place> = (1..=6).map(|i| place_at(i, (7 - i) as f64 * 100.0)).collect();

        let top = nearest(&places, origin, 2);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0.id, 6);
        assert_eq!(top[1].0.id, 5);
        assert!(nearest(&places, origin, 100).len() == 6);
    }

    #[test]
    fn test_distance_to_matches_geo_distance() {
        let origin = GeoPoint::new(40.7128, -74.0060);
        let place = Place::new(1, "LA", "Library", 34.0522, -118.2437, "");

        assert_eq!(distance_to(origin, &place), distance(origin, place.point()));
    }
}
