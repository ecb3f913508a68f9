// 🧭 Place Coordinator - fetch → persist → observe
//
// Owns the store, the source, the category filter and the user position.
// Everything is injected at construction; there are no global clients.

use crate::db::{PlaceStore, RefreshEvent, UpsertStats};
use crate::fetcher::{fetch_in_background, FetchError, PlaceSource};
use crate::geo::GeoPoint;
use crate::place::{CategoryFilter, CategoryKind, Place, RankedPlace};
use crate::ranking::rank_by_proximity;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::info;

/// Summary of one refresh
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub source: String,
    pub fetched: usize,
    pub stats: UpsertStats,
    pub completed_at: DateTime<Utc>,
}

/// Filter a snapshot, then rank it when a position is known.
///
/// Without a position the filtered snapshot keeps store order and carries
/// no distances.
pub fn apply_view(
    snapshot: &[Place],
    filter: &CategoryFilter,
    position: Option<GeoPoint>,
) -> Vec<RankedPlace> {
    let visible = filter.apply(snapshot);

    match position {
        Some(origin) => rank_by_proximity(&visible, origin)
            .into_iter()
            .map(|(place, meters)| RankedPlace::with_distance(place, meters))
            .collect(),
        None => visible.into_iter().map(RankedPlace::unranked).collect(),
    }
}

pub struct PlaceCoordinator {
    store: PlaceStore,
    source: Arc<dyn PlaceSource>,
    filter: CategoryFilter,
    user_position: Option<GeoPoint>,
}

impl PlaceCoordinator {
    pub fn new(store: PlaceStore, source: Box<dyn PlaceSource>) -> Self {
        PlaceCoordinator {
            store,
            source: Arc::from(source),
            filter: CategoryFilter::default(),
            user_position: None,
        }
    }

    pub fn with_filter(mut self, filter: CategoryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Fetch from the source and persist the result.
    ///
    /// On a fetch error nothing is written and the error is returned.
    pub fn refresh(&mut self) -> Result<RefreshReport> {
        let source = self.source.describe();
        let places = self
            .source
            .fetch()
            .with_context(|| format!("Failed to fetch places from {}", source))?;

        self.persist(&source, &places)
    }

    /// Run the fetch on a worker thread. Hand the delivered batch to
    /// `persist` together with `source_name()`.
    pub fn start_refresh(&self) -> Receiver<Result<Vec<Place>, FetchError>> {
        fetch_in_background(Arc::clone(&self.source))
    }

    /// Persist an already fetched batch and record the refresh event
    pub fn persist(&mut self, source: &str, places: &[Place]) -> Result<RefreshReport> {
        let stats = self.store.apply_refresh(source, places)?;

        info!(
            source = %source,
            fetched = places.len(),
            inserted = stats.inserted,
            updated = stats.updated,
            "refreshed places"
        );

        Ok(RefreshReport {
            source: source.to_string(),
            fetched: places.len(),
            stats,
            completed_at: Utc::now(),
        })
    }

    // ------------------------------------------------------------------
    // Session state
    // ------------------------------------------------------------------

    pub fn set_user_position(&mut self, position: GeoPoint) {
        self.user_position = Some(position);
    }

    pub fn clear_user_position(&mut self) {
        self.user_position = None;
    }

    pub fn user_position(&self) -> Option<GeoPoint> {
        self.user_position
    }

    pub fn set_filter(&mut self, filter: CategoryFilter) {
        self.filter = filter;
    }

    pub fn toggle(&mut self, kind: CategoryKind) {
        self.filter.toggle(kind);
    }

    pub fn filter(&self) -> CategoryFilter {
        self.filter
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Current store snapshot, filtered and ranked for display
    pub fn visible_places(&self) -> Result<Vec<RankedPlace>> {
        let snapshot = self.store.all()?;
        Ok(apply_view(&snapshot, &self.filter, self.user_position))
    }

    pub fn place(&self, id: i64) -> Result<Option<Place>> {
        self.store.get(id)
    }

    pub fn total_places(&self) -> Result<i64> {
        self.store.count()
    }

    pub fn last_refresh(&self) -> Result<Option<RefreshEvent>> {
        self.store.last_refresh()
    }

    /// Snapshot stream from the store; combine with `apply_view`
    pub fn subscribe(&mut self) -> Result<Receiver<Vec<Place>>> {
        self.store.subscribe()
    }

    pub fn source_name(&self) -> String {
        self.source.describe()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FetchError, PlaceSource};
    use std::sync::{Arc, Mutex};

    /// Source whose next result can be swapped by the test
    struct ScriptedSource {
        next: Arc<Mutex<Option<Vec<Place>>>>,
    }

    impl PlaceSource for ScriptedSource {
        fn fetch(&self) -> Result<Vec<Place>, FetchError> {
            self.next
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| FetchError::Parse("offline".to_string()))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn places() -> Vec<Place> {
        vec![
            // Roughly 1.1 km, 110 m and 560 m north of the equator origin
            Place::new(1, "Far Hospital", "Hospital", 0.010, 0.0, ""),
            Place::new(2, "Near Precinct", "Police", 0.001, 0.0, ""),
            Place::new(3, "Mid Library", "Library", 0.005, 0.0, ""),
            Place::new(4, "Fire Hall", "Fire", 0.003, 0.0, ""),
        ]
    }

    fn coordinator_with(data: Option<Vec<Place>>) -> (PlaceCoordinator, Arc<Mutex<Option<Vec<Place>>>>) {
        let next = Arc::new(Mutex::new(data));
        let source = ScriptedSource { next: next.clone() };
        let store = PlaceStore::open_in_memory().unwrap();
        (PlaceCoordinator::new(store, Box::new(source)), next)
    }

    fn ids(view: &[RankedPlace]) -> Vec<i64> {
        view.iter().map(|r| r.place.id).collect()
    }

    #[test]
    fn test_refresh_persists_and_logs() {
        let (mut coordinator, _) = coordinator_with(Some(places()));

        let report = coordinator.refresh().unwrap();

        assert_eq!(report.fetched, 4);
        assert_eq!(report.stats.inserted, 4);
        assert_eq!(coordinator.total_places().unwrap(), 4);
        assert_eq!(coordinator.last_refresh().unwrap().unwrap().source, "scripted");
    }

    #[test]
    fn test_failed_refresh_keeps_cached_data() {
        let (mut coordinator, next) = coordinator_with(Some(places()));
        coordinator.refresh().unwrap();

        *next.lock().unwrap() = None;
        let err = coordinator.refresh().unwrap_err();

        assert!(format!("{:#}", err).contains("offline"));
        assert_eq!(coordinator.total_places().unwrap(), 4);
    }

    #[test]
    fn test_view_without_position_keeps_store_order() {
        let (mut coordinator, _) = coordinator_with(Some(places()));
        coordinator.refresh().unwrap();

        let view = coordinator.visible_places().unwrap();

        assert_eq!(ids(&view), vec![1, 2, 3, 4]);
        assert!(view.iter().all(|r| r.distance_meters.is_none()));
    }

    #[test]
    fn test_view_with_position_is_ranked() {
        let (mut coordinator, _) = coordinator_with(Some(places()));
        coordinator.refresh().unwrap();
        coordinator.set_user_position(GeoPoint::new(0.0, 0.0));

        let view = coordinator.visible_places().unwrap();

        assert_eq!(ids(&view), vec![2, 4, 3, 1]);
        assert_eq!(view[0].distance_label().unwrap(), "111 m");
        assert_eq!(view[3].distance_label().unwrap(), "1.11 km");

        coordinator.clear_user_position();
        assert!(coordinator.visible_places().unwrap()[0].distance_meters.is_none());
    }

    #[test]
    fn test_filter_toggles_apply_before_ranking() {
        let (mut coordinator, _) = coordinator_with(Some(places()));
        coordinator.refresh().unwrap();
        coordinator.set_user_position(GeoPoint::new(0.0, 0.0));

        coordinator.toggle(CategoryKind::Police);
        coordinator.toggle(CategoryKind::Library);

        // Unknown category "Fire" passes regardless of toggles
        assert_eq!(ids(&coordinator.visible_places().unwrap()), vec![4, 1]);
        assert!(!coordinator.filter().police);
    }

    #[test]
    fn test_subscription_sees_refresh() {
        let (mut coordinator, _) = coordinator_with(Some(places()));
        let rx = coordinator.subscribe().unwrap();

        assert!(rx.try_recv().unwrap().is_empty());

        coordinator.refresh().unwrap();
        let snapshot = rx.try_recv().unwrap();

        let view = apply_view(&snapshot, &CategoryFilter::default(), Some(GeoPoint::new(0.0, 0.0)));
        assert_eq!(view.len(), 4);
        assert_eq!(view[0].place.id, 2);
    }

    #[test]
    fn test_refresh_replaces_records_by_id() {
        let (mut coordinator, next) = coordinator_with(Some(places()));
        coordinator.refresh().unwrap();

        *next.lock().unwrap() = Some(vec![Place::new(1, "Renamed Hospital", "Hospital", 0.010, 0.0, "")]);
        let report = coordinator.refresh().unwrap();

        assert_eq!(report.stats.updated, 1);
        assert_eq!(coordinator.place(1).unwrap().unwrap().name, "Renamed Hospital");
        assert_eq!(coordinator.total_places().unwrap(), 4);
    }

    #[test]
    fn test_background_refresh_then_persist() {
        let (mut coordinator, _) = coordinator_with(Some(places()));

        let rx = coordinator.start_refresh();
        let batch = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(coordinator.total_places().unwrap(), 0, "nothing is written until persist");

        let source = coordinator.source_name();
        let report = coordinator.persist(&source, &batch).unwrap();

        assert_eq!(report.stats.total(), report.fetched);
        assert_eq!(coordinator.total_places().unwrap(), 4);
        assert_eq!(coordinator.last_refresh().unwrap().unwrap().source, "scripted");
    }

    #[test]
    fn test_failed_audit_insert_still_reports_stored_batch() {
        let (mut coordinator, _) = coordinator_with(Some(places()));
        coordinator
            .store
            .connection()
            .execute("DROP TABLE refresh_events", [])
            .unwrap();

        let report = coordinator.refresh().unwrap();
        println!("Report without audit table: {:?}", report.stats);

        assert_eq!(report.stats.inserted, 4);
        assert_eq!(coordinator.total_places().unwrap(), 4);
        assert!(coordinator.last_refresh().is_err());
    }
}
