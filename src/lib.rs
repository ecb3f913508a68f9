// GeoAssist - Core Library
// Nearby public-service places: fetch, cache, filter and rank by distance.
// Exposes all modules for use in CLI, API server, and tests

pub mod geo;
pub mod place;
pub mod ranking;
pub mod db;
pub mod fetcher;
pub mod coordinator;
pub mod config;

#[cfg(feature = "tui")]
pub mod ui;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use geo::{distance, format_distance, GeoPoint, EARTH_RADIUS_METERS};
pub use place::{Category, CategoryFilter, CategoryKind, Place, RankedPlace};
pub use ranking::{distance_to, nearest, rank_by_proximity, sort_by_proximity};
pub use db::{
    PlaceStore, RefreshEvent, UpsertStats,
    setup_database, upsert_places, get_all_places, get_place, get_places_by_category,
    count_places, clear_places,
};
pub use fetcher::{
    BundledSource, FallbackSource, FetchError, PlaceSource, RemoteSource,
    fetch_in_background, parse_records,
};
pub use coordinator::{apply_view, PlaceCoordinator, RefreshReport};
pub use config::AppConfig;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
