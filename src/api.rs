// GeoAssist - REST API
// Axum router over the place store; built here so it can be tested in-process

use crate::coordinator::apply_view;
use crate::db::PlaceStore;
use crate::fetcher::PlaceSource;
use crate::geo::{distance, format_distance, GeoPoint};
use crate::place::{CategoryFilter, Place, RankedPlace};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<PlaceStore>>,
    pub source: Arc<dyn PlaceSource>,
}

impl AppState {
    pub fn new(store: PlaceStore, source: Arc<dyn PlaceSource>) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            source,
        }
    }
}

/// API Response wrapper
#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::err(message))).into_response()
}

/// Place as served by the API, with the display distance when ranked
#[derive(Serialize, Deserialize)]
pub struct PlaceResponse {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_label: Option<String>,
}

impl From<RankedPlace> for PlaceResponse {
    fn from(ranked: RankedPlace) -> Self {
        let distance_label = ranked.distance_label();
        let place = ranked.place;
        Self {
            id: place.id,
            name: place.name,
            category: place.category,
            latitude: place.latitude,
            longitude: place.longitude,
            address: place.address,
            distance_meters: ranked.distance_meters,
            distance_label,
        }
    }
}

impl From<Place> for PlaceResponse {
    fn from(place: Place) -> Self {
        RankedPlace::unranked(place).into()
    }
}

#[derive(Serialize, Deserialize)]
pub struct DistanceResponse {
    pub meters: f64,
    pub label: String,
}

#[derive(Serialize, Deserialize)]
pub struct RefreshResponse {
    pub source: String,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Query for `/api/places`. Position is optional; toggles default to on.
#[derive(Debug, Deserialize)]
pub struct PlacesQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub hospital: Option<bool>,
    pub police: Option<bool>,
    pub library: Option<bool>,
}

impl PlacesQuery {
    fn position(&self) -> Option<GeoPoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    fn filter(&self) -> CategoryFilter {
        CategoryFilter {
            hospitals: self.hospital.unwrap_or(true),
            police: self.police.unwrap_or(true),
            libraries: self.library.unwrap_or(true),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DistanceQuery {
    pub from_lat: f64,
    pub from_lon: f64,
    pub to_lat: f64,
    pub to_lon: f64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/places - Filtered places, ranked when lat/lon are given
async fn list_places(State(state): State<AppState>, Query(query): Query<PlacesQuery>) -> Response {
    let store = match state.store.lock() {
        Ok(store) => store,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "store lock poisoned"),
    };

    match store.all() {
        Ok(snapshot) => {
            let response: Vec<PlaceResponse> = apply_view(&snapshot, &query.filter(), query.position())
                .into_iter()
                .map(PlaceResponse::from)
                .collect();

            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to list places");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/places/:id - One place
async fn get_place(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let store = match state.store.lock() {
        Ok(store) => store,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "store lock poisoned"),
    };

    match store.get(id) {
        Ok(Some(place)) => (StatusCode::OK, Json(ApiResponse::ok(PlaceResponse::from(place)))).into_response(),
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("place {} not found", id)),
        Err(e) => {
            error!(error = %e, id, "failed to load place");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/categories/:name - Places with an exact category label
async fn places_by_category(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let store = match state.store.lock() {
        Ok(store) => store,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "store lock poisoned"),
    };

    // Decode URL-encoded category label
    let decoded = urlencoding::decode(&name)
        .unwrap_or_else(|_| name.clone().into())
        .into_owned();

    match store.by_category(&decoded) {
        Ok(places) => {
            let response: Vec<PlaceResponse> = places.into_iter().map(PlaceResponse::from).collect();
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            error!(error = %e, category = %decoded, "failed to query category");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/distance - Great-circle distance between two points
async fn distance_between(Query(query): Query<DistanceQuery>) -> impl IntoResponse {
    let meters = distance(
        GeoPoint::new(query.from_lat, query.from_lon),
        GeoPoint::new(query.to_lat, query.to_lon),
    );

    Json(ApiResponse::ok(DistanceResponse {
        meters,
        label: format_distance(meters),
    }))
}

/// POST /api/refresh - Fetch from the configured source and persist
async fn refresh(State(state): State<AppState>) -> Response {
    let source = state.source.clone();
    let description = source.describe();

    let fetched = match tokio::task::spawn_blocking(move || source.fetch()).await {
        Ok(result) => result,
        Err(e) => return failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    let places = match fetched {
        Ok(places) => places,
        Err(e) => {
            warn!(error = %e, source = %description, "refresh failed");
            return failure(StatusCode::BAD_GATEWAY, e.to_string());
        }
    };

    let mut store = match state.store.lock() {
        Ok(store) => store,
        Err(_) => return failure(StatusCode::INTERNAL_SERVER_ERROR, "store lock poisoned"),
    };

    match store.apply_refresh(&description, &places) {
        Ok(stats) => {
            let response = RefreshResponse {
                source: description,
                fetched: places.len(),
                inserted: stats.inserted,
                updated: stats.updated,
                unchanged: stats.unchanged,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to persist refresh");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/places", get(list_places))
        .route("/places/:id", get(get_place))
        .route("/categories/:name", get(places_by_category))
        .route("/distance", get(distance_between))
        .route("/refresh", post(refresh))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}
