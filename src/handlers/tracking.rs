use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::bookings::LocationPayload;
use crate::models::{GeoPoint, LocationPoint, TherapistProximity};
use crate::services::tracking;
use crate::state::AppState;

// POST /api/bookings/:id/location
pub async fn record_ping(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<LocationPayload>,
) -> Result<(StatusCode, Json<LocationPoint>), AppError> {
    let db = state.db.lock().unwrap();
    let point = tracking::record_ping(&db, &id, req.point(), req.telemetry())?;
    Ok((StatusCode::CREATED, Json(point)))
}

// GET /api/bookings/:id/trail
pub async fn get_trail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LocationPoint>>, AppError> {
    let db = state.db.lock().unwrap();
    let trail = tracking::trail(&db, &id)?;
    Ok(Json(trail))
}

#[derive(Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub limit: Option<usize>,
}

// GET /api/therapists/nearby
pub async fn nearby_therapists(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<TherapistProximity>>, AppError> {
    let origin = GeoPoint {
        lng: query.lng,
        lat: query.lat,
    };
    let limit = query.limit.unwrap_or(10);

    let db = state.db.lock().unwrap();
    let results = tracking::nearest_therapists(&db, origin, limit)?;
    Ok(Json(results))
}
