use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Geographic coordinate. Field order is longitude first, matching the
/// (x, y) convention of the stored points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }
}

/// One immutable point in a booking's location trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPoint {
    pub id: i64,
    pub booking_id: String,
    pub therapist_id: String,
    pub point: GeoPoint,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub recorded_at: NaiveDateTime,
}

/// Optional telemetry attached to a ping.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Telemetry {
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

/// Nearest-therapist query result row.
#[derive(Debug, Clone, Serialize)]
pub struct TherapistProximity {
    pub therapist_id: String,
    pub point: GeoPoint,
    pub recorded_at: NaiveDateTime,
    pub distance_km: f64,
}
