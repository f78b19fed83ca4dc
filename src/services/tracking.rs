use chrono::{Duration, NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingStatus, GeoPoint, LocationPoint, Telemetry, TherapistProximity};

/// Hard retention window for trail points. Points older than this vanish
/// regardless of the booking's lifecycle.
pub const LOCATION_TTL_HOURS: i64 = 24;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn expiry_for(recorded_at: &NaiveDateTime) -> NaiveDateTime {
    *recorded_at + Duration::hours(LOCATION_TTL_HOURS)
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn record_ping(
    conn: &Connection,
    booking_id: &str,
    point: GeoPoint,
    telemetry: Telemetry,
) -> Result<LocationPoint, AppError> {
    let now = Utc::now().naive_utc();
    record_ping_at(conn, booking_id, point, telemetry, &now)
}

/// Appends one immutable trail point. Pings are rejected outside
/// `on_the_way` so a stray device cannot write into a closed booking.
pub fn record_ping_at(
    conn: &Connection,
    booking_id: &str,
    point: GeoPoint,
    telemetry: Telemetry,
    now: &NaiveDateTime,
) -> Result<LocationPoint, AppError> {
    if !point.is_valid() {
        return Err(AppError::Validation(
            "invalid geographic point".to_string(),
        ));
    }

    let booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    if booking.status != BookingStatus::OnTheWay {
        return Err(AppError::InvalidTransition(format!(
            "location pings are only accepted while on_the_way, booking is {}",
            booking.status.as_str()
        )));
    }

    queries::prune_expired_locations(conn, now)?;

    let expires_at = expiry_for(now);
    let id = queries::insert_location(
        conn,
        &booking.id,
        &booking.therapist_id,
        &point,
        &telemetry,
        now,
        &expires_at,
    )?;
    queries::update_location_snapshot(conn, &booking.id, &point, now)?;

    Ok(LocationPoint {
        id,
        booking_id: booking.id,
        therapist_id: booking.therapist_id,
        point,
        accuracy: telemetry.accuracy,
        speed: telemetry.speed,
        heading: telemetry.heading,
        recorded_at: *now,
    })
}

pub fn trail(conn: &Connection, booking_id: &str) -> Result<Vec<LocationPoint>, AppError> {
    let now = Utc::now().naive_utc();
    trail_at(conn, booking_id, &now)
}

pub fn trail_at(
    conn: &Connection,
    booking_id: &str,
    now: &NaiveDateTime,
) -> Result<Vec<LocationPoint>, AppError> {
    queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

    queries::prune_expired_locations(conn, now)?;
    queries::trail_for_booking(conn, booking_id, now)
}

pub fn nearest_therapists(
    conn: &Connection,
    origin: GeoPoint,
    max_results: usize,
) -> Result<Vec<TherapistProximity>, AppError> {
    let now = Utc::now().naive_utc();
    nearest_therapists_at(conn, origin, max_results, &now)
}

/// Ranks therapists by distance from the origin using each therapist's
/// most recent surviving point; ties go to the fresher position.
pub fn nearest_therapists_at(
    conn: &Connection,
    origin: GeoPoint,
    max_results: usize,
    now: &NaiveDateTime,
) -> Result<Vec<TherapistProximity>, AppError> {
    if !origin.is_valid() {
        return Err(AppError::Validation(
            "invalid geographic point".to_string(),
        ));
    }

    queries::prune_expired_locations(conn, now)?;

    let mut results: Vec<TherapistProximity> = queries::latest_points_per_therapist(conn, now)?
        .into_iter()
        .map(|p| TherapistProximity {
            distance_km: haversine_km(&origin, &p.point),
            therapist_id: p.therapist_id,
            point: p.point,
            recorded_at: p.recorded_at,
        })
        .collect();

    results.sort_by(|a, b| {
        a.distance_km
            .partial_cmp(&b.distance_km)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.recorded_at.cmp(&a.recorded_at))
    });
    results.truncate(max_results);

    Ok(results)
}
