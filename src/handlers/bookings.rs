use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::errors::AppError;
use crate::handlers::parse_datetime;
use crate::models::{Address, Booking, BookingStatus, GeoPoint, PaymentStatus, Telemetry};
use crate::services::{lifecycle, wallet};
use crate::state::AppState;

use crate::db::queries;

#[derive(Deserialize)]
pub struct AddressPayload {
    pub line: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub customer_id: String,
    pub therapist_id: String,
    pub service: String,
    pub scheduled_at: String,
    pub amount: Decimal,
    pub address: AddressPayload,
    pub coupon_code: Option<String>,
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let scheduled_at = parse_datetime(&req.scheduled_at, "scheduled_at")?;

    let db = state.db.lock().unwrap();
    let booking = lifecycle::place_booking(
        &db,
        lifecycle::NewBooking {
            customer_id: req.customer_id,
            therapist_id: req.therapist_id,
            service: req.service,
            scheduled_at,
            amount: req.amount,
            address: Address {
                line: req.address.line,
                lat: req.address.lat,
                lng: req.address.lng,
            },
            coupon_code: req.coupon_code,
        },
    )?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, AppError> {
    let db = state.db.lock().unwrap();
    let booking = queries::get_booking_by_id(&db, &id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct BookingsQuery {
    pub customer_id: Option<String>,
    pub therapist_id: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// GET /api/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let limit = query.limit.unwrap_or(50);

    let db = state.db.lock().unwrap();
    let bookings = queries::list_bookings(
        &db,
        query.customer_id.as_deref(),
        query.therapist_id.as_deref(),
        query.status.as_deref(),
        limit,
    )?;
    Ok(Json(bookings))
}

#[derive(Deserialize)]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
}

impl LocationPayload {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lng: self.lng,
            lat: self.lat,
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            accuracy: self.accuracy,
            speed: self.speed,
            heading: self.heading,
        }
    }
}

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub actor_id: String,
    pub status: BookingStatus,
    pub location: Option<LocationPayload>,
}

// POST /api/bookings/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<Booking>, AppError> {
    let point = req.location.as_ref().map(|l| l.point());
    let telemetry = req
        .location
        .as_ref()
        .map(|l| l.telemetry())
        .unwrap_or_default();

    let db = state.db.lock().unwrap();
    let booking = lifecycle::request_transition(
        &db,
        &state.config,
        &id,
        &req.actor_id,
        req.status,
        point,
        telemetry,
    )?;
    Ok(Json(booking))
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub status: PaymentStatus,
}

// POST /api/bookings/:id/payment — the payment-gateway callback boundary.
pub async fn capture_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<Booking>, AppError> {
    let db = state.db.lock().unwrap();
    let booking = wallet::capture_payment(&db, &id, req.status)?;
    Ok(Json(booking))
}
