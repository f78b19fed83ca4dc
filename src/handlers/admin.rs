use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::parse_datetime;
use crate::models::{Booking, Coupon, DiscountType, Transaction, TransactionStatus};
use crate::services::{coupons, wallet};
use crate::state::AppState;

#[allow(clippy::result_large_err)]
fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), Response> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized", "kind": "unauthorized"})),
        )
            .into_response());
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub valid_from: String,
    pub valid_until: String,
    pub usage_limit: Option<i64>,
    pub per_user_limit: Option<i64>,
    pub services: Option<Vec<String>>,
}

// POST /api/admin/coupons
pub async fn create_coupon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let valid_from =
        parse_datetime(&req.valid_from, "valid_from").map_err(|e| e.into_response())?;
    let valid_until =
        parse_datetime(&req.valid_until, "valid_until").map_err(|e| e.into_response())?;

    let db = state.db.lock().unwrap();
    let coupon = coupons::create_coupon(
        &db,
        coupons::NewCoupon {
            code: req.code,
            discount_type: req.discount_type,
            value: req.value,
            valid_from,
            valid_until,
            usage_limit: req.usage_limit,
            per_user_limit: req.per_user_limit,
            services: req.services,
        },
    )
    .map_err(|e| e.into_response())?;

    Ok((StatusCode::CREATED, Json(coupon)))
}

// GET /api/admin/coupons
pub async fn list_coupons(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Coupon>>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let coupons = queries::list_coupons(&db).map_err(|e| e.into_response())?;
    Ok(Json(coupons))
}

// POST /api/admin/coupons/:code/deactivate
pub async fn deactivate_coupon(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Result<Json<Coupon>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let coupon = coupons::deactivate(&db, &code).map_err(|e| e.into_response())?;
    Ok(Json(coupon))
}

#[derive(Deserialize)]
pub struct SettleRequest {
    pub status: TransactionStatus,
}

// POST /api/admin/transactions/:id/settle
pub async fn settle_transaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<Transaction>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let db = state.db.lock().unwrap();
    let tx = wallet::settle(&db, &id, req.status).map_err(|e| e.into_response())?;
    Ok(Json(tx))
}

#[derive(Deserialize)]
pub struct AdminBookingsQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// GET /api/admin/bookings
pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AdminBookingsQuery>,
) -> Result<Json<Vec<Booking>>, Response> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = query.limit.unwrap_or(50);

    let db = state.db.lock().unwrap();
    let bookings = queries::list_bookings(&db, None, None, query.status.as_deref(), limit)
        .map_err(|e| e.into_response())?;
    Ok(Json(bookings))
}
