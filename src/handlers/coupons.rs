use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{money, Coupon};
use crate::services::coupons;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub user_id: String,
    pub service: String,
    pub amount: Decimal,
}

#[derive(Serialize)]
pub struct ValidateCouponResponse {
    pub coupon: Coupon,
    pub discount: Decimal,
    pub payable: Decimal,
}

// POST /api/coupons/validate — preview only, consumes no usage.
pub async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateCouponRequest>,
) -> Result<Json<ValidateCouponResponse>, AppError> {
    let now = Utc::now().naive_utc();

    let db = state.db.lock().unwrap();
    let (coupon, discount) = coupons::validate(
        &db,
        &req.code,
        &req.user_id,
        &req.service,
        req.amount,
        &now,
    )?;

    let payable = money(req.amount - discount);
    Ok(Json(ValidateCouponResponse {
        coupon,
        discount,
        payable,
    }))
}
