use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Coupon, CouponStatus, DiscountType};
use crate::services::wallet;

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub valid_from: NaiveDateTime,
    pub valid_until: NaiveDateTime,
    pub usage_limit: Option<i64>,
    pub per_user_limit: Option<i64>,
    pub services: Option<Vec<String>>,
}

pub fn create_coupon(conn: &Connection, req: NewCoupon) -> Result<Coupon, AppError> {
    let code = req.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(AppError::Validation(
            "coupon code must not be empty".to_string(),
        ));
    }
    if req.value <= Decimal::ZERO {
        return Err(AppError::Validation(
            "discount value must be positive".to_string(),
        ));
    }
    if req.discount_type == DiscountType::Percentage && req.value > Decimal::from(100) {
        return Err(AppError::Validation(
            "percentage discount cannot exceed 100".to_string(),
        ));
    }
    if req.valid_until <= req.valid_from {
        return Err(AppError::Validation(
            "validity window must end after it starts".to_string(),
        ));
    }
    if queries::get_coupon(conn, &code)?.is_some() {
        return Err(AppError::Validation(format!(
            "coupon {code} already exists"
        )));
    }

    let coupon = Coupon {
        code,
        discount_type: req.discount_type,
        value: req.value,
        valid_from: req.valid_from,
        valid_until: req.valid_until,
        usage_limit: req.usage_limit,
        per_user_limit: req.per_user_limit,
        services: req.services,
        usage_count: 0,
        status: CouponStatus::Active,
        created_at: Utc::now().naive_utc(),
    };
    queries::insert_coupon(conn, &coupon)?;
    tracing::info!(code = %coupon.code, "coupon created");
    Ok(coupon)
}

/// Looks a coupon up and recomputes its derived status against the clock,
/// persisting the flip to `expired` so later list views agree. This is the
/// lazy sweep: expiry happens on the read/redeem paths, never in the
/// background.
pub fn resolve(conn: &Connection, code: &str, now: &NaiveDateTime) -> Result<Coupon, AppError> {
    let code = code.trim().to_uppercase();
    let mut coupon = queries::get_coupon(conn, &code)?
        .ok_or_else(|| AppError::NotFound(format!("coupon {code}")))?;

    let effective = coupon.effective_status(*now);
    if effective != coupon.status {
        queries::set_coupon_status(conn, &coupon.code, effective)?;
        coupon.status = effective;
    }
    Ok(coupon)
}

/// Checks whether a coupon is redeemable for this user/service/amount and
/// returns the discount it would grant. Read-only: consumes no usage.
pub fn validate(
    conn: &Connection,
    code: &str,
    user_id: &str,
    service: &str,
    amount: Decimal,
    now: &NaiveDateTime,
) -> Result<(Coupon, Decimal), AppError> {
    wallet::validate_amount(amount)?;

    let coupon = resolve(conn, code, now)?;

    if coupon.status != CouponStatus::Active {
        return Err(AppError::Validation(format!(
            "coupon {} is {}",
            coupon.code,
            coupon.status.as_str()
        )));
    }
    if *now < coupon.valid_from {
        return Err(AppError::Validation(format!(
            "coupon {} is not yet valid",
            coupon.code
        )));
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.usage_count >= limit {
            return Err(AppError::Validation(format!(
                "coupon {} usage limit reached",
                coupon.code
            )));
        }
    }
    if let Some(limit) = coupon.per_user_limit {
        let used = queries::count_redemptions_for_user(conn, &coupon.code, user_id)?;
        if used >= limit {
            return Err(AppError::Validation(format!(
                "coupon {} already used the maximum number of times",
                coupon.code
            )));
        }
    }
    if !coupon.applies_to(service) {
        return Err(AppError::Validation(format!(
            "coupon {} does not apply to {service}",
            coupon.code
        )));
    }

    let discount = coupon.discount_for(amount);
    Ok((coupon, discount))
}

/// Validates and consumes one redemption. The usage bump is a conditional
/// update against the limit, so a concurrent redemption cannot take the
/// same last slot.
pub fn redeem(
    conn: &Connection,
    code: &str,
    user_id: &str,
    booking_id: &str,
    service: &str,
    amount: Decimal,
    now: &NaiveDateTime,
) -> Result<(Coupon, Decimal), AppError> {
    let (coupon, discount) = validate(conn, code, user_id, service, amount, now)?;

    if !queries::try_increment_coupon_usage(conn, &coupon.code)? {
        return Err(AppError::Validation(format!(
            "coupon {} usage limit reached",
            coupon.code
        )));
    }
    queries::insert_redemption(conn, &coupon.code, user_id, booking_id, now)?;

    Ok((coupon, discount))
}

pub fn deactivate(conn: &Connection, code: &str) -> Result<Coupon, AppError> {
    let code = code.trim().to_uppercase();
    if !queries::set_coupon_status(conn, &code, CouponStatus::Inactive)? {
        return Err(AppError::NotFound(format!("coupon {code}")));
    }
    queries::get_coupon(conn, &code)?
        .ok_or_else(|| AppError::NotFound(format!("coupon {code}")))
}
