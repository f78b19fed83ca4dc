use chrono::{NaiveDateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{
    money, Address, Booking, BookingStatus, GeoPoint, PaymentStatus, Role, Telemetry, Transaction,
    TransactionStatus, TransactionType, User,
};
use crate::services::{coupons, tracking, wallet};

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub customer_id: String,
    pub therapist_id: String,
    pub service: String,
    pub scheduled_at: NaiveDateTime,
    pub amount: Decimal,
    pub address: Address,
    pub coupon_code: Option<String>,
}

/// Creates a booking in the initial `booked` status. Both parties must
/// exist with the right roles; a coupon, if given, is redeemed here and
/// the stored amount is the discounted one.
pub fn place_booking(conn: &Connection, req: NewBooking) -> Result<Booking, AppError> {
    let now = Utc::now().naive_utc();

    let customer = queries::get_user(conn, &req.customer_id)?
        .ok_or_else(|| AppError::NotFound(format!("customer {}", req.customer_id)))?;
    if customer.role != Role::User {
        return Err(AppError::Validation(
            "customer_id must reference a customer account".to_string(),
        ));
    }

    let therapist = queries::get_user(conn, &req.therapist_id)?
        .ok_or_else(|| AppError::NotFound(format!("therapist {}", req.therapist_id)))?;
    if therapist.role != Role::Therapist {
        return Err(AppError::Validation(
            "therapist_id must reference a therapist account".to_string(),
        ));
    }

    wallet::validate_amount(req.amount)?;

    if req.address.lat.is_some() != req.address.lng.is_some() {
        return Err(AppError::Validation(
            "address must carry both lat and lng or neither".to_string(),
        ));
    }
    if let (Some(lat), Some(lng)) = (req.address.lat, req.address.lng) {
        if !(GeoPoint { lng, lat }).is_valid() {
            return Err(AppError::Validation(
                "address coordinates out of range".to_string(),
            ));
        }
    }
    if req.service.trim().is_empty() {
        return Err(AppError::Validation("service must not be empty".to_string()));
    }

    let id = Uuid::new_v4().to_string();

    let (amount, coupon_code) = match req.coupon_code.as_deref() {
        Some(code) => {
            let (coupon, discount) = coupons::redeem(
                conn,
                code,
                &req.customer_id,
                &id,
                &req.service,
                req.amount,
                &now,
            )?;
            (money(req.amount - discount), Some(coupon.code))
        }
        None => (money(req.amount), None),
    };

    let booking = Booking {
        id,
        customer_id: req.customer_id,
        therapist_id: req.therapist_id,
        service: req.service,
        status: BookingStatus::Booked,
        payment_status: PaymentStatus::Pending,
        scheduled_at: req.scheduled_at,
        amount,
        coupon_code,
        address: req.address,
        last_location: None,
        created_at: now,
        updated_at: now,
    };

    queries::create_booking(conn, &booking)?;
    tracing::info!(booking_id = %booking.id, therapist_id = %booking.therapist_id, "booking placed");
    Ok(booking)
}

pub fn request_transition(
    conn: &Connection,
    config: &AppConfig,
    booking_id: &str,
    actor_id: &str,
    target: BookingStatus,
    location: Option<GeoPoint>,
    telemetry: Telemetry,
) -> Result<Booking, AppError> {
    let now = Utc::now().naive_utc();
    apply_transition(
        conn, config, booking_id, actor_id, target, location, telemetry, &now,
    )
}

/// Validates and applies one status transition. Application is a single
/// conditional update keyed on the expected prior status, so concurrent
/// duplicates cannot both win; the loser degrades to a no-op when its
/// target already holds.
#[allow(clippy::too_many_arguments)]
pub fn apply_transition(
    conn: &Connection,
    config: &AppConfig,
    booking_id: &str,
    actor_id: &str,
    target: BookingStatus,
    location: Option<GeoPoint>,
    telemetry: Telemetry,
    now: &NaiveDateTime,
) -> Result<Booking, AppError> {
    let booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
    let actor = queries::get_user(conn, actor_id)?
        .ok_or_else(|| AppError::Unauthorized(format!("unknown actor {actor_id}")))?;

    // Re-requesting the current status is a no-op, not an error. Completion
    // is the exception: it must settle the ledger exactly once.
    if booking.status == target {
        if target == BookingStatus::Completed {
            return Err(AppError::InvalidTransition(
                "booking is already completed".to_string(),
            ));
        }
        return Ok(booking);
    }

    if !booking.status.can_transition_to(target) {
        return Err(AppError::InvalidTransition(format!(
            "{} -> {}",
            booking.status.as_str(),
            target.as_str()
        )));
    }

    authorize(&booking, &actor, target)?;

    let snapshot = match target {
        BookingStatus::OnTheWay => {
            let point = location.ok_or_else(|| {
                AppError::Validation("location is required when going on the way".to_string())
            })?;
            if !point.is_valid() {
                return Err(AppError::Validation(
                    "invalid geographic point".to_string(),
                ));
            }
            Some(point)
        }
        _ => None,
    };

    if target == BookingStatus::Completed && booking.payment_status != PaymentStatus::Success {
        return Err(AppError::PaymentRequired(format!(
            "booking {} has payment status {}",
            booking.id,
            booking.payment_status.as_str()
        )));
    }

    let applied = queries::transition_booking(
        conn,
        &booking.id,
        booking.status,
        target,
        snapshot.as_ref(),
        now,
    )?;

    if !applied {
        // Lost the conditional update: the row changed between our read and
        // write. A duplicate of an already-applied transition stays a no-op.
        let current = queries::get_booking_by_id(conn, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        if current.status == target && target != BookingStatus::Completed {
            return Ok(current);
        }
        return Err(AppError::InvalidTransition(format!(
            "{} -> {}",
            current.status.as_str(),
            target.as_str()
        )));
    }

    match target {
        BookingStatus::OnTheWay => {
            if let Some(point) = snapshot.as_ref() {
                let expires_at = tracking::expiry_for(now);
                queries::insert_location(
                    conn,
                    &booking.id,
                    &booking.therapist_id,
                    point,
                    &telemetry,
                    now,
                    &expires_at,
                )?;
            }
        }
        BookingStatus::Completed => {
            record_commission_split(conn, config, &booking, now)?;
        }
        _ => {}
    }

    tracing::info!(
        booking_id = %booking.id,
        from = booking.status.as_str(),
        to = target.as_str(),
        "booking transitioned"
    );

    queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))
}

/// Therapists drive the forward path for their own bookings; the customer
/// or an admin cancels.
fn authorize(booking: &Booking, actor: &User, target: BookingStatus) -> Result<(), AppError> {
    let allowed = match target {
        BookingStatus::OnTheWay | BookingStatus::InProgress | BookingStatus::Completed => {
            actor.role == Role::Therapist && actor.id == booking.therapist_id
        }
        BookingStatus::Cancelled => {
            actor.role == Role::Admin
                || (actor.role == Role::User && actor.id == booking.customer_id)
        }
        BookingStatus::Booked => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "{} {} may not set status {}",
            actor.role.as_str(),
            actor.id,
            target.as_str()
        )))
    }
}

/// Splits the booking amount into the therapist share (`wallet_credit`)
/// and the platform cut (`commission`). Both rows start pending and are
/// settled by admin action.
fn record_commission_split(
    conn: &Connection,
    config: &AppConfig,
    booking: &Booking,
    now: &NaiveDateTime,
) -> Result<(), AppError> {
    let commission = money(booking.amount * config.commission_rate / Decimal::from(100));
    let therapist_share = money(booking.amount - commission);

    let credit = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: booking.therapist_id.clone(),
        booking_id: Some(booking.id.clone()),
        tx_type: TransactionType::WalletCredit,
        amount: therapist_share,
        status: TransactionStatus::Pending,
        bank_details: None,
        created_at: *now,
        settled_at: None,
    };
    queries::insert_transaction(conn, &credit)?;

    let cut = Transaction {
        id: Uuid::new_v4().to_string(),
        user_id: config.platform_account.clone(),
        booking_id: Some(booking.id.clone()),
        tx_type: TransactionType::Commission,
        amount: commission,
        status: TransactionStatus::Pending,
        bank_details: None,
        created_at: *now,
        settled_at: None,
    };
    queries::insert_transaction(conn, &cut)?;

    Ok(())
}
