use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

use crate::errors::AppError;
use crate::models::{
    Address, Booking, BookingStatus, Coupon, CouponStatus, DiscountType, GeoPoint, LocationPoint,
    LocationSnapshot, PaymentStatus, Role, Telemetry, Transaction, TransactionStatus,
    TransactionType, User,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

fn parse_amount(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

// ── Users ──

pub fn create_user(conn: &Connection, user: &User) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO users (id, name, phone, role, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.name,
            user.phone,
            user.role.as_str(),
            ts(&user.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>, AppError> {
    let result = conn.query_row(
        "SELECT id, name, phone, role, created_at FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
                phone: row.get(2)?,
                role: Role::parse(&row.get::<_, String>(3)?),
                created_at: parse_ts(&row.get::<_, String>(4)?),
            })
        },
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, customer_id, therapist_id, service, status, payment_status, \
     scheduled_at, amount, coupon_code, address_line, address_lat, address_lng, \
     last_lat, last_lng, last_located_at, created_at, updated_at";

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let last_lat: Option<f64> = row.get(12)?;
    let last_lng: Option<f64> = row.get(13)?;
    let last_located_at: Option<String> = row.get(14)?;

    let last_location = match (last_lat, last_lng, last_located_at) {
        (Some(lat), Some(lng), Some(at)) => Some(LocationSnapshot {
            lat,
            lng,
            recorded_at: parse_ts(&at),
        }),
        _ => None,
    };

    Ok(Booking {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        therapist_id: row.get(2)?,
        service: row.get(3)?,
        status: BookingStatus::parse(&row.get::<_, String>(4)?),
        payment_status: PaymentStatus::parse(&row.get::<_, String>(5)?),
        scheduled_at: parse_ts(&row.get::<_, String>(6)?),
        amount: parse_amount(&row.get::<_, String>(7)?),
        coupon_code: row.get(8)?,
        address: Address {
            line: row.get(9)?,
            lat: row.get(10)?,
            lng: row.get(11)?,
        },
        last_location,
        created_at: parse_ts(&row.get::<_, String>(15)?),
        updated_at: parse_ts(&row.get::<_, String>(16)?),
    })
}

pub fn create_booking(conn: &Connection, booking: &Booking) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO bookings (id, customer_id, therapist_id, service, status, payment_status,
             scheduled_at, amount, coupon_code, address_line, address_lat, address_lng,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            booking.id,
            booking.customer_id,
            booking.therapist_id,
            booking.service,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            ts(&booking.scheduled_at),
            booking.amount.to_string(),
            booking.coupon_code,
            booking.address.line,
            booking.address.lat,
            booking.address.lng,
            ts(&booking.created_at),
            ts(&booking.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> Result<Option<Booking>, AppError> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        parse_booking_row,
    );

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_bookings(
    conn: &Connection,
    customer_id: Option<&str>,
    therapist_id: Option<&str>,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<Booking>, AppError> {
    let mut sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(customer) = customer_id {
        params_vec.push(Box::new(customer.to_string()));
        sql.push_str(&format!(" AND customer_id = ?{}", params_vec.len()));
    }
    if let Some(therapist) = therapist_id {
        params_vec.push(Box::new(therapist.to_string()));
        sql.push_str(&format!(" AND therapist_id = ?{}", params_vec.len()));
    }
    if let Some(status) = status {
        params_vec.push(Box::new(status.to_string()));
        sql.push_str(&format!(" AND status = ?{}", params_vec.len()));
    }

    params_vec.push(Box::new(limit));
    sql.push_str(&format!(
        " ORDER BY scheduled_at DESC LIMIT ?{}",
        params_vec.len()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

/// Conditional status update keyed on the expected prior status. Returns
/// false when no row matched, meaning the booking is missing or its status
/// changed underneath the caller.
pub fn transition_booking(
    conn: &Connection,
    id: &str,
    expected: BookingStatus,
    target: BookingStatus,
    snapshot: Option<&GeoPoint>,
    now: &NaiveDateTime,
) -> Result<bool, AppError> {
    let count = match snapshot {
        Some(point) => conn.execute(
            "UPDATE bookings SET status = ?1, last_lat = ?2, last_lng = ?3,
                 last_located_at = ?4, updated_at = ?4
             WHERE id = ?5 AND status = ?6",
            params![
                target.as_str(),
                point.lat,
                point.lng,
                ts(now),
                id,
                expected.as_str(),
            ],
        )?,
        None => conn.execute(
            "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![target.as_str(), ts(now), id, expected.as_str()],
        )?,
    };
    Ok(count > 0)
}

pub fn set_payment_status(
    conn: &Connection,
    id: &str,
    status: PaymentStatus,
    now: &NaiveDateTime,
) -> Result<bool, AppError> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn update_location_snapshot(
    conn: &Connection,
    id: &str,
    point: &GeoPoint,
    now: &NaiveDateTime,
) -> Result<bool, AppError> {
    let count = conn.execute(
        "UPDATE bookings SET last_lat = ?1, last_lng = ?2, last_located_at = ?3, updated_at = ?3
         WHERE id = ?4",
        params![point.lat, point.lng, ts(now), id],
    )?;
    Ok(count > 0)
}

// ── Locations ──

fn parse_location_row(row: &rusqlite::Row) -> rusqlite::Result<LocationPoint> {
    Ok(LocationPoint {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        therapist_id: row.get(2)?,
        point: GeoPoint {
            lng: row.get(3)?,
            lat: row.get(4)?,
        },
        accuracy: row.get(5)?,
        speed: row.get(6)?,
        heading: row.get(7)?,
        recorded_at: parse_ts(&row.get::<_, String>(8)?),
    })
}

const LOCATION_COLUMNS: &str =
    "id, booking_id, therapist_id, lng, lat, accuracy, speed, heading, recorded_at";

#[allow(clippy::too_many_arguments)]
pub fn insert_location(
    conn: &Connection,
    booking_id: &str,
    therapist_id: &str,
    point: &GeoPoint,
    telemetry: &Telemetry,
    recorded_at: &NaiveDateTime,
    expires_at: &NaiveDateTime,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO locations (booking_id, therapist_id, lng, lat, accuracy, speed, heading,
             recorded_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            booking_id,
            therapist_id,
            point.lng,
            point.lat,
            telemetry.accuracy,
            telemetry.speed,
            telemetry.heading,
            ts(recorded_at),
            ts(expires_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn trail_for_booking(
    conn: &Connection,
    booking_id: &str,
    now: &NaiveDateTime,
) -> Result<Vec<LocationPoint>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations
         WHERE booking_id = ?1 AND expires_at > ?2 ORDER BY id ASC"
    ))?;

    let rows = stmt.query_map(params![booking_id, ts(now)], parse_location_row)?;

    let mut points = vec![];
    for row in rows {
        points.push(row?);
    }
    Ok(points)
}

/// Most recent surviving point per therapist.
pub fn latest_points_per_therapist(
    conn: &Connection,
    now: &NaiveDateTime,
) -> Result<Vec<LocationPoint>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOCATION_COLUMNS} FROM locations l
         INNER JOIN (
             SELECT therapist_id AS tid, MAX(id) AS max_id FROM locations
             WHERE expires_at > ?1 GROUP BY therapist_id
         ) latest ON l.id = latest.max_id"
    ))?;

    let rows = stmt.query_map(params![ts(now)], parse_location_row)?;

    let mut points = vec![];
    for row in rows {
        points.push(row?);
    }
    Ok(points)
}

pub fn prune_expired_locations(conn: &Connection, now: &NaiveDateTime) -> Result<usize, AppError> {
    let count = conn.execute(
        "DELETE FROM locations WHERE expires_at <= ?1",
        params![ts(now)],
    )?;
    Ok(count)
}

// ── Transactions ──

const TRANSACTION_COLUMNS: &str =
    "id, user_id, booking_id, tx_type, amount, status, bank_details, created_at, settled_at";

fn parse_transaction_row(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let settled_at: Option<String> = row.get(8)?;
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        booking_id: row.get(2)?,
        tx_type: TransactionType::parse(&row.get::<_, String>(3)?),
        amount: parse_amount(&row.get::<_, String>(4)?),
        status: TransactionStatus::parse(&row.get::<_, String>(5)?),
        bank_details: row.get(6)?,
        created_at: parse_ts(&row.get::<_, String>(7)?),
        settled_at: settled_at.map(|s| parse_ts(&s)),
    })
}

pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO transactions (id, user_id, booking_id, tx_type, amount, status, bank_details,
             created_at, settled_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            tx.id,
            tx.user_id,
            tx.booking_id,
            tx.tx_type.as_str(),
            tx.amount.to_string(),
            tx.status.as_str(),
            tx.bank_details,
            ts(&tx.created_at),
            tx.settled_at.as_ref().map(ts),
        ],
    )?;
    Ok(())
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Option<Transaction>, AppError> {
    let result = conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
        params![id],
        parse_transaction_row,
    );

    match result {
        Ok(tx) => Ok(Some(tx)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_transactions_for_user(
    conn: &Connection,
    user_id: &str,
    limit: i64,
) -> Result<Vec<Transaction>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TRANSACTION_COLUMNS} FROM transactions
         WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
    ))?;

    let rows = stmt.query_map(params![user_id, limit], parse_transaction_row)?;

    let mut txs = vec![];
    for row in rows {
        txs.push(row?);
    }
    Ok(txs)
}

/// Full wallet-relevant ledger for one user, for balance folds. No limit:
/// the balance is always recomputed from every row.
pub fn wallet_rows(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<(TransactionType, TransactionStatus, Decimal)>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT tx_type, status, amount FROM transactions WHERE user_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![user_id], |row| {
        Ok((
            TransactionType::parse(&row.get::<_, String>(0)?),
            TransactionStatus::parse(&row.get::<_, String>(1)?),
            parse_amount(&row.get::<_, String>(2)?),
        ))
    })?;

    let mut out = vec![];
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Settlement is the only permitted mutation and only moves a pending row.
pub fn settle_transaction(
    conn: &Connection,
    id: &str,
    status: TransactionStatus,
    now: &NaiveDateTime,
) -> Result<bool, AppError> {
    let count = conn.execute(
        "UPDATE transactions SET status = ?1, settled_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![status.as_str(), ts(now), id],
    )?;
    Ok(count > 0)
}

// ── Coupons ──

const COUPON_COLUMNS: &str = "code, discount_type, value, valid_from, valid_until, usage_limit, \
     per_user_limit, services, usage_count, status, created_at";

fn parse_coupon_row(row: &rusqlite::Row) -> rusqlite::Result<Coupon> {
    let services: Option<String> = row.get(7)?;
    Ok(Coupon {
        code: row.get(0)?,
        discount_type: DiscountType::parse(&row.get::<_, String>(1)?),
        value: parse_amount(&row.get::<_, String>(2)?),
        valid_from: parse_ts(&row.get::<_, String>(3)?),
        valid_until: parse_ts(&row.get::<_, String>(4)?),
        usage_limit: row.get(5)?,
        per_user_limit: row.get(6)?,
        services: services.and_then(|s| serde_json::from_str(&s).ok()),
        usage_count: row.get(8)?,
        status: CouponStatus::parse(&row.get::<_, String>(9)?),
        created_at: parse_ts(&row.get::<_, String>(10)?),
    })
}

pub fn insert_coupon(conn: &Connection, coupon: &Coupon) -> Result<(), AppError> {
    let services = coupon
        .services
        .as_ref()
        .map(|s| serde_json::to_string(s).unwrap_or_default());

    conn.execute(
        "INSERT INTO coupons (code, discount_type, value, valid_from, valid_until, usage_limit,
             per_user_limit, services, usage_count, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            coupon.code,
            coupon.discount_type.as_str(),
            coupon.value.to_string(),
            ts(&coupon.valid_from),
            ts(&coupon.valid_until),
            coupon.usage_limit,
            coupon.per_user_limit,
            services,
            coupon.usage_count,
            coupon.status.as_str(),
            ts(&coupon.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_coupon(conn: &Connection, code: &str) -> Result<Option<Coupon>, AppError> {
    let result = conn.query_row(
        &format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = ?1"),
        params![code],
        parse_coupon_row,
    );

    match result {
        Ok(coupon) => Ok(Some(coupon)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_coupons(conn: &Connection) -> Result<Vec<Coupon>, AppError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC"
    ))?;

    let rows = stmt.query_map([], parse_coupon_row)?;

    let mut coupons = vec![];
    for row in rows {
        coupons.push(row?);
    }
    Ok(coupons)
}

pub fn set_coupon_status(
    conn: &Connection,
    code: &str,
    status: CouponStatus,
) -> Result<bool, AppError> {
    let count = conn.execute(
        "UPDATE coupons SET status = ?1 WHERE code = ?2",
        params![status.as_str(), code],
    )?;
    Ok(count > 0)
}

/// Atomic redemption count: bumps usage only while the coupon is active
/// and under its limit, so two concurrent redemptions cannot both take the
/// last slot.
pub fn try_increment_coupon_usage(conn: &Connection, code: &str) -> Result<bool, AppError> {
    let count = conn.execute(
        "UPDATE coupons SET usage_count = usage_count + 1
         WHERE code = ?1 AND status = 'active'
           AND (usage_limit IS NULL OR usage_count < usage_limit)",
        params![code],
    )?;
    Ok(count > 0)
}

pub fn insert_redemption(
    conn: &Connection,
    code: &str,
    user_id: &str,
    booking_id: &str,
    now: &NaiveDateTime,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT INTO coupon_redemptions (coupon_code, user_id, booking_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![code, user_id, booking_id, ts(now)],
    )?;
    Ok(())
}

pub fn count_redemptions_for_user(
    conn: &Connection,
    code: &str,
    user_id: &str,
) -> Result<i64, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM coupon_redemptions WHERE coupon_code = ?1 AND user_id = ?2",
        params![code, user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}
