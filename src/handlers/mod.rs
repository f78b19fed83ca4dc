pub mod admin;
pub mod bookings;
pub mod coupons;
pub mod health;
pub mod tracking;
pub mod users;
pub mod wallet;

use chrono::NaiveDateTime;

use crate::errors::AppError;

pub(crate) fn parse_datetime(s: &str, field: &str) -> Result<NaiveDateTime, AppError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|_| AppError::Validation(format!("{field} must be YYYY-MM-DD HH:MM:SS")))
}
