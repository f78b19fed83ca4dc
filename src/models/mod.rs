pub mod booking;
pub mod coupon;
pub mod location;
pub mod transaction;
pub mod user;

use rust_decimal::Decimal;

/// Canonical money form: rupees with exactly two fractional digits, so
/// every stored and serialized amount reads the same way.
pub fn money(d: Decimal) -> Decimal {
    let mut d = d.round_dp(2);
    d.rescale(2);
    d
}

pub use booking::{Address, Booking, BookingStatus, LocationSnapshot, PaymentStatus};
pub use coupon::{Coupon, CouponStatus, DiscountType};
pub use location::{GeoPoint, LocationPoint, Telemetry, TherapistProximity};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use user::{Role, User};
