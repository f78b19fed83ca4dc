use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    /// Uppercase-normalized code, unique.
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub valid_from: NaiveDateTime,
    pub valid_until: NaiveDateTime,
    pub usage_limit: Option<i64>,
    pub per_user_limit: Option<i64>,
    /// None means the coupon applies to every service.
    pub services: Option<Vec<String>>,
    pub usage_count: i64,
    pub status: CouponStatus,
    pub created_at: NaiveDateTime,
}

impl Coupon {
    /// Status as a function of stored fields plus the clock. Persisted
    /// back lazily on read/redeem paths; there is no background sweep.
    pub fn effective_status(&self, now: NaiveDateTime) -> CouponStatus {
        if self.status == CouponStatus::Active && now > self.valid_until {
            CouponStatus::Expired
        } else {
            self.status
        }
    }

    pub fn applies_to(&self, service: &str) -> bool {
        match &self.services {
            Some(scope) => scope.iter().any(|s| s == service),
            None => true,
        }
    }

    /// Discount for a given order amount, capped at the amount itself and
    /// rounded to two fractional digits.
    pub fn discount_for(&self, amount: Decimal) -> Decimal {
        let raw = match self.discount_type {
            DiscountType::Percentage => amount * self.value / Decimal::from(100),
            DiscountType::Fixed => self.value,
        };
        crate::models::money(raw.min(amount))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "fixed" => DiscountType::Fixed,
            _ => DiscountType::Percentage,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CouponStatus {
    Active,
    Inactive,
    Expired,
}

impl CouponStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponStatus::Active => "active",
            CouponStatus::Inactive => "inactive",
            CouponStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => CouponStatus::Inactive,
            "expired" => CouponStatus::Expired,
            _ => CouponStatus::Active,
        }
    }
}
