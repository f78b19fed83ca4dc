use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    /// Platform share of a completed booking, in percent.
    pub commission_rate: Decimal,
    /// Ledger account the commission share is credited to.
    pub platform_account: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "broheal.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            commission_rate: env::var("COMMISSION_RATE")
                .ok()
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or_else(|| Decimal::from(20)),
            platform_account: env::var("PLATFORM_ACCOUNT")
                .unwrap_or_else(|_| "platform".to_string()),
        }
    }
}
