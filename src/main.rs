use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use broheal::config::AppConfig;
use broheal::db;
use broheal::handlers;
use broheal::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/users", post(handlers::users::create_user))
        .route("/api/users/:id", get(handlers::users::get_user))
        .route(
            "/api/bookings",
            post(handlers::bookings::create_booking).get(handlers::bookings::list_bookings),
        )
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/status",
            post(handlers::bookings::update_status),
        )
        .route(
            "/api/bookings/:id/payment",
            post(handlers::bookings::capture_payment),
        )
        .route(
            "/api/bookings/:id/location",
            post(handlers::tracking::record_ping),
        )
        .route("/api/bookings/:id/trail", get(handlers::tracking::get_trail))
        .route(
            "/api/therapists/nearby",
            get(handlers::tracking::nearby_therapists),
        )
        .route(
            "/api/coupons/validate",
            post(handlers::coupons::validate_coupon),
        )
        .route(
            "/api/wallet/:user_id/balance",
            get(handlers::wallet::get_balance),
        )
        .route(
            "/api/wallet/:user_id/transactions",
            get(handlers::wallet::list_transactions),
        )
        .route(
            "/api/wallet/:user_id/withdrawals",
            post(handlers::wallet::request_withdrawal),
        )
        .route(
            "/api/admin/coupons",
            post(handlers::admin::create_coupon).get(handlers::admin::list_coupons),
        )
        .route(
            "/api/admin/coupons/:code/deactivate",
            post(handlers::admin::deactivate_coupon),
        )
        .route(
            "/api/admin/transactions/:id/settle",
            post(handlers::admin::settle_transaction),
        )
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
