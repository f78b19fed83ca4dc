use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use rust_decimal::Decimal;
use tower::ServiceExt;

use broheal::config::AppConfig;
use broheal::db;
use broheal::handlers;
use broheal::state::AppState;

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        commission_rate: Decimal::from(20),
        platform_account: "platform".to_string(),
    }
}

fn test_state() -> Arc<AppState> {
    let config = test_config();
    let conn = db::init_db(":memory:").unwrap();
    Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config,
    })
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
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
        .with_state(state)
}

async fn send(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = test_app(state.clone()).oneshot(request).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn create_user(state: &Arc<AppState>, name: &str, role: &str) -> String {
    let (status, json) = send(
        state,
        "POST",
        "/api/users",
        None,
        Some(serde_json::json!({
            "name": name,
            "phone": "+919812345678",
            "role": role,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["id"].as_str().unwrap().to_string()
}

async fn create_booking(
    state: &Arc<AppState>,
    customer_id: &str,
    therapist_id: &str,
    amount: &str,
    coupon_code: Option<&str>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "customer_id": customer_id,
        "therapist_id": therapist_id,
        "service": "deep_tissue",
        "scheduled_at": "2025-07-01 10:00:00",
        "amount": amount,
        "address": {"line": "12 MG Road, Bengaluru", "lat": 12.9716, "lng": 77.5946},
    });
    if let Some(code) = coupon_code {
        body["coupon_code"] = serde_json::json!(code);
    }

    let (status, json) = send(state, "POST", "/api/bookings", None, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "create booking failed: {json}");
    json
}

async fn set_status(
    state: &Arc<AppState>,
    booking_id: &str,
    actor_id: &str,
    target: &str,
    with_location: bool,
) -> (StatusCode, serde_json::Value) {
    let mut body = serde_json::json!({ "actor_id": actor_id, "status": target });
    if with_location {
        body["location"] = serde_json::json!({"lat": 12.9716, "lng": 77.5946, "speed": 8.3});
    }
    send(
        state,
        "POST",
        &format!("/api/bookings/{booking_id}/status"),
        None,
        Some(body),
    )
    .await
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let state = test_state();
    let (status, json) = send(&state, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

// ── Users ──

#[tokio::test]
async fn test_user_roundtrip() {
    let state = test_state();
    let id = create_user(&state, "Asha", "therapist").await;

    let (status, json) = send(&state, "GET", &format!("/api/users/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "Asha");
    assert_eq!(json["role"], "therapist");

    let (status, _) = send(&state, "GET", "/api/users/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Booking creation ──

#[tokio::test]
async fn test_booking_requires_known_parties() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;

    let (status, json) = send(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "customer_id": customer,
            "therapist_id": "missing",
            "service": "swedish",
            "scheduled_at": "2025-07-01 10:00:00",
            "amount": "900",
            "address": {"line": "12 MG Road"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "not_found");
}

#[tokio::test]
async fn test_booking_rejects_non_positive_amount() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;

    let (status, json) = send(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "customer_id": customer,
            "therapist_id": therapist,
            "service": "swedish",
            "scheduled_at": "2025-07-01 10:00:00",
            "amount": "0",
            "address": {"line": "12 MG Road"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation");
}

// ── Lifecycle over HTTP ──

#[tokio::test]
async fn test_full_booking_lifecycle_with_ledger() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;

    let booking = create_booking(&state, &customer, &therapist, "1500", None).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();
    assert_eq!(booking["status"], "booked");
    assert_eq!(booking["payment_status"], "pending");

    // Therapist heads out with a live position.
    let (status, json) = set_status(&state, &booking_id, &therapist, "on_the_way", true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "on_the_way");
    assert!(json["last_location"].is_object());

    let (status, trail) = send(
        &state,
        "GET",
        &format!("/api/bookings/{booking_id}/trail"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trail.as_array().unwrap().len(), 1);

    let (status, _) = set_status(&state, &booking_id, &therapist, "in_progress", false).await;
    assert_eq!(status, StatusCode::OK);

    // Completing before payment bounces with a machine-readable kind.
    let (status, json) = set_status(&state, &booking_id, &therapist, "completed", false).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json["kind"], "payment_required");

    let (status, json) = send(
        &state,
        "POST",
        &format!("/api/bookings/{booking_id}/payment"),
        None,
        Some(serde_json::json!({"status": "success"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["payment_status"], "success");

    let (status, json) = set_status(&state, &booking_id, &therapist, "completed", false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "completed");

    // Commission split: 20% of 1500 to the platform, the rest pending
    // in the therapist's wallet.
    let (_, txs) = send(
        &state,
        "GET",
        &format!("/api/wallet/{therapist}/transactions"),
        None,
        None,
    )
    .await;
    let txs = txs.as_array().unwrap().clone();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0]["tx_type"], "wallet_credit");
    assert_eq!(txs[0]["status"], "pending");
    assert_eq!(txs[0]["amount"], "1200.00");

    let (_, cuts) = send(
        &state,
        "GET",
        "/api/wallet/platform/transactions",
        None,
        None,
    )
    .await;
    let cuts = cuts.as_array().unwrap().clone();
    assert_eq!(cuts.len(), 1);
    assert_eq!(cuts[0]["tx_type"], "commission");
    assert_eq!(cuts[0]["amount"], "300.00");

    // Completing twice is the one duplicate that must fail.
    let (status, json) = set_status(&state, &booking_id, &therapist, "completed", false).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "invalid_transition");
}

#[tokio::test]
async fn test_duplicate_transition_is_noop() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;
    let booking = create_booking(&state, &customer, &therapist, "900", None).await;
    let booking_id = booking["id"].as_str().unwrap();

    let (status, _) = set_status(&state, booking_id, &therapist, "on_the_way", true).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = set_status(&state, booking_id, &therapist, "on_the_way", true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "on_the_way");

    // The duplicate request did not append a second trail point.
    let (_, trail) = send(
        &state,
        "GET",
        &format!("/api/bookings/{booking_id}/trail"),
        None,
        None,
    )
    .await;
    assert_eq!(trail.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_illegal_edge_rejected() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;
    let booking = create_booking(&state, &customer, &therapist, "900", None).await;
    let booking_id = booking["id"].as_str().unwrap();

    let (status, json) = set_status(&state, booking_id, &therapist, "in_progress", false).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "invalid_transition");
}

#[tokio::test]
async fn test_actor_roles_enforced() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;
    let booking = create_booking(&state, &customer, &therapist, "900", None).await;
    let booking_id = booking["id"].as_str().unwrap();

    // Customers cannot drive the forward path.
    let (status, json) = set_status(&state, booking_id, &customer, "on_the_way", true).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["kind"], "unauthorized");

    // Therapists cannot cancel; the customer can.
    let (status, _) = set_status(&state, booking_id, &therapist, "cancelled", false).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, json) = set_status(&state, booking_id, &customer, "cancelled", false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");
}

#[tokio::test]
async fn test_payment_cannot_be_captured_twice() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;
    let booking = create_booking(&state, &customer, &therapist, "900", None).await;
    let booking_id = booking["id"].as_str().unwrap();

    let uri = format!("/api/bookings/{booking_id}/payment");
    let (status, _) = send(
        &state,
        "POST",
        &uri,
        None,
        Some(serde_json::json!({"status": "success"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &state,
        "POST",
        &uri,
        None,
        Some(serde_json::json!({"status": "success"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "invalid_transition");
}

// ── Location ledger over HTTP ──

#[tokio::test]
async fn test_ping_rejected_outside_on_the_way() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;
    let booking = create_booking(&state, &customer, &therapist, "900", None).await;
    let booking_id = booking["id"].as_str().unwrap();

    let (status, json) = send(
        &state,
        "POST",
        &format!("/api/bookings/{booking_id}/location"),
        None,
        Some(serde_json::json!({"lat": 12.97, "lng": 77.59})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["kind"], "invalid_transition");
}

#[tokio::test]
async fn test_nearby_therapists_sorted_by_distance() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let near = create_user(&state, "Asha", "therapist").await;
    let far = create_user(&state, "Vikram", "therapist").await;

    for (therapist, lat, lng) in [(&near, 12.98, 77.60), (&far, 13.80, 78.50)] {
        let booking = create_booking(&state, &customer, therapist, "900", None).await;
        let booking_id = booking["id"].as_str().unwrap().to_string();
        let (status, _) = set_status(&state, &booking_id, therapist, "on_the_way", true).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &state,
            "POST",
            &format!("/api/bookings/{booking_id}/location"),
            None,
            Some(serde_json::json!({"lat": lat, "lng": lng})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, json) = send(
        &state,
        "GET",
        "/api/therapists/nearby?lat=12.9716&lng=77.5946&limit=5",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let results = json.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["therapist_id"].as_str().unwrap(), near);
    assert!(
        results[0]["distance_km"].as_f64().unwrap() < results[1]["distance_km"].as_f64().unwrap()
    );
}

// ── Wallet over HTTP ──

#[tokio::test]
async fn test_withdrawal_guard_over_http() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;

    let booking = create_booking(&state, &customer, &therapist, "1500", None).await;
    let booking_id = booking["id"].as_str().unwrap().to_string();

    set_status(&state, &booking_id, &therapist, "on_the_way", true).await;
    set_status(&state, &booking_id, &therapist, "in_progress", false).await;
    send(
        &state,
        "POST",
        &format!("/api/bookings/{booking_id}/payment"),
        None,
        Some(serde_json::json!({"status": "success"})),
    )
    .await;
    set_status(&state, &booking_id, &therapist, "completed", false).await;

    // Settle the pending wallet credit so funds become withdrawable.
    let (_, txs) = send(
        &state,
        "GET",
        &format!("/api/wallet/{therapist}/transactions"),
        None,
        None,
    )
    .await;
    let credit_id = txs[0]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/admin/transactions/{credit_id}/settle"),
        Some("test-token"),
        Some(serde_json::json!({"status": "success"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &state,
        "GET",
        &format!("/api/wallet/{therapist}/balance"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["balance"], "1200.00");

    // Overdraw bounces, a fitting request goes through, and the pending
    // withdrawal reserves the remainder.
    let uri = format!("/api/wallet/{therapist}/withdrawals");
    let (status, json) = send(
        &state,
        "POST",
        &uri,
        None,
        Some(serde_json::json!({"amount": "1200.01", "bank_details": "HDFC ****1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["kind"], "insufficient_funds");

    let (status, json) = send(
        &state,
        "POST",
        &uri,
        None,
        Some(serde_json::json!({"amount": "1000", "bank_details": "HDFC ****1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["status"], "pending");

    let (status, _) = send(
        &state,
        "POST",
        &uri,
        None,
        Some(serde_json::json!({"amount": "300", "bank_details": "HDFC ****1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(
        &state,
        "POST",
        &uri,
        None,
        Some(serde_json::json!({"amount": "200", "bank_details": "HDFC ****1234"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ── Coupons ──

#[tokio::test]
async fn test_admin_coupons_require_auth() {
    let state = test_state();

    let (status, _) = send(&state, "GET", "/api/admin/coupons", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &state,
        "GET",
        "/api/admin/coupons",
        Some("wrong-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_coupon_flow() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;

    let (status, json) = send(
        &state,
        "POST",
        "/api/admin/coupons",
        Some("test-token"),
        Some(serde_json::json!({
            "code": "welcome10",
            "discount_type": "percentage",
            "value": "10",
            "valid_from": "2025-01-01 00:00:00",
            "valid_until": "2030-12-31 23:59:59",
            "per_user_limit": 1,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["code"], "WELCOME10");

    // Preview does not consume usage.
    let (status, json) = send(
        &state,
        "POST",
        "/api/coupons/validate",
        None,
        Some(serde_json::json!({
            "code": "WELCOME10",
            "user_id": customer,
            "service": "deep_tissue",
            "amount": "1000",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["discount"], "100.00");
    assert_eq!(json["payable"], "900.00");

    // Redemption happens at booking time and stores the discounted amount.
    let booking = create_booking(&state, &customer, &therapist, "1000", Some("WELCOME10")).await;
    assert_eq!(booking["amount"], "900.00");
    assert_eq!(booking["coupon_code"], "WELCOME10");

    // Per-user limit: the same customer cannot redeem twice.
    let (status, json) = send(
        &state,
        "POST",
        "/api/bookings",
        None,
        Some(serde_json::json!({
            "customer_id": customer,
            "therapist_id": therapist,
            "service": "deep_tissue",
            "scheduled_at": "2025-07-02 10:00:00",
            "amount": "1000",
            "address": {"line": "12 MG Road"},
            "coupon_code": "WELCOME10",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation");

    // Deactivation is soft: the coupon stays listed but stops validating.
    let (status, _) = send(
        &state,
        "POST",
        "/api/admin/coupons/WELCOME10/deactivate",
        Some("test-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, coupons) = send(&state, "GET", "/api/admin/coupons", Some("test-token"), None).await;
    assert_eq!(coupons.as_array().unwrap().len(), 1);
    assert_eq!(coupons[0]["status"], "inactive");
}

// ── Admin bookings view ──

#[tokio::test]
async fn test_admin_bookings_listing() {
    let state = test_state();
    let customer = create_user(&state, "Ravi", "user").await;
    let therapist = create_user(&state, "Asha", "therapist").await;
    create_booking(&state, &customer, &therapist, "900", None).await;

    let (status, _) = send(&state, "GET", "/api/admin/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, json) = send(
        &state,
        "GET",
        "/api/admin/bookings",
        Some("test-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (status, json) = send(
        &state,
        "GET",
        "/api/admin/bookings?status=cancelled",
        Some("test-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}
