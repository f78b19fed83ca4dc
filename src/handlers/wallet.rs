use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::services::wallet;
use crate::state::AppState;

#[derive(Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: Decimal,
}

// GET /api/wallet/:user_id/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, AppError> {
    let db = state.db.lock().unwrap();
    queries::get_user(&db, &user_id)?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;

    let balance = wallet::compute_balance(&db, &user_id)?;
    Ok(Json(BalanceResponse { user_id, balance }))
}

#[derive(Deserialize)]
pub struct TransactionsQuery {
    pub limit: Option<i64>,
}

// GET /api/wallet/:user_id/transactions
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<crate::models::Transaction>>, AppError> {
    let limit = query.limit.unwrap_or(50);

    let db = state.db.lock().unwrap();
    let txs = queries::list_transactions_for_user(&db, &user_id, limit)?;
    Ok(Json(txs))
}

#[derive(Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub bank_details: String,
}

// POST /api/wallet/:user_id/withdrawals
pub async fn request_withdrawal(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<crate::models::Transaction>), AppError> {
    if req.bank_details.trim().is_empty() {
        return Err(AppError::Validation(
            "bank_details must not be empty".to_string(),
        ));
    }

    let db = state.db.lock().unwrap();
    let tx = wallet::request_withdrawal(&db, &user_id, req.amount, req.bank_details)?;
    Ok((StatusCode::CREATED, Json(tx)))
}
