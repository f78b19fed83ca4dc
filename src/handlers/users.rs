use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Role, User};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub phone: String,
    pub role: Role,
}

// POST /api/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }
    if req.phone.trim().is_empty() {
        return Err(AppError::Validation("phone must not be empty".to_string()));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        phone: req.phone.trim().to_string(),
        role: req.role,
        created_at: Utc::now().naive_utc(),
    };

    let db = state.db.lock().unwrap();
    queries::create_user(&db, &user)?;

    Ok((StatusCode::CREATED, Json(user)))
}

// GET /api/users/:id
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, AppError> {
    let db = state.db.lock().unwrap();
    let user =
        queries::get_user(&db, &id)?.ok_or_else(|| AppError::NotFound(format!("user {id}")))?;
    Ok(Json(user))
}
