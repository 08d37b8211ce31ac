use axum::{Json, extract::State, response::IntoResponse};

use bazaar_types::api::{AdminUserRequest, BanRequest, EmailUpdateRequest, SessionRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// POST /admin/users — every non-admin account.
pub async fn get_users(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let users = run_blocking(move || db.get_users(req.user_id, &req.v_key)).await?;
    Ok(Json(users))
}

/// POST /admin/ban — bans the user and revokes their session keys;
/// their live socket sessions fail on the next action.
pub async fn ban_user(
    State(state): State<AppState>,
    Json(req): Json<BanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.ban_user(req.admin_id, &req.v_key, req.user_id, req.duration)).await?;
    Ok(Json(true))
}

/// POST /admin/unban
pub async fn unban_user(
    State(state): State<AppState>,
    Json(req): Json<AdminUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.unban_user(req.admin_id, &req.v_key, req.user_id)).await?;
    Ok(Json(true))
}

/// POST /admin/promote — grant the moderator role.
pub async fn promote_user(
    State(state): State<AppState>,
    Json(req): Json<AdminUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.promote_user(req.admin_id, &req.v_key, req.user_id)).await?;
    Ok(Json(true))
}

/// POST /admin/demote
pub async fn demote_user(
    State(state): State<AppState>,
    Json(req): Json<AdminUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.demote_user(req.admin_id, &req.v_key, req.user_id)).await?;
    Ok(Json(true))
}

/// POST /admin/email — correct a user's email address.
pub async fn update_email(
    State(state): State<AppState>,
    Json(req): Json<EmailUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.update_email(req.admin_id, &req.v_key, req.user_id, &req.email))
        .await?;
    Ok(Json(true))
}

/// POST /admin/stats — dashboard counters.
pub async fn get_stats(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let stats = run_blocking(move || db.get_stats(req.user_id, &req.v_key)).await?;
    Ok(Json(stats))
}
