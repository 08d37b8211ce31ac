use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use bazaar_types::api::{ProfileUpdateRequest, SessionRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// POST /user — the caller's own profile.
pub async fn get_user(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let profile = run_blocking(move || db.get_profile(req.user_id, &req.v_key)).await?;
    Ok(Json(profile))
}

/// GET /public/user/{user_id} — username only, no credentials.
pub async fn get_user_by_id(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user = run_blocking(move || db.get_public_user(user_id)).await?;
    Ok(Json(user))
}

/// POST /user/update
pub async fn update_user(
    State(state): State<AppState>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || {
        db.update_profile(
            req.user_id,
            &req.v_key,
            req.name.as_deref(),
            req.surname.as_deref(),
            req.phone.as_deref(),
            req.address.as_deref(),
            req.date_of_birth.as_deref(),
        )
    })
    .await?;
    Ok(Json(true))
}

/// POST /user/delete — removes the account and, by cascade, its items,
/// chats, messages and session keys.
pub async fn delete_user(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.delete_user(req.user_id, &req.v_key)).await?;
    Ok(Json(true))
}

/// POST /user/items — the caller's own listings.
pub async fn get_user_items(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let items = run_blocking(move || db.get_user_items(req.user_id, &req.v_key)).await?;
    Ok(Json(items))
}

/// POST /user/unauthorized — anonymous visit counter for the admin
/// dashboard.
pub async fn unauthorized_user(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.track_visit()).await?;
    Ok(Json(true))
}
