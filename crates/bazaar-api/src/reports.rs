use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use bazaar_types::api::{ItemActionRequest, ReportCreateRequest, ReportResolveRequest, SessionRequest};
use bazaar_types::models::Chat;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// POST /report/create — open to anyone, including anonymous visitors.
pub async fn create_report(
    State(state): State<AppState>,
    Json(req): Json<ReportCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.create_report(req.item_id, &req.reason)).await?;
    Ok(Json(true))
}

/// POST /reports — admin or moderator.
pub async fn get_reports(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let reports = run_blocking(move || db.get_reports(req.user_id, &req.v_key)).await?;
    Ok(Json(reports))
}

/// POST /report/{report_id} — admin or moderator.
pub async fn get_report(
    State(state): State<AppState>,
    Path(report_id): Path<i64>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let report = run_blocking(move || db.get_report(report_id, req.user_id, &req.v_key)).await?;
    Ok(Json(report))
}

/// POST /report/resolve — `delete` removes the reported item, `ban`
/// additionally bans its author. Either way the cascade can remove
/// chats, so affected chat-list views are refreshed.
pub async fn resolve_report(
    State(state): State<AppState>,
    Json(req): Json<ReportResolveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let affected = run_blocking(move || {
        db.resolve_report(
            req.report_id,
            req.user_id,
            &req.v_key,
            &req.action,
            req.ban_duration.unwrap_or(-1),
        )
    })
    .await?;

    notify_chat_removal(&state, affected).await;
    Ok(Json(true))
}

/// POST /item/action — direct moderator delete/ban without a report.
pub async fn item_action(
    State(state): State<AppState>,
    Json(req): Json<ItemActionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let affected =
        run_blocking(move || db.item_action(req.item_id, req.user_id, &req.v_key, &req.action))
            .await?;

    notify_chat_removal(&state, affected).await;
    Ok(Json(true))
}

async fn notify_chat_removal(state: &AppState, affected: Vec<Chat>) {
    for chat in affected {
        state
            .registry
            .broadcast_chat_list_update(chat.user_from, chat.user_to)
            .await;
    }
}
