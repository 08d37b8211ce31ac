//! HTTP twins of the socket chat operations, kept for clients that are
//! not on the socket channels. Mutations fan out through the registry
//! exactly like their socket counterparts, so live views stay current
//! regardless of which path performed the write.

use axum::{Json, extract::State, response::IntoResponse};
use tracing::warn;

use bazaar_types::api::{
    ChatCreateRequest, ChatSessionRequest, MessageCreateRequest, MessageDeleteRequest,
    MessageUpdateRequest, SessionRequest,
};
use bazaar_types::events::ServerFrame;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// POST /chat/create — idempotent per (user_from, user_to, item_id).
pub async fn create_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let (user_from, user_to) = (req.user_from, req.user_to);
    let chat_id =
        run_blocking(move || db.create_chat(req.user_from, req.user_to, req.item_id, &req.v_key))
            .await?;

    // open chat-list views on both sides pick up the new chat
    state
        .registry
        .broadcast_chat_list_update(user_from, user_to)
        .await;

    Ok(Json(chat_id))
}

/// POST /chat/delete — participant only; both former participants'
/// list views are refreshed.
pub async fn delete_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let chat = run_blocking(move || db.delete_chat(req.chat_id, req.user_id, &req.v_key)).await?;

    state
        .registry
        .broadcast_chat_list_update(chat.user_from, chat.user_to)
        .await;

    Ok(Json(true))
}

/// POST /chat — one chat, participant only.
pub async fn get_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let chat = run_blocking(move || db.get_chat(req.chat_id, req.user_id, &req.v_key)).await?;
    Ok(Json(chat))
}

/// POST /user/chats — the caller's chat list.
pub async fn get_chats(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let chats = run_blocking(move || db.get_chats(req.user_id, &req.v_key)).await?;
    Ok(Json(chats))
}

/// POST /chat/messages — the full thread.
pub async fn get_messages(
    State(state): State<AppState>,
    Json(req): Json<ChatSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let messages =
        run_blocking(move || db.get_messages(req.chat_id, req.user_id, &req.v_key)).await?;
    Ok(Json(messages))
}

/// POST /message/create
pub async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<MessageCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let (chat_id, author_id, v_key) = (req.chat_id, req.author_id, req.v_key.clone());
    run_blocking(move || {
        db.create_message(req.chat_id, &req.message, &req.date, req.author_id, &req.v_key)
    })
    .await?;

    refresh_thread(&state, chat_id, author_id, &v_key).await;
    Ok(Json(true))
}

/// POST /message/update — author only.
pub async fn update_message(
    State(state): State<AppState>,
    Json(req): Json<MessageUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let (chat_id, author_id, v_key) = (req.chat_id, req.author_id, req.v_key.clone());
    run_blocking(move || db.update_message(req.message_id, &req.message, req.author_id, &req.v_key))
        .await?;

    refresh_thread(&state, chat_id, author_id, &v_key).await;
    Ok(Json(true))
}

/// POST /message/delete — author only.
pub async fn delete_message(
    State(state): State<AppState>,
    Json(req): Json<MessageDeleteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let (chat_id, author_id, v_key) = (req.chat_id, req.author_id, req.v_key.clone());
    run_blocking(move || db.delete_message(req.message_id, req.author_id, &req.v_key)).await?;

    refresh_thread(&state, chat_id, author_id, &v_key).await;
    Ok(Json(true))
}

/// Recompute the thread and push it to every live message session of
/// both participants, mirroring the socket path.
async fn refresh_thread(state: &AppState, chat_id: i64, user_id: i64, v_key: &str) {
    let db = state.db.clone();
    let key = v_key.to_string();
    let messages =
        match tokio::task::spawn_blocking(move || db.get_messages(chat_id, user_id, &key)).await {
            Ok(Ok(messages)) => messages,
            Ok(Err(e)) => {
                warn!("thread refresh for chat {} failed: {}", chat_id, e);
                return;
            }
            Err(e) => {
                warn!("spawn_blocking join error: {}", e);
                return;
            }
        };

    state
        .registry
        .broadcast_to_participants(chat_id, user_id, v_key, ServerFrame::Messages { messages })
        .await;
}
