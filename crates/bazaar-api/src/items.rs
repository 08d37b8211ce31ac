use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use bazaar_types::api::{ItemCreateRequest, ItemDeleteRequest, ItemUpdateRequest};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::run_blocking;

/// GET /items/{category_id}/category — browse a category, public.
pub async fn get_items(
    State(state): State<AppState>,
    Path(category_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let items = run_blocking(move || db.get_items(&category_id)).await?;
    Ok(Json(items))
}

/// GET /items/{item_id} — one listing, public.
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let item = run_blocking(move || db.get_item(item_id)).await?;
    Ok(Json(item))
}

/// POST /item/create
pub async fn create_item(
    State(state): State<AppState>,
    Json(req): Json<ItemCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let item = run_blocking(move || {
        let id = db.insert_item(
            &req.name,
            req.description.as_deref(),
            req.price,
            req.size.as_deref(),
            &req.category_id,
            &req.condition_id,
            &req.image_path,
            req.author_id,
            &req.v_key,
        )?;
        db.get_item(id)
    })
    .await?;
    Ok(Json(item))
}

/// POST /item/update — author only.
pub async fn update_item(
    State(state): State<AppState>,
    Json(req): Json<ItemUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || {
        db.update_item(
            req.item_id,
            req.author_id,
            &req.v_key,
            req.name.as_deref(),
            req.description.as_deref(),
            req.price,
            req.size.as_deref(),
            req.category_id.as_deref(),
            req.condition_id.as_deref(),
            req.image_path.as_deref(),
        )
    })
    .await?;
    Ok(Json(true))
}

/// POST /item/delete — author only. Removing a listing removes its
/// chats, so every affected participant's open chat-list view is
/// refreshed.
pub async fn delete_item(
    State(state): State<AppState>,
    Json(req): Json<ItemDeleteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let affected = run_blocking(move || db.delete_item(req.item_id, req.author_id, &req.v_key))
        .await?;

    for chat in affected {
        state
            .registry
            .broadcast_chat_list_update(chat.user_from, chat.user_to)
            .await;
    }

    Ok(Json(json!({ "message": "Item deleted" })))
}
