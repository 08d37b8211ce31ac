use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use bazaar_api::auth::{self, AppState, AppStateInner};
use bazaar_api::images::{self, ImageUploader};
use bazaar_api::mailer::Mailer;
use bazaar_api::{admin, chats, items, reports, users};
use bazaar_gateway::connection;
use bazaar_gateway::registry::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let host = std::env::var("BAZAAR_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("BAZAAR_PORT")
        .unwrap_or_else(|_| "8000".into())
        .parse()?;
    let db_path = std::env::var("BAZAAR_DB_PATH").unwrap_or_else(|_| "bazaar.db".into());
    let admin_password =
        std::env::var("BAZAAR_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".into());
    let mail_api_url = std::env::var("BAZAAR_MAIL_API_URL").ok();
    let mail_api_key = std::env::var("BAZAAR_MAIL_API_KEY").unwrap_or_default();
    let mail_from = std::env::var("BAZAAR_MAIL_FROM")
        .unwrap_or_else(|_| "Garage sale <noreply@garage-sale.cz>".into());
    let imgur_client_id = std::env::var("BAZAAR_IMGUR_CLIENT_ID").ok();

    // Init database
    let db = Arc::new(bazaar_db::Database::open(&PathBuf::from(&db_path))?);
    auth::seed_admin_password(&db, &admin_password)?;

    // Shared state
    let registry = Registry::new(db.clone());
    let state: AppState = Arc::new(AppStateInner {
        db,
        registry,
        mailer: Mailer::new(mail_api_url, mail_api_key, mail_from),
        uploader: ImageUploader::new(imgur_client_id),
    });

    // Routes
    let api = Router::new()
        .route("/", get(root))
        // auth & registration
        .route("/register", post(auth::register))
        .route("/verify", post(auth::verify))
        .route("/resend", post(auth::resend))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        // users
        .route("/user", post(users::get_user))
        .route("/public/user/{user_id}", get(users::get_user_by_id))
        .route("/user/update", post(users::update_user))
        .route("/user/delete", post(users::delete_user))
        .route("/user/items", post(users::get_user_items))
        .route("/user/logout", post(auth::logout))
        .route("/user/unauthorized", post(users::unauthorized_user))
        // items
        .route("/items/{category_id}/category", get(items::get_items))
        .route("/items/{item_id}", get(items::get_item))
        .route("/item/create", post(items::create_item))
        .route("/item/update", post(items::update_item))
        .route("/item/delete", post(items::delete_item))
        .route("/item/action", post(reports::item_action))
        // chats (HTTP twins of the socket actions)
        .route("/chat/create", post(chats::create_chat))
        .route("/chat/delete", post(chats::delete_chat))
        .route("/chat", post(chats::get_chat))
        .route("/user/chats", post(chats::get_chats))
        .route("/chat/messages", post(chats::get_messages))
        .route("/message/create", post(chats::create_message))
        .route("/message/update", post(chats::update_message))
        .route("/message/delete", post(chats::delete_message))
        // images
        .route("/image/upload", post(images::upload_image))
        // reports & moderation
        .route("/report/create", post(reports::create_report))
        .route("/reports", post(reports::get_reports))
        .route("/report/resolve", post(reports::resolve_report))
        .route("/report/{report_id}", post(reports::get_report))
        // admin
        .route("/admin/users", post(admin::get_users))
        .route("/admin/ban", post(admin::ban_user))
        .route("/admin/unban", post(admin::unban_user))
        .route("/admin/promote", post(admin::promote_user))
        .route("/admin/demote", post(admin::demote_user))
        .route("/admin/email", post(admin::update_email))
        .route("/admin/stats", post(admin::get_stats))
        // live channels
        .route("/new/chat", get(chat_socket))
        .route("/new/chats", get(chat_list_socket))
        .with_state(state);

    let app = Router::new()
        .nest("/api/v1.0", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Bazaar server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Oops, you are not supposed to be here" }))
}

/// GET /api/v1.0/new/chat — message-session channel.
async fn chat_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| connection::handle_message_socket(socket, registry))
}

/// GET /api/v1.0/new/chats — chat-list-session channel.
async fn chat_list_socket(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| connection::handle_chat_list_socket(socket, registry))
}
