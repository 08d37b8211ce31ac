pub mod admin;
pub mod auth;
pub mod chats;
pub mod error;
pub mod images;
pub mod items;
pub mod mailer;
pub mod reports;
pub mod users;

use bazaar_db::StoreResult;
use tracing::error;

use crate::error::ApiError;

/// Run a blocking store call off the async runtime and map both the
/// join failure and the store error into an API error.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
