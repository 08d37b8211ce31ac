use axum::{Json, body::Bytes, extract::State, response::IntoResponse};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;
use tracing::error;

use bazaar_types::api::UploadResponse;

use crate::auth::AppState;
use crate::error::ApiError;

/// 10 MB upload limit for listing photos
const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Imgur-backed image hosting: the server never stores image bytes,
/// only the hosted URL that ends up in `items.image_path`.
#[derive(Clone)]
pub struct ImageUploader {
    client: reqwest::Client,
    client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImgurResponse {
    data: ImgurData,
}

#[derive(Debug, Deserialize)]
struct ImgurData {
    link: String,
}

impl ImageUploader {
    pub fn new(client_id: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
        }
    }

    pub async fn upload(&self, image: &[u8]) -> Result<String, ApiError> {
        let Some(client_id) = &self.client_id else {
            error!("cannot upload image: no imgur client id configured");
            return Err(ApiError::Internal);
        };

        let response = self
            .client
            .post("https://api.imgur.com/3/image")
            .header("Authorization", format!("Client-ID {}", client_id))
            .form(&[("image", B64.encode(image))])
            .send()
            .await
            .map_err(|e| {
                error!("imgur request failed: {}", e);
                ApiError::Internal
            })?;

        if !response.status().is_success() {
            error!("imgur returned {}", response.status());
            return Err(ApiError::Internal);
        }

        let parsed: ImgurResponse = response.json().await.map_err(|e| {
            error!("imgur response unreadable: {}", e);
            ApiError::Internal
        })?;
        Ok(parsed.data.link)
    }
}

/// POST /image/upload — raw image bytes in, hosted URL out.
pub async fn upload_image(
    State(state): State<AppState>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("No image provided".into()));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::BadRequest("Image too large".into()));
    }

    let url = state.uploader.upload(&bytes).await?;
    Ok(Json(UploadResponse { url }))
}
