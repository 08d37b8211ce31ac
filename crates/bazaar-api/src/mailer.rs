use serde_json::json;
use tracing::{error, warn};

use crate::error::ApiError;

/// Outbound mail via an HTTP relay. The relay endpoint and key come
/// from the environment; without them every send fails and the caller
/// reports a server error, same as a broken SMTP link would.
#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: String,
    from: String,
}

impl Mailer {
    pub fn new(api_url: Option<String>, api_key: String, from: String) -> Self {
        if api_url.is_none() {
            warn!("mail relay not configured; registration and reset mails will fail");
        }
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            from,
        }
    }

    pub async fn send_code(&self, to: &str, code: &str) -> Result<(), ApiError> {
        self.send(
            to,
            "Your verification code",
            &format!(
                "Welcome to the garage sale!\n\nYour verification code is: {}\n\nThe code expires in one hour.",
                code
            ),
        )
        .await
    }

    pub async fn send_password_reset(&self, to: &str, link: &str) -> Result<(), ApiError> {
        self.send(
            to,
            "Password reset",
            &format!(
                "A password reset was requested for your account.\n\nReset it here: {}\n\nThe link expires in fifteen minutes.",
                link
            ),
        )
        .await
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ApiError> {
        let Some(url) = &self.api_url else {
            error!("cannot send mail to {}: no relay configured", to);
            return Err(ApiError::Internal);
        };

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": to,
                "subject": subject,
                "text": body,
            }))
            .send()
            .await
            .map_err(|e| {
                error!("mail relay request failed: {}", e);
                ApiError::Internal
            })?;

        if !response.status().is_success() {
            error!("mail relay returned {}", response.status());
            return Err(ApiError::Internal);
        }
        Ok(())
    }
}
