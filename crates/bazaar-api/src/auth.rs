use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, response::IntoResponse};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256, Sha512};
use tracing::info;

use bazaar_db::Database;
use bazaar_gateway::registry::Registry;
use bazaar_types::api::{
    EmailRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, PasswordResetRequest,
    RegisterRequest, SessionRequest, VerifyRequest,
};

use crate::error::ApiError;
use crate::images::ImageUploader;
use crate::mailer::Mailer;
use crate::run_blocking;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub registry: Registry,
    pub mailer: Mailer,
    pub uploader: ImageUploader,
}

/// POST /register — start a registration. The account only exists once
/// the mailed code is verified.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "Username or password is empty".into(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    let code = generate_code();

    let db = state.db.clone();
    let (username, email, stored_code) = (req.username.clone(), req.email.clone(), code.clone());
    run_blocking(move || db.request_code(&username, &email, &password_hash, &stored_code)).await?;

    state.mailer.send_code(&req.email, &code).await?;

    Ok(Json(true))
}

/// POST /verify — exchange the mailed code for the account.
pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = run_blocking(move || db.verify_code(&req.email, &req.code)).await?;

    info!("user {} verified", user_id);
    Ok(Json(true))
}

/// POST /resend — refresh the pending code and mail it again.
pub async fn resend(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let code = generate_code();

    let db = state.db.clone();
    let (email, stored_code) = (req.email.clone(), code.clone());
    run_blocking(move || db.resend_code(&email, &stored_code)).await?;

    state.mailer.send_code(&req.email, &code).await?;

    Ok(Json(true))
}

/// POST /login — issue a fresh session key, replacing any previous one.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let email = req.email.clone();
    let user = run_blocking(move || db.get_user_auth(&email)).await?;

    if user.status != "active" {
        return Err(ApiError::Forbidden);
    }

    verify_password(&user.password_hash, &req.password)?;

    let vkey = generate_vkey();
    let db = state.db.clone();
    let (user_id, stored) = (user.id, vkey.clone());
    run_blocking(move || db.insert_validation_key(user_id, &stored)).await?;

    info!("user {} logged in", user.id);
    Ok(Json(LoginResponse {
        user_id: user.id,
        v_key: vkey,
    }))
}

/// POST /user/logout — revoke the presented key.
pub async fn logout(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    run_blocking(move || db.logout_user(req.user_id, &req.v_key)).await?;
    Ok(Json(true))
}

/// POST /forgot-password — mail a reset link, valid for fifteen
/// minutes.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.email.is_empty() {
        return Err(ApiError::BadRequest("Empty email".into()));
    }

    let token = generate_reset_token();
    let db = state.db.clone();
    let (email, stored) = (req.email.clone(), token.clone());
    run_blocking(move || db.store_reset_token(&email, &stored)).await?;

    let origin = req.origin.as_deref().unwrap_or_default();
    let link = format!("{}/reset-password/?token={}", origin, token);
    state.mailer.send_password_reset(&req.email, &link).await?;

    Ok(Json(true))
}

/// POST /reset-password — consume the link token and set the new
/// password.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.password.is_empty() {
        return Err(ApiError::BadRequest("Empty password".into()));
    }

    let password_hash = hash_password(&req.password)?;
    let db = state.db.clone();
    run_blocking(move || db.reset_password(&req.token, &password_hash)).await?;

    Ok(Json(true))
}

/// Give the seeded admin account its password on first boot.
pub fn seed_admin_password(db: &Database, password: &str) -> Result<(), ApiError> {
    let hash = hash_password(password)?;
    db.set_admin_password(&hash).map_err(ApiError::from)
}

// -- Credential primitives --

pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ApiError::Internal)
}

pub(crate) fn verify_password(hash: &str, password: &str) -> Result<(), ApiError> {
    let parsed = PasswordHash::new(hash).map_err(|_| ApiError::Internal)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::Unauthorized)
}

/// Opaque session key: 128 hex chars from hashing 256 random
/// alphanumeric bytes.
pub(crate) fn generate_vkey() -> String {
    hex::encode(Sha512::digest(random_alphanumeric(256).as_bytes()))
}

/// Six-character one-time registration code.
pub(crate) fn generate_code() -> String {
    random_alphanumeric(6)
}

pub(crate) fn generate_reset_token() -> String {
    hex::encode(Sha256::digest(random_alphanumeric(64).as_bytes()))
}

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse").is_ok());
        assert!(verify_password(&hash, "wrong").is_err());
    }

    #[test]
    fn vkeys_are_long_and_unique() {
        let a = generate_vkey();
        let b = generate_vkey();
        assert_eq!(a.len(), 128);
        assert_ne!(a, b);
    }

    #[test]
    fn codes_are_six_alphanumeric_chars() {
        let code = generate_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
