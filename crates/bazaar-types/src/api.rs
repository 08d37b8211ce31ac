use serde::{Deserialize, Serialize};

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
    /// Frontend origin the reset link should point back to.
    pub origin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub token: String,
    pub password: String,
}

// -- Sessions --

/// The credential pair every privileged request carries.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub user_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
}

/// Credential pair plus a chat scope.
#[derive(Debug, Deserialize)]
pub struct ChatSessionRequest {
    pub user_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    pub chat_id: i64,
}

// -- Users --

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub user_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
}

// -- Items --

#[derive(Debug, Deserialize)]
pub struct ItemCreateRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub size: Option<String>,
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    #[serde(rename = "categoryId")]
    pub category_id: String,
    pub image_path: String,
    pub author_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ItemUpdateRequest {
    pub item_id: i64,
    pub author_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub size: Option<String>,
    #[serde(rename = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(rename = "categoryId")]
    pub category_id: Option<String>,
    pub image_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemDeleteRequest {
    pub item_id: i64,
    pub author_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
}

// -- Chats & messages (HTTP twins of the socket actions) --

#[derive(Debug, Deserialize)]
pub struct ChatCreateRequest {
    pub user_from: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    pub user_to: i64,
    pub item_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct MessageCreateRequest {
    pub chat_id: i64,
    pub message: String,
    pub date: String,
    pub author_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageUpdateRequest {
    pub chat_id: i64,
    pub message_id: i64,
    pub message: String,
    pub author_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageDeleteRequest {
    pub chat_id: i64,
    pub message_id: i64,
    pub author_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
}

// -- Reports & moderation --

#[derive(Debug, Deserialize)]
pub struct ReportCreateRequest {
    pub item_id: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportResolveRequest {
    pub report_id: i64,
    pub user_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    /// `delete` removes the item, `ban` additionally bans its author.
    pub action: String,
    pub ban_duration: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ItemActionRequest {
    pub item_id: i64,
    pub user_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    pub action: String,
}

// -- Admin --

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub admin_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    pub user_id: i64,
    /// Hours; -1 means indefinite.
    pub duration: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdminUserRequest {
    pub admin_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct EmailUpdateRequest {
    pub admin_id: i64,
    #[serde(rename = "vKey")]
    pub v_key: String,
    pub user_id: i64,
    pub email: String,
}

// -- Images --

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}
