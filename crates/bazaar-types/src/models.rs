use serde::{Deserialize, Serialize};

/// A chat between two users about one item. Created once per unique
/// (user_from, user_to, item_id) triple; re-requesting returns the
/// existing id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: i64,
    pub user_from: i64,
    pub user_to: i64,
    pub item_id: i64,
}

impl Chat {
    /// Whether `user_id` is one of the two participants.
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.user_from == user_id || self.user_to == user_id
    }
}

/// A single chat message. `user_from` is the author; `date` is the
/// client-supplied timestamp string carried through unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat_id: i64,
    pub user_from: i64,
    pub message: String,
    pub date: String,
}

/// A marketplace listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub size: Option<String>,
    #[serde(rename = "categoryId")]
    pub category_id: String,
    #[serde(rename = "conditionId")]
    pub condition_id: String,
    pub image_path: String,
    pub author_id: i64,
}

/// A user's own profile, as returned to the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<String>,
    pub role: String,
}

/// The publicly visible part of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub username: String,
}

/// A user row as shown on the admin page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub banned_at: Option<String>,
    pub ban_duration: i64,
}

/// A report filed against an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub time: String,
    pub reason: String,
    pub item_id: i64,
}

/// Site-wide counters for the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub users: i64,
    pub items: i64,
    pub visitors: i64,
    pub visitors_day: i64,
    pub errors: i64,
}
