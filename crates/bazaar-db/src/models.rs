/// Row types private to the store. Public-facing models live in
/// bazaar-types; these carry the columns the API must never expose.

pub struct UserAuthRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub status: String,
}

pub struct PendingCodeRow {
    pub email: String,
    pub username: String,
    pub password_hash: String,
}
