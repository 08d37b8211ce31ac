pub mod chats;
pub mod error;
pub mod items;
pub mod migrations;
pub mod models;
pub mod moderation;
pub mod sessions;
pub mod users;

use std::path::Path;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tracing::info;

pub use error::{StoreError, StoreResult};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, &path.display().to_string())
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, ":memory:")
    }

    fn init(conn: Connection, label: &str) -> anyhow::Result<Self> {
        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", label);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Internal("DB lock poisoned".into()))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Internal("DB lock poisoned".into()))?;
        f(&mut conn)
    }

    /// Append to the persistent error log. Surfaced in admin stats; a
    /// failure to log is itself only traced.
    pub fn log_error(&self, message: &str) {
        let _ = self.with_conn(|conn| {
            log_error(conn, message);
            Ok(())
        });
    }
}

/// Variant used inside query closures that already hold the connection.
pub(crate) fn log_error(conn: &Connection, message: &str) {
    if let Err(e) = conn.execute("INSERT INTO errors (message) VALUES (?1)", [message]) {
        tracing::warn!("error log insert failed: {}", e);
    }
}

/// Timestamps are stored as UTC `YYYY-MM-DD HH:MM:SS` strings, the same
/// format SQLite's own datetime('now') produces. String comparison on
/// them is chronological.
pub(crate) fn now_str() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) fn now_plus(d: Duration) -> String {
    (Utc::now() + d).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Database;

    /// Insert a verified user directly, bypassing the registration flow.
    pub fn seed_user(db: &Database, username: &str, email: &str) -> i64 {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password_hash, email) VALUES (?1, ?2, ?3)",
                (username, "x", email),
            )?;
            Ok(conn.last_insert_rowid())
        })
        .unwrap()
    }

    /// Insert an item owned by `author_id`.
    pub fn seed_item(db: &Database, author_id: i64, name: &str) -> i64 {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO items (name, price, category_id, condition_id, image_path, author_id)
                 VALUES (?1, 10.0, 'cat', 'new', 'img', ?2)",
                (name, author_id),
            )?;
            Ok(conn.last_insert_rowid())
        })
        .unwrap()
    }

    /// Plant a session key with a chosen expiry, for expiry tests.
    pub fn seed_key(db: &Database, user_id: i64, vkey: &str, expires_at: &str) {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO validation_keys (user_id, vkey, expires_at) VALUES (?1, ?2, ?3)",
                (user_id, vkey, expires_at),
            )?;
            Ok(())
        })
        .unwrap();
    }
}
