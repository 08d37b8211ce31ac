//! Session tokens (vKeys), one-time registration codes and password
//! reset links. Expiry is enforced here, never cached by callers; SQLite
//! has no scheduled jobs, so expired rows are filtered at validation
//! time and purged on the next write to their table.

use chrono::Duration;
use rusqlite::Connection;

use crate::models::PendingCodeRow;
use crate::{Database, OptionalExt, StoreError, StoreResult, log_error, now_plus, now_str};

/// Session tokens live for four hours from login.
const VKEY_TTL_HOURS: i64 = 4;
/// Pending registration codes live for one hour.
const CODE_TTL_HOURS: i64 = 1;
/// Password reset links live for fifteen minutes.
const RESET_TTL_MINUTES: i64 = 15;

impl Database {
    // -- Validation keys --

    /// Issue a session key for `user_id`, replacing any previous one.
    pub fn insert_validation_key(&self, user_id: i64, vkey: &str) -> StoreResult<()> {
        let expires_at = now_plus(Duration::hours(VKEY_TTL_HOURS));
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM validation_keys WHERE user_id = ?1 OR expires_at < ?2",
                (user_id, now_str()),
            )?;
            conn.execute(
                "INSERT INTO validation_keys (user_id, vkey, expires_at) VALUES (?1, ?2, ?3)",
                (user_id, vkey, expires_at),
            )?;
            Ok(())
        })
    }

    /// Check a (user_id, vKey) pair. Every privileged operation calls
    /// this; a token validates only while unexpired and matching its
    /// issuing user.
    pub fn validate_session(&self, user_id: i64, vkey: &str) -> StoreResult<()> {
        self.with_conn(|conn| check_validation_key(conn, user_id, vkey))
    }

    /// Remove the key pair on logout. Removing an already-absent key is
    /// not an error.
    pub fn logout_user(&self, user_id: i64, vkey: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM validation_keys WHERE user_id = ?1 AND vkey = ?2",
                (user_id, vkey),
            )?;
            Ok(())
        })
    }

    // -- Registration codes --

    /// Start a registration: store the pending account under a one-time
    /// code. Re-requesting replaces the previous pending entry.
    pub fn request_code(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        code: &str,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            let taken: Option<i64> = conn
                .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| {
                    row.get(0)
                })
                .optional()?;
            if taken.is_some() {
                log_error(conn, "Email already taken");
                return Err(StoreError::Conflict);
            }

            conn.execute(
                "DELETE FROM codes WHERE email = ?1 OR expires_at < ?2",
                (email, now_str()),
            )?;
            conn.execute(
                "INSERT INTO codes (code, email, expires_at, username, password_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    code,
                    email,
                    now_plus(Duration::hours(CODE_TTL_HOURS)),
                    username,
                    password_hash,
                ),
            )?;
            Ok(())
        })
    }

    /// Finish a registration: an unexpired (email, code) pair creates
    /// the account and consumes the code.
    pub fn verify_code(&self, email: &str, code: &str) -> StoreResult<i64> {
        self.with_conn(|conn| {
            let pending: Option<PendingCodeRow> = conn
                .query_row(
                    "SELECT email, username, password_hash FROM codes
                     WHERE email = ?1 AND code = ?2 AND expires_at >= ?3",
                    (email, code, now_str()),
                    |row| {
                        Ok(PendingCodeRow {
                            email: row.get(0)?,
                            username: row.get(1)?,
                            password_hash: row.get(2)?,
                        })
                    },
                )
                .optional()?;

            let Some(pending) = pending else {
                log_error(conn, "Invalid code");
                return Err(StoreError::NotFound);
            };

            conn.execute(
                "INSERT INTO users (username, password_hash, email) VALUES (?1, ?2, ?3)",
                (&pending.username, &pending.password_hash, &pending.email),
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict
                }
                other => other.into(),
            })?;
            let user_id = conn.last_insert_rowid();

            conn.execute("DELETE FROM codes WHERE email = ?1", [email])?;
            Ok(user_id)
        })
    }

    /// Replace the pending code for `email` with a fresh one. Fails if
    /// there is no pending registration to refresh.
    pub fn resend_code(&self, email: &str, code: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE codes SET code = ?1, expires_at = ?2 WHERE email = ?3",
                (code, now_plus(Duration::hours(CODE_TTL_HOURS)), email),
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
    }

    // -- Password reset links --

    /// Store a reset token for an existing account, replacing any
    /// previous one.
    pub fn store_reset_token(&self, email: &str, token: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let known: Option<i64> = conn
                .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| {
                    row.get(0)
                })
                .optional()?;
            if known.is_none() {
                log_error(conn, "User not found");
                return Err(StoreError::NotFound);
            }

            conn.execute(
                "DELETE FROM reset_links WHERE email = ?1 OR expires_at < ?2",
                (email, now_str()),
            )?;
            conn.execute(
                "INSERT INTO reset_links (email, token, expires_at) VALUES (?1, ?2, ?3)",
                (
                    email,
                    token,
                    now_plus(Duration::minutes(RESET_TTL_MINUTES)),
                ),
            )?;
            Ok(())
        })
    }

    /// Resolve an unexpired reset token to its email.
    pub fn check_reset_token(&self, token: &str) -> StoreResult<String> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT email FROM reset_links WHERE token = ?1 AND expires_at >= ?2",
                (token, now_str()),
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
    }

    /// Consume a reset token and set the new password hash.
    pub fn reset_password(&self, token: &str, password_hash: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let email: Option<String> = conn
                .query_row(
                    "SELECT email FROM reset_links WHERE token = ?1 AND expires_at >= ?2",
                    (token, now_str()),
                    |row| row.get(0),
                )
                .optional()?;
            let Some(email) = email else {
                log_error(conn, "Invalid token");
                return Err(StoreError::NotFound);
            };

            conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE email = ?2",
                (password_hash, &email),
            )?;
            conn.execute("DELETE FROM reset_links WHERE email = ?1", [&email])?;
            Ok(())
        })
    }
}

/// Connection-level check used both by `validate_session` and by query
/// closures that already hold the lock. Logs rejections to the error
/// table like every other authorization failure.
pub(crate) fn check_validation_key(conn: &Connection, user_id: i64, vkey: &str) -> StoreResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM validation_keys
             WHERE user_id = ?1 AND vkey = ?2 AND expires_at >= ?3",
            (user_id, vkey, now_str()),
            |row| row.get(0),
        )
        .optional()?;

    if found.is_none() {
        log_error(conn, "Unauthorized");
        return Err(StoreError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::testutil::{seed_key, seed_user};
    use crate::{Database, StoreError};

    #[test]
    fn issued_key_validates_and_replaces_previous() {
        let db = Database::open_in_memory().unwrap();
        let uid = seed_user(&db, "ana", "ana@example.com");

        db.insert_validation_key(uid, "first").unwrap();
        assert!(db.validate_session(uid, "first").is_ok());

        db.insert_validation_key(uid, "second").unwrap();
        assert!(matches!(
            db.validate_session(uid, "first"),
            Err(StoreError::Unauthorized)
        ));
        assert!(db.validate_session(uid, "second").is_ok());
    }

    #[test]
    fn expired_key_never_validates() {
        let db = Database::open_in_memory().unwrap();
        let uid = seed_user(&db, "bob", "bob@example.com");
        seed_key(&db, uid, "stale", "2000-01-01 00:00:00");

        assert!(matches!(
            db.validate_session(uid, "stale"),
            Err(StoreError::Unauthorized)
        ));
    }

    #[test]
    fn key_is_bound_to_its_user() {
        let db = Database::open_in_memory().unwrap();
        let ana = seed_user(&db, "ana", "ana@example.com");
        let bob = seed_user(&db, "bob", "bob@example.com");

        db.insert_validation_key(ana, "anas-key").unwrap();
        assert!(matches!(
            db.validate_session(bob, "anas-key"),
            Err(StoreError::Unauthorized)
        ));
    }

    #[test]
    fn logout_revokes_the_key() {
        let db = Database::open_in_memory().unwrap();
        let uid = seed_user(&db, "ana", "ana@example.com");

        db.insert_validation_key(uid, "k").unwrap();
        db.logout_user(uid, "k").unwrap();
        assert!(db.validate_session(uid, "k").is_err());

        // logging out twice is a no-op
        db.logout_user(uid, "k").unwrap();
    }

    #[test]
    fn registration_code_roundtrip() {
        let db = Database::open_in_memory().unwrap();

        db.request_code("carol", "carol@example.com", "hash", "AB12CD")
            .unwrap();

        assert!(matches!(
            db.verify_code("carol@example.com", "WRONG!"),
            Err(StoreError::NotFound)
        ));

        let uid = db.verify_code("carol@example.com", "AB12CD").unwrap();
        assert!(uid > 0);

        // the code is consumed
        assert!(db.verify_code("carol@example.com", "AB12CD").is_err());
    }

    #[test]
    fn taken_email_rejects_registration() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "carol", "carol@example.com");

        assert!(matches!(
            db.request_code("other", "carol@example.com", "hash", "AB12CD"),
            Err(StoreError::Conflict)
        ));
    }

    #[test]
    fn reset_token_flow() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "dave", "dave@example.com");

        assert!(matches!(
            db.store_reset_token("ghost@example.com", "t0"),
            Err(StoreError::NotFound)
        ));

        db.store_reset_token("dave@example.com", "t1").unwrap();
        assert_eq!(db.check_reset_token("t1").unwrap(), "dave@example.com");

        db.reset_password("t1", "newhash").unwrap();
        // consumed
        assert!(db.check_reset_token("t1").is_err());
    }
}
