//! User accounts: login lookup, profiles, account deletion, visit
//! counter.

use bazaar_types::models::{Item, Profile, PublicUser};

use crate::models::UserAuthRow;
use crate::sessions::check_validation_key;
use crate::{Database, OptionalExt, StoreError, StoreResult, log_error, now_str};

impl Database {
    /// Login lookup by email — or by username for the seeded `admin`
    /// account. Bans whose duration has elapsed are lifted here, the
    /// first time the account is seen afterwards.
    pub fn get_user_auth(&self, email: &str) -> StoreResult<UserAuthRow> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET status = 'active', ban_duration = -1, banned_at = NULL
                 WHERE status = 'banned' AND ban_duration > 0
                   AND datetime(banned_at, '+' || ban_duration || ' hours') <= datetime(?1)",
                [now_str()],
            )?;

            let sql = if email == "admin" {
                "SELECT id, username, password_hash, status FROM users WHERE username = ?1"
            } else {
                "SELECT id, username, password_hash, status FROM users WHERE email = ?1"
            };

            conn.query_row(sql, [email], |row| {
                Ok(UserAuthRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    status: row.get(3)?,
                })
            })
            .optional()?
            .ok_or_else(|| {
                log_error(conn, "User not found");
                StoreError::NotFound
            })
        })
    }

    /// Set the seeded admin account's password hash if it has none yet.
    pub fn set_admin_password(&self, password_hash: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password_hash = ?1 WHERE username = 'admin' AND password_hash = ''",
                [password_hash],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, user_id: i64, vkey: &str) -> StoreResult<Profile> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;

            conn.query_row(
                "SELECT id, username, name, surname, email, phone, address, date_of_birth, role
                 FROM users WHERE id = ?1",
                [user_id],
                |row| {
                    Ok(Profile {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        name: row.get(2)?,
                        surname: row.get(3)?,
                        email: row.get(4)?,
                        phone: row.get(5)?,
                        address: row.get(6)?,
                        date_of_birth: row.get(7)?,
                        role: row.get(8)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
    }

    /// Public view of any user, no credentials required.
    pub fn get_public_user(&self, user_id: i64) -> StoreResult<PublicUser> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT username FROM users WHERE id = ?1",
                [user_id],
                |row| Ok(PublicUser { username: row.get(0)? }),
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
    }

    pub fn update_profile(
        &self,
        user_id: i64,
        vkey: &str,
        name: Option<&str>,
        surname: Option<&str>,
        phone: Option<&str>,
        address: Option<&str>,
        date_of_birth: Option<&str>,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;

            conn.execute(
                "UPDATE users SET
                    name = COALESCE(?1, name),
                    surname = COALESCE(?2, surname),
                    phone = COALESCE(?3, phone),
                    address = COALESCE(?4, address),
                    date_of_birth = COALESCE(?5, date_of_birth)
                 WHERE id = ?6",
                (name, surname, phone, address, date_of_birth, user_id),
            )?;
            Ok(())
        })
    }

    /// Delete the account. Foreign-key cascades remove the user's items,
    /// every chat they participate in, those chats' messages and their
    /// session keys.
    pub fn delete_user(&self, user_id: i64, vkey: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;

            conn.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
            Ok(())
        })
    }

    pub fn get_user_items(&self, user_id: i64, vkey: &str) -> StoreResult<Vec<Item>> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;
            crate::items::query_items_by_author(conn, user_id)
        })
    }

    /// Count an anonymous visit for the admin dashboard.
    pub fn track_visit(&self) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO visits DEFAULT VALUES", [])?;
            Ok(conn.last_insert_rowid())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{seed_item, seed_user};
    use crate::{Database, StoreError};

    #[test]
    fn profile_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let uid = seed_user(&db, "ana", "ana@example.com");
        db.insert_validation_key(uid, "k").unwrap();

        db.update_profile(uid, "k", Some("Ana"), None, Some("123456"), None, None)
            .unwrap();

        let profile = db.get_profile(uid, "k").unwrap();
        assert_eq!(profile.name.as_deref(), Some("Ana"));
        assert_eq!(profile.phone.as_deref(), Some("123456"));
        assert_eq!(profile.role, "user");
    }

    #[test]
    fn public_lookup_needs_no_credentials() {
        let db = Database::open_in_memory().unwrap();
        let uid = seed_user(&db, "ana", "ana@example.com");

        assert_eq!(db.get_public_user(uid).unwrap().username, "ana");
        assert!(matches!(
            db.get_public_user(9999),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn deleting_a_user_cascades() {
        let db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "seller", "s@example.com");
        let buyer = seed_user(&db, "buyer", "b@example.com");
        let item = seed_item(&db, seller, "bike");
        db.insert_validation_key(seller, "sk").unwrap();
        db.insert_validation_key(buyer, "bk").unwrap();

        let chat = db.create_chat(buyer, seller, item, "bk").unwrap();
        db.create_message(chat, "hi", "2024-11-02 10:00:00", buyer, "bk")
            .unwrap();

        db.delete_user(seller, "sk").unwrap();

        // the seller's items, the chat over them and its messages are gone
        assert!(matches!(db.get_item(item), Err(StoreError::NotFound)));
        assert!(matches!(
            db.get_chat(chat, buyer, "bk"),
            Err(StoreError::NotFound)
        ));
        assert!(db.get_messages(chat, buyer, "bk").unwrap().is_empty());
        // and the seller's key no longer validates
        assert!(db.validate_session(seller, "sk").is_err());
    }

    #[test]
    fn visits_are_counted() {
        let db = Database::open_in_memory().unwrap();
        db.track_visit().unwrap();
        db.track_visit().unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 2);
    }
}
