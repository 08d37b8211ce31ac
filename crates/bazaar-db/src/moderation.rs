//! Reports, moderator/admin actions and the admin dashboard counters.

use rusqlite::Connection;

use bazaar_types::models::{AdminUser, Chat, Report, Stats};

use crate::chats::query_chats_for_item;
use crate::sessions::check_validation_key;
use crate::{Database, OptionalExt, StoreError, StoreResult, log_error, now_str};

impl Database {
    /// File a report against an item. Open to anyone, including
    /// anonymous visitors.
    pub fn create_report(&self, item_id: i64, reason: &str) -> StoreResult<i64> {
        self.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT id FROM items WHERE id = ?1", [item_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_none() {
                log_error(conn, "Item not found");
                return Err(StoreError::NotFound);
            }

            conn.execute(
                "INSERT INTO reports (reason, item_id) VALUES (?1, ?2)",
                (reason, item_id),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_reports(&self, user_id: i64, vkey: &str) -> StoreResult<Vec<Report>> {
        self.with_conn(|conn| {
            check_staff(conn, user_id, vkey)?;

            let mut stmt =
                conn.prepare("SELECT id, time, reason, item_id FROM reports ORDER BY id")?;
            let rows = stmt
                .query_map([], row_to_report)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_report(&self, report_id: i64, user_id: i64, vkey: &str) -> StoreResult<Report> {
        self.with_conn(|conn| {
            check_staff(conn, user_id, vkey)?;

            conn.query_row(
                "SELECT id, time, reason, item_id FROM reports WHERE id = ?1",
                [report_id],
                row_to_report,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
    }

    /// Resolve a report: `delete` removes the reported item, `ban`
    /// additionally bans its author for `ban_duration` hours. Either way
    /// the report itself is consumed. Returns the chats removed by the
    /// item cascade so their participants can be notified.
    pub fn resolve_report(
        &self,
        report_id: i64,
        user_id: i64,
        vkey: &str,
        action: &str,
        ban_duration: i64,
    ) -> StoreResult<Vec<Chat>> {
        self.with_conn(|conn| {
            check_staff(conn, user_id, vkey)?;

            let item_id: Option<i64> = conn
                .query_row(
                    "SELECT item_id FROM reports WHERE id = ?1",
                    [report_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(item_id) = item_id else {
                log_error(conn, "Report not found");
                return Err(StoreError::NotFound);
            };

            let affected = match action {
                "delete" => remove_item(conn, item_id)?,
                "ban" => {
                    ban_item_author(conn, item_id, ban_duration)?;
                    remove_item(conn, item_id)?
                }
                other => {
                    return Err(StoreError::Invalid(format!("Unknown action: {}", other)));
                }
            };

            conn.execute("DELETE FROM reports WHERE id = ?1", [report_id])?;
            Ok(affected)
        })
    }

    /// Direct moderator action on an item without a report.
    pub fn item_action(
        &self,
        item_id: i64,
        user_id: i64,
        vkey: &str,
        action: &str,
    ) -> StoreResult<Vec<Chat>> {
        self.with_conn(|conn| {
            check_staff(conn, user_id, vkey)?;

            let exists: Option<i64> = conn
                .query_row("SELECT id FROM items WHERE id = ?1", [item_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_none() {
                log_error(conn, "Item not found");
                return Err(StoreError::NotFound);
            }

            match action {
                "delete" => remove_item(conn, item_id),
                "ban" => {
                    ban_item_author(conn, item_id, 1)?;
                    remove_item(conn, item_id)
                }
                other => Err(StoreError::Invalid(format!("Unknown action: {}", other))),
            }
        })
    }

    /// Ban a user for `duration` hours (-1 = indefinite) and revoke
    /// their session keys; live socket sessions observe the revocation
    /// on their next action.
    pub fn ban_user(
        &self,
        admin_id: i64,
        vkey: &str,
        user_id: i64,
        duration: i64,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_admin(conn, admin_id, vkey)?;

            conn.execute(
                "UPDATE users SET status = 'banned', ban_duration = ?1, banned_at = ?2 WHERE id = ?3",
                (duration, now_str(), user_id),
            )?;
            conn.execute("DELETE FROM validation_keys WHERE user_id = ?1", [user_id])?;
            Ok(())
        })
    }

    pub fn unban_user(&self, admin_id: i64, vkey: &str, user_id: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_admin(conn, admin_id, vkey)?;

            conn.execute(
                "UPDATE users SET status = 'active', ban_duration = -1, banned_at = NULL WHERE id = ?1",
                [user_id],
            )?;
            Ok(())
        })
    }

    pub fn promote_user(&self, admin_id: i64, vkey: &str, user_id: i64) -> StoreResult<()> {
        self.set_role(admin_id, vkey, user_id, "moderator")
    }

    pub fn demote_user(&self, admin_id: i64, vkey: &str, user_id: i64) -> StoreResult<()> {
        self.set_role(admin_id, vkey, user_id, "user")
    }

    fn set_role(&self, admin_id: i64, vkey: &str, user_id: i64, role: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_admin(conn, admin_id, vkey)?;

            conn.execute("UPDATE users SET role = ?1 WHERE id = ?2", (role, user_id))?;
            Ok(())
        })
    }

    pub fn update_email(
        &self,
        admin_id: i64,
        vkey: &str,
        user_id: i64,
        email: &str,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_admin(conn, admin_id, vkey)?;

            conn.execute("UPDATE users SET email = ?1 WHERE id = ?2", (email, user_id))?;
            Ok(())
        })
    }

    /// Every non-admin account, for the admin page.
    pub fn get_users(&self, admin_id: i64, vkey: &str) -> StoreResult<Vec<AdminUser>> {
        self.with_conn(|conn| {
            check_admin(conn, admin_id, vkey)?;

            let mut stmt = conn.prepare(
                "SELECT id, username, email, role, status, banned_at, ban_duration
                 FROM users WHERE role != 'admin' ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(AdminUser {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                        role: row.get(3)?,
                        status: row.get(4)?,
                        banned_at: row.get(5)?,
                        ban_duration: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_stats(&self, admin_id: i64, vkey: &str) -> StoreResult<Stats> {
        self.with_conn(|conn| {
            check_admin(conn, admin_id, vkey)?;

            let count = |sql: &str| -> StoreResult<i64> {
                Ok(conn.query_row(sql, [], |row| row.get(0))?)
            };

            Ok(Stats {
                users: count("SELECT COUNT(*) FROM users")?,
                items: count("SELECT COUNT(*) FROM items")?,
                visitors: count("SELECT COUNT(*) FROM visits")?,
                visitors_day: conn.query_row(
                    "SELECT COUNT(*) FROM visits WHERE time >= datetime(?1, '-1 day')",
                    [now_str()],
                    |row| row.get(0),
                )?,
                errors: count("SELECT COUNT(*) FROM errors")?,
            })
        })
    }
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: row.get(0)?,
        time: row.get(1)?,
        reason: row.get(2)?,
        item_id: row.get(3)?,
    })
}

fn user_role(conn: &Connection, user_id: i64) -> StoreResult<String> {
    conn.query_row("SELECT role FROM users WHERE id = ?1", [user_id], |row| {
        row.get(0)
    })
    .optional()?
    .ok_or(StoreError::Unauthorized)
}

fn check_admin(conn: &Connection, user_id: i64, vkey: &str) -> StoreResult<()> {
    check_validation_key(conn, user_id, vkey)?;
    if user_role(conn, user_id)? != "admin" {
        log_error(conn, "Unauthorized");
        return Err(StoreError::Unauthorized);
    }
    Ok(())
}

/// Admin or moderator.
fn check_staff(conn: &Connection, user_id: i64, vkey: &str) -> StoreResult<()> {
    check_validation_key(conn, user_id, vkey)?;
    match user_role(conn, user_id)?.as_str() {
        "admin" | "moderator" => Ok(()),
        _ => {
            log_error(conn, "Unauthorized");
            Err(StoreError::Unauthorized)
        }
    }
}

fn ban_item_author(conn: &Connection, item_id: i64, duration: i64) -> StoreResult<()> {
    conn.execute(
        "UPDATE users SET status = 'banned', ban_duration = ?1, banned_at = ?2
         WHERE id = (SELECT author_id FROM items WHERE id = ?3)",
        (duration, now_str(), item_id),
    )?;
    conn.execute(
        "DELETE FROM validation_keys
         WHERE user_id = (SELECT author_id FROM items WHERE id = ?1)",
        [item_id],
    )?;
    Ok(())
}

fn remove_item(conn: &Connection, item_id: i64) -> StoreResult<Vec<Chat>> {
    let affected = query_chats_for_item(conn, item_id)?;
    conn.execute("DELETE FROM items WHERE id = ?1", [item_id])?;
    Ok(affected)
}
