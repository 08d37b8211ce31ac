//! Chats and messages. Every operation revalidates the caller's session
//! key; mutations additionally check participation or authorship.

use rusqlite::Connection;

use bazaar_types::models::{Chat, Message};

use crate::sessions::check_validation_key;
use crate::{Database, OptionalExt, StoreError, StoreResult, log_error};

impl Database {
    /// Create a chat, or return the existing one for the same
    /// (user_from, user_to, item_id) triple.
    pub fn create_chat(
        &self,
        user_from: i64,
        user_to: i64,
        item_id: i64,
        vkey: &str,
    ) -> StoreResult<i64> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_from, vkey)?;

            let existing: Option<i64> = conn
                .query_row(
                    "SELECT chat_id FROM chats
                     WHERE user_from = ?1 AND user_to = ?2 AND item_id = ?3",
                    (user_from, user_to, item_id),
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(chat_id) = existing {
                return Ok(chat_id);
            }

            conn.execute(
                "INSERT INTO chats (user_from, user_to, item_id) VALUES (?1, ?2, ?3)",
                (user_from, user_to, item_id),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Fetch one chat; the caller must be a participant.
    pub fn get_chat(&self, chat_id: i64, user_id: i64, vkey: &str) -> StoreResult<Chat> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;
            query_participant_chat(conn, chat_id, user_id)
        })
    }

    /// All chats the user participates in.
    pub fn get_chats(&self, user_id: i64, vkey: &str) -> StoreResult<Vec<Chat>> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;

            let mut stmt = conn.prepare(
                "SELECT chat_id, user_from, user_to, item_id FROM chats
                 WHERE user_from = ?1 OR user_to = ?1",
            )?;
            let rows = stmt
                .query_map([user_id], row_to_chat)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete a chat and (by cascade) its messages. Returns the deleted
    /// chat so callers can notify both former participants.
    pub fn delete_chat(&self, chat_id: i64, user_id: i64, vkey: &str) -> StoreResult<Chat> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;
            let chat = query_participant_chat(conn, chat_id, user_id)?;

            conn.execute("DELETE FROM chats WHERE chat_id = ?1", [chat_id])?;
            Ok(chat)
        })
    }

    /// Append a message. The author must hold a valid key and be a
    /// participant of an existing chat.
    pub fn create_message(
        &self,
        chat_id: i64,
        message: &str,
        date: &str,
        author_id: i64,
        vkey: &str,
    ) -> StoreResult<i64> {
        self.with_conn(|conn| {
            check_validation_key(conn, author_id, vkey)?;
            query_participant_chat(conn, chat_id, author_id)?;

            conn.execute(
                "INSERT INTO messages (chat_id, user_from, message, date) VALUES (?1, ?2, ?3, ?4)",
                (chat_id, author_id, message, date),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The full message list of a chat, oldest first.
    pub fn get_messages(&self, chat_id: i64, user_id: i64, vkey: &str) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;

            let mut stmt = conn.prepare(
                "SELECT message_id, chat_id, user_from, message, date FROM messages
                 WHERE chat_id = ?1 ORDER BY message_id",
            )?;
            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok(Message {
                        message_id: row.get(0)?,
                        chat_id: row.get(1)?,
                        user_from: row.get(2)?,
                        message: row.get(3)?,
                        date: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Edit a message body; author only, empty bodies rejected.
    pub fn update_message(
        &self,
        message_id: i64,
        message: &str,
        author_id: i64,
        vkey: &str,
    ) -> StoreResult<()> {
        if message.is_empty() {
            return Err(StoreError::Invalid("Empty message".into()));
        }

        self.with_conn(|conn| {
            check_validation_key(conn, author_id, vkey)?;
            check_message_author(conn, message_id, author_id)?;

            conn.execute(
                "UPDATE messages SET message = ?1 WHERE message_id = ?2",
                (message, message_id),
            )?;
            Ok(())
        })
    }

    /// Delete a message; author only.
    pub fn delete_message(&self, message_id: i64, user_id: i64, vkey: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_validation_key(conn, user_id, vkey)?;
            check_message_author(conn, message_id, user_id)?;

            conn.execute("DELETE FROM messages WHERE message_id = ?1", [message_id])?;
            Ok(())
        })
    }

    /// Chats attached to an item, used to notify participants before the
    /// item (and those chats) go away.
    pub fn chats_for_item(&self, item_id: i64) -> StoreResult<Vec<Chat>> {
        self.with_conn(|conn| query_chats_for_item(conn, item_id))
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        chat_id: row.get(0)?,
        user_from: row.get(1)?,
        user_to: row.get(2)?,
        item_id: row.get(3)?,
    })
}

/// Fetch a chat and require `user_id` to be one of its participants.
pub(crate) fn query_participant_chat(
    conn: &Connection,
    chat_id: i64,
    user_id: i64,
) -> StoreResult<Chat> {
    let chat: Option<Chat> = conn
        .query_row(
            "SELECT chat_id, user_from, user_to, item_id FROM chats WHERE chat_id = ?1",
            [chat_id],
            row_to_chat,
        )
        .optional()?;

    let Some(chat) = chat else {
        log_error(conn, "Chat not found");
        return Err(StoreError::NotFound);
    };
    if !chat.has_participant(user_id) {
        log_error(conn, "Unauthorized");
        return Err(StoreError::Unauthorized);
    }
    Ok(chat)
}

fn check_message_author(conn: &Connection, message_id: i64, user_id: i64) -> StoreResult<()> {
    let author: Option<i64> = conn
        .query_row(
            "SELECT user_from FROM messages WHERE message_id = ?1",
            [message_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(author) = author else {
        log_error(conn, "Message not found");
        return Err(StoreError::NotFound);
    };
    if author != user_id {
        log_error(conn, "Unauthorized");
        return Err(StoreError::Unauthorized);
    }
    Ok(())
}

pub(crate) fn query_chats_for_item(conn: &Connection, item_id: i64) -> StoreResult<Vec<Chat>> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, user_from, user_to, item_id FROM chats WHERE item_id = ?1",
    )?;
    let rows = stmt
        .query_map([item_id], row_to_chat)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use crate::testutil::{seed_item, seed_user};
    use crate::{Database, StoreError};

    fn setup() -> (Database, i64, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let seller = seed_user(&db, "seller", "seller@example.com");
        let buyer = seed_user(&db, "buyer", "buyer@example.com");
        let item = seed_item(&db, seller, "bike");
        db.insert_validation_key(seller, "sk").unwrap();
        db.insert_validation_key(buyer, "bk").unwrap();
        (db, seller, buyer, item)
    }

    #[test]
    fn chat_creation_is_idempotent() {
        let (db, seller, buyer, item) = setup();

        let a = db.create_chat(buyer, seller, item, "bk").unwrap();
        let b = db.create_chat(buyer, seller, item, "bk").unwrap();
        assert_eq!(a, b);

        assert_eq!(db.get_chats(buyer, "bk").unwrap().len(), 1);
    }

    #[test]
    fn chat_access_is_participant_only() {
        let (db, seller, buyer, item) = setup();
        let outsider = seed_user(&db, "eve", "eve@example.com");
        db.insert_validation_key(outsider, "ek").unwrap();

        let chat = db.create_chat(buyer, seller, item, "bk").unwrap();

        assert!(db.get_chat(chat, seller, "sk").is_ok());
        assert!(matches!(
            db.get_chat(chat, outsider, "ek"),
            Err(StoreError::Unauthorized)
        ));
        assert!(matches!(
            db.get_chat(9999, buyer, "bk"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn message_roundtrip() {
        let (db, seller, buyer, item) = setup();
        let chat = db.create_chat(buyer, seller, item, "bk").unwrap();

        let id = db
            .create_message(chat, "is it available?", "2024-11-02 10:00:00", buyer, "bk")
            .unwrap();

        let messages = db.get_messages(chat, seller, "sk").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, id);
        assert_eq!(messages[0].user_from, buyer);

        db.delete_message(id, buyer, "bk").unwrap();
        assert!(db.get_messages(chat, seller, "sk").unwrap().is_empty());
    }

    #[test]
    fn only_the_author_may_edit_or_delete() {
        let (db, seller, buyer, item) = setup();
        let chat = db.create_chat(buyer, seller, item, "bk").unwrap();
        let id = db
            .create_message(chat, "hello", "2024-11-02 10:00:00", buyer, "bk")
            .unwrap();

        assert!(matches!(
            db.update_message(id, "edited", seller, "sk"),
            Err(StoreError::Unauthorized)
        ));
        assert!(matches!(
            db.delete_message(id, seller, "sk"),
            Err(StoreError::Unauthorized)
        ));

        db.update_message(id, "edited", buyer, "bk").unwrap();
        let messages = db.get_messages(chat, buyer, "bk").unwrap();
        assert_eq!(messages[0].message, "edited");
    }

    #[test]
    fn empty_edit_is_rejected() {
        let (db, seller, buyer, item) = setup();
        let chat = db.create_chat(buyer, seller, item, "bk").unwrap();
        let id = db
            .create_message(chat, "hello", "2024-11-02 10:00:00", buyer, "bk")
            .unwrap();

        assert!(matches!(
            db.update_message(id, "", buyer, "bk"),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn non_participant_cannot_send() {
        let (db, seller, buyer, item) = setup();
        let outsider = seed_user(&db, "eve", "eve@example.com");
        db.insert_validation_key(outsider, "ek").unwrap();

        let chat = db.create_chat(buyer, seller, item, "bk").unwrap();
        assert!(matches!(
            db.create_message(chat, "hi", "2024-11-02 10:00:00", outsider, "ek"),
            Err(StoreError::Unauthorized)
        ));
    }

    #[test]
    fn deleting_a_chat_cascades_to_messages() {
        let (db, seller, buyer, item) = setup();
        let chat = db.create_chat(buyer, seller, item, "bk").unwrap();
        db.create_message(chat, "hello", "2024-11-02 10:00:00", buyer, "bk")
            .unwrap();

        let deleted = db.delete_chat(chat, seller, "sk").unwrap();
        assert_eq!(deleted.user_from, buyer);
        assert_eq!(deleted.user_to, seller);

        assert!(matches!(
            db.get_chat(chat, buyer, "bk"),
            Err(StoreError::NotFound)
        ));
        assert!(db.get_messages(chat, buyer, "bk").unwrap().is_empty());
    }

    #[test]
    fn bad_key_is_rejected_on_every_operation() {
        let (db, seller, buyer, item) = setup();
        let chat = db.create_chat(buyer, seller, item, "bk").unwrap();

        assert!(db.get_messages(chat, buyer, "bad").is_err());
        assert!(db
            .create_message(chat, "hi", "2024-11-02 10:00:00", buyer, "bad")
            .is_err());
        assert!(db.get_chats(buyer, "bad").is_err());
        assert!(db.delete_chat(chat, buyer, "bad").is_err());
    }
}
