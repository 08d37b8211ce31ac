//! Item listings.

use rusqlite::Connection;

use bazaar_types::models::{Chat, Item};

use crate::chats::query_chats_for_item;
use crate::sessions::check_validation_key;
use crate::{Database, OptionalExt, StoreError, StoreResult, log_error};

impl Database {
    pub fn insert_item(
        &self,
        name: &str,
        description: Option<&str>,
        price: f64,
        size: Option<&str>,
        category_id: &str,
        condition_id: &str,
        image_path: &str,
        author_id: i64,
        vkey: &str,
    ) -> StoreResult<i64> {
        self.with_conn(|conn| {
            check_validation_key(conn, author_id, vkey)?;

            conn.execute(
                "INSERT INTO items (name, description, price, size, category_id, condition_id, image_path, author_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                (
                    name,
                    description,
                    price,
                    size,
                    category_id,
                    condition_id,
                    image_path,
                    author_id,
                ),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Browse a category; public, empty result for an unknown category.
    pub fn get_items(&self, category_id: &str) -> StoreResult<Vec<Item>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, price, size, category_id, condition_id, image_path, author_id
                 FROM items WHERE category_id = ?1",
            )?;
            let rows = stmt
                .query_map([category_id], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_item(&self, item_id: i64) -> StoreResult<Item> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, description, price, size, category_id, condition_id, image_path, author_id
                 FROM items WHERE id = ?1",
                [item_id],
                row_to_item,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
        })
    }

    pub fn update_item(
        &self,
        item_id: i64,
        author_id: i64,
        vkey: &str,
        name: Option<&str>,
        description: Option<&str>,
        price: Option<f64>,
        size: Option<&str>,
        category_id: Option<&str>,
        condition_id: Option<&str>,
        image_path: Option<&str>,
    ) -> StoreResult<()> {
        self.with_conn(|conn| {
            check_validation_key(conn, author_id, vkey)?;
            check_item_author(conn, item_id, author_id)?;

            conn.execute(
                "UPDATE items SET
                    name = COALESCE(?1, name),
                    description = COALESCE(?2, description),
                    price = COALESCE(?3, price),
                    size = COALESCE(?4, size),
                    category_id = COALESCE(?5, category_id),
                    condition_id = COALESCE(?6, condition_id),
                    image_path = COALESCE(?7, image_path)
                 WHERE id = ?8",
                (
                    name,
                    description,
                    price,
                    size,
                    category_id,
                    condition_id,
                    image_path,
                    item_id,
                ),
            )?;
            Ok(())
        })
    }

    /// Delete a listing; author only. Cascades remove its chats, their
    /// messages and its reports. Returns the chats that existed at
    /// deletion time so their participants can be notified.
    pub fn delete_item(&self, item_id: i64, author_id: i64, vkey: &str) -> StoreResult<Vec<Chat>> {
        self.with_conn(|conn| {
            check_validation_key(conn, author_id, vkey)?;
            check_item_author(conn, item_id, author_id)?;

            let chats = query_chats_for_item(conn, item_id)?;
            conn.execute("DELETE FROM items WHERE id = ?1", [item_id])?;
            Ok(chats)
        })
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        size: row.get(4)?,
        category_id: row.get(5)?,
        condition_id: row.get(6)?,
        image_path: row.get(7)?,
        author_id: row.get(8)?,
    })
}

pub(crate) fn query_items_by_author(conn: &Connection, author_id: i64) -> StoreResult<Vec<Item>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, price, size, category_id, condition_id, image_path, author_id
         FROM items WHERE author_id = ?1",
    )?;
    let rows = stmt
        .query_map([author_id], row_to_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn check_item_author(conn: &Connection, item_id: i64, author_id: i64) -> StoreResult<()> {
    let owner: Option<i64> = conn
        .query_row("SELECT author_id FROM items WHERE id = ?1", [item_id], |row| {
            row.get(0)
        })
        .optional()?;

    let Some(owner) = owner else {
        log_error(conn, "Item not found");
        return Err(StoreError::NotFound);
    };
    if owner != author_id {
        log_error(conn, "Unauthorized");
        return Err(StoreError::Unauthorized);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::testutil::{seed_item, seed_user};
    use crate::{Database, StoreError};

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let uid = seed_user(&db, "seller", "seller@example.com");
        db.insert_validation_key(uid, "k").unwrap();
        (db, uid)
    }

    #[test]
    fn item_crud() {
        let (db, uid) = setup();

        let id = db
            .insert_item(
                "bike",
                Some("red city bike"),
                120.0,
                None,
                "sports",
                "used",
                "https://img.example/1",
                uid,
                "k",
            )
            .unwrap();

        let item = db.get_item(id).unwrap();
        assert_eq!(item.name, "bike");
        assert_eq!(item.author_id, uid);

        db.update_item(id, uid, "k", None, None, Some(99.5), None, None, None, None)
            .unwrap();
        assert_eq!(db.get_item(id).unwrap().price, 99.5);

        assert_eq!(db.get_items("sports").unwrap().len(), 1);
        assert!(db.get_items("books").unwrap().is_empty());
    }

    #[test]
    fn only_the_author_may_touch_an_item() {
        let (db, uid) = setup();
        let other = seed_user(&db, "other", "other@example.com");
        db.insert_validation_key(other, "ok").unwrap();

        let id = seed_item(&db, uid, "bike");

        assert!(matches!(
            db.update_item(id, other, "ok", Some("stolen"), None, None, None, None, None, None),
            Err(StoreError::Unauthorized)
        ));
        assert!(matches!(
            db.delete_item(id, other, "ok"),
            Err(StoreError::Unauthorized)
        ));
    }

    #[test]
    fn deleting_an_item_removes_its_chats_and_messages() {
        let (db, seller) = setup();
        let buyer_a = seed_user(&db, "buyer_a", "a@example.com");
        let buyer_b = seed_user(&db, "buyer_b", "b@example.com");
        db.insert_validation_key(buyer_a, "ak").unwrap();
        db.insert_validation_key(buyer_b, "bk").unwrap();

        let item = seed_item(&db, seller, "lamp");
        let chat_a = db.create_chat(buyer_a, seller, item, "ak").unwrap();
        let chat_b = db.create_chat(buyer_b, seller, item, "bk").unwrap();
        db.create_message(chat_a, "hi", "2024-11-02 10:00:00", buyer_a, "ak")
            .unwrap();
        db.create_message(chat_b, "hey", "2024-11-02 10:01:00", buyer_b, "bk")
            .unwrap();

        let affected = db.delete_item(item, seller, "k").unwrap();
        assert_eq!(affected.len(), 2);

        assert!(matches!(
            db.get_chat(chat_a, buyer_a, "ak"),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.get_chat(chat_b, buyer_b, "bk"),
            Err(StoreError::NotFound)
        ));
        assert!(db.get_messages(chat_a, buyer_a, "ak").unwrap().is_empty());
        assert!(db.get_messages(chat_b, buyer_b, "bk").unwrap().is_empty());
    }
}
