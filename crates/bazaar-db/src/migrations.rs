use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            username        TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            name            TEXT,
            surname         TEXT,
            email           TEXT NOT NULL UNIQUE,
            phone           TEXT,
            address         TEXT,
            date_of_birth   TEXT,
            role            TEXT NOT NULL DEFAULT 'user',
            status          TEXT NOT NULL DEFAULT 'active',
            banned_at       TEXT,
            ban_duration    INTEGER NOT NULL DEFAULT -1
        );

        CREATE TABLE IF NOT EXISTS items (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL,
            description     TEXT,
            price           REAL NOT NULL,
            size            TEXT,
            category_id     TEXT NOT NULL,
            condition_id    TEXT NOT NULL,
            image_path      TEXT NOT NULL,
            author_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_items_category ON items(category_id);
        CREATE INDEX IF NOT EXISTS idx_items_author ON items(author_id);

        CREATE TABLE IF NOT EXISTS chats (
            chat_id     INTEGER PRIMARY KEY AUTOINCREMENT,
            user_from   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            user_to     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            item_id     INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            UNIQUE(user_from, user_to, item_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            message_id  INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id     INTEGER NOT NULL REFERENCES chats(chat_id) ON DELETE CASCADE,
            user_from   INTEGER NOT NULL,
            message     TEXT NOT NULL,
            date        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat ON messages(chat_id);

        CREATE TABLE IF NOT EXISTS validation_keys (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            vkey        TEXT NOT NULL,
            expires_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_vkeys_user ON validation_keys(user_id);

        CREATE TABLE IF NOT EXISTS codes (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            code            TEXT NOT NULL,
            email           TEXT NOT NULL,
            expires_at      TEXT NOT NULL,
            username        TEXT NOT NULL,
            password_hash   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reset_links (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            time        TEXT NOT NULL DEFAULT (datetime('now')),
            email       TEXT NOT NULL,
            token       TEXT NOT NULL,
            expires_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reports (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            time        TEXT NOT NULL DEFAULT (datetime('now')),
            reason      TEXT NOT NULL,
            item_id     INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS visits (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            time        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS errors (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            time        TEXT NOT NULL DEFAULT (datetime('now')),
            message     TEXT NOT NULL
        );

        -- Seed the admin account (password set on first boot by the server)
        INSERT OR IGNORE INTO users (username, password_hash, email, role)
            VALUES ('admin', '', 'admin', 'admin');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
