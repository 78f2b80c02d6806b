use crate::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id           TEXT PRIMARY KEY,
            phone        TEXT NOT NULL UNIQUE,
            name         TEXT NOT NULL DEFAULT '',
            bio          TEXT NOT NULL DEFAULT '',
            avatar_url   TEXT NOT NULL DEFAULT '',
            google_id    TEXT UNIQUE,
            telegram_id  TEXT UNIQUE,
            is_online    INTEGER NOT NULL DEFAULT 0,
            last_seen    TEXT,
            created_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chats (
            id          TEXT PRIMARY KEY,
            is_group    INTEGER NOT NULL DEFAULT 0,
            name        TEXT,
            avatar_url  TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS chat_participants (
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            is_blocked  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON chat_participants(user_id);

        -- Millisecond timestamps keep history ordering stable when several
        -- messages land within the same second.
        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            chat_id         TEXT NOT NULL REFERENCES chats(id),
            sender_id       TEXT NOT NULL REFERENCES users(id),
            text            TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            attachment_type TEXT,
            attachment_url  TEXT,
            attachment_name TEXT,
            created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
