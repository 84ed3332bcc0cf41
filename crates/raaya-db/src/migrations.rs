use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Timestamps are written by the application as RFC 3339 UTC with
/// microsecond precision, so text order equals time order.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            role            TEXT NOT NULL,
            chat_settings   TEXT NOT NULL DEFAULT 'all',
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS profiles (
            user_id         TEXT NOT NULL REFERENCES users(id),
            role            TEXT NOT NULL,
            display_name    TEXT NOT NULL,
            avatar_url      TEXT,
            city            TEXT,
            updated_at      TEXT NOT NULL,
            PRIMARY KEY (user_id, role)
        );

        CREATE TABLE IF NOT EXISTS chat_rooms (
            id                  TEXT PRIMARY KEY,
            chat_type           TEXT NOT NULL,
            family              TEXT NOT NULL,
            pair_key            TEXT NOT NULL,
            venue_user_id       TEXT,
            provider_user_id    TEXT,
            provider_type       TEXT,
            participant1_id     TEXT,
            participant2_id     TEXT,
            created_at          TEXT NOT NULL,
            last_message_at     TEXT,
            UNIQUE(family, pair_key)
        );

        CREATE INDEX IF NOT EXISTS idx_rooms_venue ON chat_rooms(venue_user_id);
        CREATE INDEX IF NOT EXISTS idx_rooms_provider ON chat_rooms(provider_user_id);
        CREATE INDEX IF NOT EXISTS idx_rooms_p1 ON chat_rooms(participant1_id);
        CREATE INDEX IF NOT EXISTS idx_rooms_p2 ON chat_rooms(participant2_id);

        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            chat_room_id    TEXT NOT NULL REFERENCES chat_rooms(id),
            sender_id       TEXT NOT NULL,
            message         TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(chat_room_id, created_at, seq);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
