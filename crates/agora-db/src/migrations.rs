use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Id of the room seeded on first start.
pub const GENERAL_ROOM_ID: &str = "00000000-0000-0000-0000-000000000001";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            email         TEXT NOT NULL UNIQUE,
            password      TEXT NOT NULL,
            avatar_color  TEXT NOT NULL DEFAULT '#4A90D9',
            status        TEXT NOT NULL DEFAULT 'offline',
            last_seen     TEXT,
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rooms (
            id           TEXT PRIMARY KEY,
            name         TEXT NOT NULL UNIQUE,
            description  TEXT,
            owner_id     TEXT REFERENCES users(id),
            is_private   INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS room_members (
            room_id    TEXT NOT NULL REFERENCES rooms(id),
            user_id    TEXT NOT NULL REFERENCES users(id),
            role       TEXT NOT NULL DEFAULT 'member',
            joined_at  TEXT NOT NULL,
            PRIMARY KEY (room_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            room_id       TEXT NOT NULL REFERENCES rooms(id),
            user_id       TEXT REFERENCES users(id),
            content       TEXT NOT NULL,
            message_type  TEXT NOT NULL DEFAULT 'text',
            edited        INTEGER NOT NULL DEFAULT 0,
            edited_at     TEXT,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at);

        CREATE TABLE IF NOT EXISTS direct_messages (
            id           TEXT PRIMARY KEY,
            sender_id    TEXT NOT NULL REFERENCES users(id),
            receiver_id  TEXT NOT NULL REFERENCES users(id),
            content      TEXT NOT NULL,
            read         INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_direct_messages_pair
            ON direct_messages(sender_id, receiver_id, created_at);

        CREATE TABLE IF NOT EXISTS friendships (
            id            TEXT PRIMARY KEY,
            requester_id  TEXT NOT NULL REFERENCES users(id),
            receiver_id   TEXT NOT NULL REFERENCES users(id),
            status        TEXT NOT NULL DEFAULT 'pending',
            created_at    TEXT NOT NULL,
            UNIQUE (requester_id, receiver_id)
        );

        CREATE INDEX IF NOT EXISTS idx_friendships_receiver
            ON friendships(receiver_id, status);

        -- Seed the default general room
        INSERT OR IGNORE INTO rooms (id, name, description, created_at)
            VALUES ('00000000-0000-0000-0000-000000000001', 'general', 'General chat',
                    strftime('%Y-%m-%dT%H:%M:%fZ', 'now'));
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
