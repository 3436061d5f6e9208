use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            full_name       TEXT NOT NULL,
            email           TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            profile_pic     TEXT,
            bio             TEXT,
            refresh_token   TEXT,
            upload_enabled  INTEGER NOT NULL DEFAULT 1,
            ai_enabled      INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            receiver_id     TEXT NOT NULL REFERENCES users(id),
            text            TEXT,
            image           TEXT,
            seen            INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            CHECK (text IS NOT NULL OR image IS NOT NULL)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, receiver_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unseen
            ON messages(receiver_id, seen);

        CREATE TABLE IF NOT EXISTS settings (
            key     TEXT PRIMARY KEY,
            value   TEXT NOT NULL
        );

        -- Assistant is on unless an admin turns it off
        INSERT OR IGNORE INTO settings (key, value) VALUES ('ai_enabled', 'true');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
