use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id                          TEXT PRIMARY KEY,
                email                       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                username                    TEXT NOT NULL UNIQUE,
                full_name                   TEXT NOT NULL,
                password_hash               TEXT NOT NULL,
                avatar_url                  TEXT,
                email_verified              INTEGER NOT NULL DEFAULT 0,
                email_verification_token    TEXT UNIQUE,
                created_at                  TEXT NOT NULL
            );

            CREATE TABLE conversations (
                id          TEXT PRIMARY KEY,
                is_private  INTEGER NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE conversation_participants (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id),
                last_read_at    TEXT,
                joined_at       TEXT NOT NULL,
                UNIQUE(conversation_id, user_id)
            );

            CREATE INDEX idx_participants_user
                ON conversation_participants(user_id);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id       TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL DEFAULT '',
                message_type    TEXT NOT NULL DEFAULT 'text'
                                CHECK (message_type IN ('text', 'file', 'image')),
                file_url        TEXT,
                file_name       TEXT,
                file_size       INTEGER,
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            CREATE TABLE contacts (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id),
                contact_user_id TEXT NOT NULL REFERENCES users(id),
                created_at      TEXT NOT NULL,
                UNIQUE(user_id, contact_user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
