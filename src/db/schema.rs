// Database schema — table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent — safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Platform users. Usernames compare case-insensitively because
        -- mention matching does.
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Room membership — who can be mentioned in which room.
        -- Rooms themselves are owned by the platform's CRUD layer.
        CREATE TABLE IF NOT EXISTS room_members (
            room_id INTEGER NOT NULL,
            user_id INTEGER NOT NULL,
            joined_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (room_id, user_id)
        );

        -- Chat messages. The content column holds either a tagged
        -- ciphertext envelope (enc:v1:...) or raw legacy plaintext;
        -- readers must handle both indefinitely.
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id INTEGER NOT NULL,
            sender_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'text',  -- text/image/voice/file/system
            attachment_ref TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- @mentions extracted from accepted message plaintext.
        -- Hard-deleting a message cascades its mentions.
        CREATE TABLE IF NOT EXISTS mentions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (message_id, user_id)
        );

        -- Notifications produced by fan-out. The read flag is the only
        -- mutable column; the retention sweep removes old rows.
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient_id INTEGER NOT NULL,
            kind TEXT NOT NULL,                -- chat_mention / chat_message / post_comment / ...
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            read INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Index for the room timeline read path (descending scan)
        CREATE INDEX IF NOT EXISTS idx_messages_room_time
            ON messages(room_id, created_at);

        -- Index for the notification bell (list + unread count)
        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, read);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: add the related-entity columns to notifications.
    // (recipient, kind, related entity) is the fan-out dedup signature.
    run_migration(conn, 2, |c| {
        c.execute_batch(
            "ALTER TABLE notifications ADD COLUMN related_type TEXT;
             ALTER TABLE notifications ADD COLUMN related_id INTEGER;",
        )
    })?;

    // Migration v3: unique index over the dedup signature — the backstop
    // against concurrent duplicate fan-out when the check-then-insert
    // window is not serializable.
    run_migration(conn, 3, |c| {
        c.execute_batch(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_notifications_signature
                 ON notifications(recipient_id, kind, related_type, related_id);",
        )
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
