// Database queries — CRUD operations for all tables, plus the send
// transaction that ties message + mentions + notifications together.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust
// interfaces.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::models::{
    Mention, Message, MessageKind, Notification, OutgoingMessage, RoomMember, User,
};
use crate::notify::{self, NotificationTrigger};

// --- Users & membership ---

/// Create a user and return their id. Usernames are unique, compared
/// case-insensitively.
pub fn create_user(conn: &Connection, username: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (username) VALUES (?1)",
        params![username],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let mut stmt =
        conn.prepare("SELECT id, username, created_at FROM users WHERE username = ?1")?;
    let result = stmt
        .query_row(params![username], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                created_at: row.get(2)?,
            })
        })
        .optional()?;
    Ok(result)
}

pub fn get_username(conn: &Connection, user_id: i64) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT username FROM users WHERE id = ?1")?;
    let result = stmt.query_row(params![user_id], |row| row.get(0)).optional()?;
    Ok(result)
}

/// Add a user to a room (no-op if already a member).
pub fn add_room_member(conn: &Connection, room_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO room_members (room_id, user_id) VALUES (?1, ?2)",
        params![room_id, user_id],
    )?;
    Ok(())
}

/// The member set mentions resolve against.
pub fn get_room_members(conn: &Connection, room_id: i64) -> Result<Vec<RoomMember>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.username
         FROM room_members rm
         JOIN users u ON u.id = rm.user_id
         WHERE rm.room_id = ?1",
    )?;
    let rows = stmt.query_map(params![room_id], |row| {
        Ok(RoomMember {
            user_id: row.get(0)?,
            username: row.get(1)?,
        })
    })?;

    let mut members = Vec::new();
    for row in rows {
        members.push(row?);
    }
    Ok(members)
}

// --- Messages ---

/// Insert a message row. `stored_content` is whatever should hit the disk —
/// the encryption envelope on the normal path.
pub fn insert_message(
    conn: &Connection,
    room_id: i64,
    sender_id: i64,
    stored_content: &str,
    kind: MessageKind,
    attachment_ref: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO messages (room_id, sender_id, content, kind, attachment_ref)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![room_id, sender_id, stored_content, kind.as_str(), attachment_ref],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_message(conn: &Connection, message_id: i64) -> Result<Option<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, room_id, sender_id, content, kind, attachment_ref, created_at, updated_at
         FROM messages WHERE id = ?1",
    )?;
    let result = stmt
        .query_row(params![message_id], map_message_row)
        .optional()?;
    Ok(result)
}

/// Read a room's messages newest-first with limit/offset. The caller
/// (MessageWriter::fetch) re-orders to chronological for display.
pub fn fetch_messages(
    conn: &Connection,
    room_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, room_id, sender_id, content, kind, attachment_ref, created_at, updated_at
         FROM messages
         WHERE room_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![room_id, limit, offset], map_message_row)?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let kind: String = row.get(4)?;
    Ok(Message {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        kind: MessageKind::from_str(&kind),
        attachment_ref: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Hard-delete a message and its mention rows. Runs both deletes itself so
/// behavior doesn't depend on the foreign_keys pragma being set.
pub fn delete_message(conn: &mut Connection, message_id: i64) -> Result<bool> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM mentions WHERE message_id = ?1", params![message_id])?;
    let removed = tx.execute("DELETE FROM messages WHERE id = ?1", params![message_id])?;
    tx.commit()?;
    Ok(removed > 0)
}

// --- Mentions ---

/// Record a mention. OR IGNORE backstops the per-message dedup that the
/// resolver already performs.
pub fn insert_mention(conn: &Connection, message_id: i64, user_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO mentions (message_id, user_id) VALUES (?1, ?2)",
        params![message_id, user_id],
    )?;
    Ok(())
}

pub fn mentions_for_message(conn: &Connection, message_id: i64) -> Result<Vec<Mention>> {
    let mut stmt = conn.prepare(
        "SELECT id, message_id, user_id, created_at FROM mentions WHERE message_id = ?1",
    )?;
    let rows = stmt.query_map(params![message_id], |row| {
        Ok(Mention {
            id: row.get(0)?,
            message_id: row.get(1)?,
            user_id: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;

    let mut mentions = Vec::new();
    for row in rows {
        mentions.push(row?);
    }
    Ok(mentions)
}

// --- The send transaction ---

/// Persist an accepted message atomically with its mentions and the
/// notifications they fan out to. Any failure rolls the whole unit back —
/// the transaction guard drops without committing, so no partial
/// message/mention/notification rows can exist.
///
/// Moderation has already happened by the time this runs; the plaintext
/// here is accepted content.
pub fn send_message_tx(conn: &mut Connection, outgoing: &OutgoingMessage) -> Result<Message> {
    let tx = conn.transaction()?;

    let message_id = insert_message(
        &tx,
        outgoing.room_id,
        outgoing.sender_id,
        &outgoing.stored_content,
        outgoing.kind,
        outgoing.attachment_ref.as_deref(),
    )?;

    let members = get_room_members(&tx, outgoing.room_id)?;
    let mentioned = crate::mentions::extract(&outgoing.plaintext, outgoing.sender_id, &members);

    if !mentioned.is_empty() {
        let sender_name = get_username(&tx, outgoing.sender_id)?
            .unwrap_or_else(|| format!("user#{}", outgoing.sender_id));
        let mut triggers: Vec<NotificationTrigger> = Vec::with_capacity(mentioned.len());
        for user_id in &mentioned {
            insert_mention(&tx, message_id, *user_id)?;
            triggers.push(notify::mention_trigger(
                *user_id,
                &sender_name,
                outgoing.room_id,
                message_id,
            ));
        }
        notify::dispatch(&tx, &triggers)?;
    }

    let message = get_message(&tx, message_id)?
        .ok_or_else(|| anyhow::anyhow!("message {message_id} vanished mid-transaction"))?;

    tx.commit()?;

    debug!(
        message_id,
        room_id = outgoing.room_id,
        mentions = mentioned.len(),
        "message persisted"
    );
    Ok(message)
}

// --- Notifications ---

/// Does a notification with this dedup signature already exist?
/// `IS` comparison so NULL related fields match NULL.
pub fn notification_exists(
    conn: &Connection,
    recipient_id: i64,
    kind: &str,
    related_type: Option<&str>,
    related_id: Option<i64>,
) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM notifications
         WHERE recipient_id = ?1 AND kind = ?2
           AND related_type IS ?3 AND related_id IS ?4",
        params![recipient_id, kind, related_type, related_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert a notification row. OR IGNORE lets the unique signature index
/// absorb a concurrent duplicate: None means the row already existed.
pub fn insert_notification(
    conn: &Connection,
    trigger: &NotificationTrigger,
) -> Result<Option<i64>> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO notifications
            (recipient_id, kind, title, body, related_type, related_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            trigger.recipient_id,
            trigger.kind.as_str(),
            trigger.title,
            trigger.body,
            trigger.related_type,
            trigger.related_id,
        ],
    )?;
    if inserted == 0 {
        Ok(None)
    } else {
        Ok(Some(conn.last_insert_rowid()))
    }
}

/// A recipient's notifications, newest first.
pub fn list_notifications(
    conn: &Connection,
    recipient_id: i64,
    limit: u32,
) -> Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, recipient_id, kind, title, body, related_type, related_id, read, created_at
         FROM notifications
         WHERE recipient_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![recipient_id, limit], |row| {
        Ok(Notification {
            id: row.get(0)?,
            recipient_id: row.get(1)?,
            kind: row.get(2)?,
            title: row.get(3)?,
            body: row.get(4)?,
            related_type: row.get(5)?,
            related_id: row.get(6)?,
            read: row.get::<_, i64>(7)? != 0,
            created_at: row.get(8)?,
        })
    })?;

    let mut notifications = Vec::new();
    for row in rows {
        notifications.push(row?);
    }
    Ok(notifications)
}

pub fn unread_count(conn: &Connection, recipient_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read = 0",
        params![recipient_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Flip the read flag. Returns false if the notification doesn't exist.
pub fn mark_read(conn: &Connection, notification_id: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1",
        params![notification_id],
    )?;
    Ok(updated > 0)
}

/// Age-based retention sweep. Returns how many rows were removed.
pub fn sweep_notifications(conn: &Connection, older_than_days: i64) -> Result<usize> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(older_than_days))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let removed = conn.execute(
        "DELETE FROM notifications WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(removed)
}

// --- Status ---

pub fn message_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
    Ok(count)
}

/// (total, unread) across all recipients.
pub fn notification_counts(conn: &Connection) -> Result<(i64, i64)> {
    let counts = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(read = 0), 0) FROM notifications",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NotificationKind;
    use crate::db::schema::create_tables;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    fn seed_room(conn: &Connection) -> (i64, i64) {
        let alice = create_user(conn, "alice").unwrap();
        let bob = create_user(conn, "bob").unwrap();
        add_room_member(conn, 1, alice).unwrap();
        add_room_member(conn, 1, bob).unwrap();
        (alice, bob)
    }

    #[test]
    fn test_user_roundtrip_case_insensitive() {
        let conn = test_db();
        let id = create_user(&conn, "Alice").unwrap();
        assert!(id > 0);

        let found = get_user_by_username(&conn, "alice").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.username, "Alice");

        assert!(get_user_by_username(&conn, "nobody").unwrap().is_none());
        // The UNIQUE constraint is case-insensitive too
        assert!(create_user(&conn, "ALICE").is_err());
    }

    #[test]
    fn test_room_membership() {
        let conn = test_db();
        let (alice, bob) = seed_room(&conn);

        let members = get_room_members(&conn, 1).unwrap();
        let ids: Vec<i64> = members.iter().map(|m| m.user_id).collect();
        assert!(ids.contains(&alice) && ids.contains(&bob));

        // Joining twice is a no-op
        add_room_member(&conn, 1, alice).unwrap();
        assert_eq!(get_room_members(&conn, 1).unwrap().len(), 2);

        assert!(get_room_members(&conn, 99).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_orders_newest_first_with_window() {
        let conn = test_db();
        let (alice, _) = seed_room(&conn);

        for i in 0..5 {
            insert_message(&conn, 1, alice, &format!("m{i}"), MessageKind::Text, None).unwrap();
        }

        let page = fetch_messages(&conn, 1, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        // Same-second inserts fall back to id DESC
        assert_eq!(page[0].content, "m4");
        assert_eq!(page[1].content, "m3");

        let next = fetch_messages(&conn, 1, 2, 2).unwrap();
        assert_eq!(next[0].content, "m2");
    }

    #[test]
    fn test_send_tx_creates_message_mentions_notifications() {
        let mut conn = test_db();
        let (alice, bob) = seed_room(&conn);

        let outgoing = OutgoingMessage {
            room_id: 1,
            sender_id: alice,
            stored_content: "enc:v1:opaque".to_string(),
            plaintext: "hey @bob, lab at 4?".to_string(),
            kind: MessageKind::Text,
            attachment_ref: None,
        };
        let message = send_message_tx(&mut conn, &outgoing).unwrap();
        assert_eq!(message.content, "enc:v1:opaque");

        let mentions = mentions_for_message(&conn, message.id).unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].user_id, bob);

        let inbox = list_notifications(&conn, bob, 10).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::ChatMention.as_str());
        assert_eq!(inbox[0].related_id, Some(message.id));
        assert!(!inbox[0].read);
    }

    #[test]
    fn test_send_tx_self_mention_creates_nothing() {
        let mut conn = test_db();
        let (alice, _) = seed_room(&conn);

        let outgoing = OutgoingMessage {
            room_id: 1,
            sender_id: alice,
            stored_content: "c".to_string(),
            plaintext: "note to self: @alice remember the keys".to_string(),
            kind: MessageKind::Text,
            attachment_ref: None,
        };
        let message = send_message_tx(&mut conn, &outgoing).unwrap();
        assert!(mentions_for_message(&conn, message.id).unwrap().is_empty());
        assert!(list_notifications(&conn, alice, 10).unwrap().is_empty());
    }

    #[test]
    fn test_delete_message_cascades_mentions() {
        let mut conn = test_db();
        let (alice, bob) = seed_room(&conn);

        let outgoing = OutgoingMessage {
            room_id: 1,
            sender_id: alice,
            stored_content: "c".to_string(),
            plaintext: "@bob see this".to_string(),
            kind: MessageKind::Text,
            attachment_ref: None,
        };
        let message = send_message_tx(&mut conn, &outgoing).unwrap();
        assert_eq!(mentions_for_message(&conn, message.id).unwrap().len(), 1);

        assert!(delete_message(&mut conn, message.id).unwrap());
        assert!(mentions_for_message(&conn, message.id).unwrap().is_empty());
        assert!(get_message(&conn, message.id).unwrap().is_none());

        // Deleting again reports nothing removed
        assert!(!delete_message(&mut conn, message.id).unwrap());
    }

    #[test]
    fn test_mark_read_and_unread_count() {
        let conn = test_db();
        let trigger = notify::mention_trigger(7, "alice", 1, 99);
        let id = insert_notification(&conn, &trigger).unwrap().unwrap();

        assert_eq!(unread_count(&conn, 7).unwrap(), 1);
        assert!(mark_read(&conn, id).unwrap());
        assert_eq!(unread_count(&conn, 7).unwrap(), 0);
        assert!(!mark_read(&conn, 9999).unwrap());
    }

    #[test]
    fn test_sweep_removes_only_old_rows() {
        let conn = test_db();
        let trigger = notify::mention_trigger(7, "alice", 1, 99);
        insert_notification(&conn, &trigger).unwrap();

        // Backdate one row past the cutoff
        conn.execute(
            "INSERT INTO notifications (recipient_id, kind, title, body, created_at)
             VALUES (8, 'system', 'old', 'old', datetime('now', '-400 days'))",
            [],
        )
        .unwrap();

        let removed = sweep_notifications(&conn, 90).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(list_notifications(&conn, 7, 10).unwrap().len(), 1);
        assert!(list_notifications(&conn, 8, 10).unwrap().is_empty());
    }

    #[test]
    fn test_status_counts() {
        let conn = test_db();
        let (alice, _) = seed_room(&conn);
        insert_message(&conn, 1, alice, "x", MessageKind::Text, None).unwrap();
        let trigger = notify::mention_trigger(7, "alice", 1, 1);
        let id = insert_notification(&conn, &trigger).unwrap().unwrap();
        insert_notification(&conn, &notify::mention_trigger(8, "alice", 1, 1)).unwrap();
        mark_read(&conn, id).unwrap();

        assert_eq!(message_count(&conn).unwrap(), 1);
        assert_eq!(notification_counts(&conn).unwrap(), (2, 1));
    }
}
