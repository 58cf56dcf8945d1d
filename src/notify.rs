// Notification fan-out — turns trigger events into deduplicated rows.
//
// A trigger is idempotent per (recipient, kind, related-entity) signature:
// dispatch checks for an existing row before inserting, inside whatever
// transaction the caller already holds, and the unique signature index
// absorbs the race when two identical triggers slip through that window
// concurrently. A duplicate is not an error — it's silently a no-op.
//
// The send transaction fans out chat mentions; post/comment handlers build
// their own triggers and go through the same dispatch.

use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

use crate::db::models::NotificationKind;
use crate::db::queries;

/// One notification-worthy event for one recipient.
#[derive(Debug, Clone)]
pub struct NotificationTrigger {
    pub recipient_id: i64,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub related_type: Option<String>,
    pub related_id: Option<i64>,
}

/// Trigger for a resolved @mention inside a chat message.
pub fn mention_trigger(
    recipient_id: i64,
    sender_name: &str,
    room_id: i64,
    message_id: i64,
) -> NotificationTrigger {
    NotificationTrigger {
        recipient_id,
        kind: NotificationKind::ChatMention,
        title: "You were mentioned".to_string(),
        body: format!("{sender_name} mentioned you in room {room_id}"),
        related_type: Some("message".to_string()),
        related_id: Some(message_id),
    }
}

/// Trigger for a new comment on a post.
pub fn post_comment_trigger(
    recipient_id: i64,
    commenter_name: &str,
    post_id: i64,
) -> NotificationTrigger {
    NotificationTrigger {
        recipient_id,
        kind: NotificationKind::PostComment,
        title: "New comment on your post".to_string(),
        body: format!("{commenter_name} commented on your post"),
        related_type: Some("post".to_string()),
        related_id: Some(post_id),
    }
}

/// Insert a notification per trigger unless one with the same signature
/// already exists. Returns the ids actually created, in trigger order.
///
/// Must run inside the caller's transaction when the triggers belong to a
/// larger atomic unit (the send path does this).
pub fn dispatch(conn: &Connection, triggers: &[NotificationTrigger]) -> Result<Vec<i64>> {
    let mut created = Vec::new();
    for trigger in triggers {
        if queries::notification_exists(
            conn,
            trigger.recipient_id,
            trigger.kind.as_str(),
            trigger.related_type.as_deref(),
            trigger.related_id,
        )? {
            debug!(
                recipient = trigger.recipient_id,
                kind = trigger.kind.as_str(),
                "duplicate trigger absorbed"
            );
            continue;
        }
        // The unique index can still reject a concurrent duplicate here;
        // insert_notification reports that as None rather than an error.
        if let Some(id) = queries::insert_notification(conn, trigger)? {
            created.push(id);
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    #[test]
    fn test_dispatch_creates_rows() {
        let conn = test_db();
        let triggers = vec![
            mention_trigger(2, "alice", 1, 10),
            mention_trigger(3, "alice", 1, 10),
        ];
        let created = dispatch(&conn, &triggers).unwrap();
        assert_eq!(created.len(), 2);
    }

    #[test]
    fn test_duplicate_trigger_is_a_noop() {
        let conn = test_db();
        let trigger = mention_trigger(2, "alice", 1, 10);

        let first = dispatch(&conn, std::slice::from_ref(&trigger)).unwrap();
        assert_eq!(first.len(), 1);

        // Retrying the same trigger creates nothing
        let second = dispatch(&conn, std::slice::from_ref(&trigger)).unwrap();
        assert!(second.is_empty());
        assert_eq!(queries::list_notifications(&conn, 2, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_same_recipient_different_entity_both_land() {
        let conn = test_db();
        let created = dispatch(
            &conn,
            &[mention_trigger(2, "alice", 1, 10), mention_trigger(2, "alice", 1, 11)],
        )
        .unwrap();
        assert_eq!(created.len(), 2);
    }

    #[test]
    fn test_signature_spans_kind() {
        let conn = test_db();
        // Same recipient + related entity, different kinds: both land
        let created = dispatch(
            &conn,
            &[
                mention_trigger(2, "alice", 1, 10),
                NotificationTrigger {
                    recipient_id: 2,
                    kind: NotificationKind::ChatMessage,
                    title: "New message".to_string(),
                    body: "alice sent a message".to_string(),
                    related_type: Some("message".to_string()),
                    related_id: Some(10),
                },
            ],
        )
        .unwrap();
        assert_eq!(created.len(), 2);
    }

    #[test]
    fn test_post_comment_trigger_dedups_too() {
        let conn = test_db();
        let trigger = post_comment_trigger(5, "carol", 77);
        assert_eq!(dispatch(&conn, std::slice::from_ref(&trigger)).unwrap().len(), 1);
        assert!(dispatch(&conn, std::slice::from_ref(&trigger)).unwrap().is_empty());
    }
}
