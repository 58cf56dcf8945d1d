// Data models — Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use serde::{Deserialize, Serialize};

/// A platform user, as far as this pipeline needs to know one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

/// A member of a chat room — the set mentions resolve against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMember {
    pub user_id: i64,
    pub username: String,
}

/// What kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Image,
    Voice,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Voice => "voice",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }

    /// Parse a stored kind. Unknown values read as text so a schema
    /// evolution never breaks the fetch path.
    pub fn from_str(s: &str) -> Self {
        match s {
            "image" => MessageKind::Image,
            "voice" => MessageKind::Voice,
            "file" => MessageKind::File,
            "system" => MessageKind::System,
            _ => MessageKind::Text,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A chat message. `content` holds whatever the caller put there: the
/// stored envelope when it comes out of the query layer, plaintext once
/// the MessageWriter has decrypted it. Immutable after insert except for
/// hard deletion, which cascades the mention rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub room_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub kind: MessageKind,
    pub attachment_ref: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input to the send transaction. Carries both the envelope to persist and
/// the plaintext, because mention scanning runs on the plaintext inside the
/// same transaction that inserts the row.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub room_id: i64,
    pub sender_id: i64,
    /// Envelope (or plaintext, if no codec is in play) — what hits the disk
    pub stored_content: String,
    /// What the sender typed — scanned for @mentions, never persisted
    pub plaintext: String,
    pub kind: MessageKind,
    pub attachment_ref: Option<String>,
}

/// A structured record linking a message to a user it referenced via
/// "@username". Write-once; deleted only with its owning message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub created_at: String,
}

/// Well-known notification kinds. Stored as plain text — the notifications
/// table also carries kinds minted by other subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    ChatMention,
    ChatMessage,
    PostComment,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ChatMention => "chat_mention",
            NotificationKind::ChatMessage => "chat_message",
            NotificationKind::PostComment => "post_comment",
            NotificationKind::System => "system",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A notification row. Mutable only via the read flag; removed by the
/// age-based retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    /// One of the NotificationKind strings, or a kind another subsystem minted
    pub kind: String,
    pub title: String,
    pub body: String,
    pub related_type: Option<String>,
    pub related_id: Option<i64>,
    pub read: bool,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_round_trip() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::Voice,
            MessageKind::File,
            MessageKind::System,
        ] {
            assert_eq!(MessageKind::from_str(kind.as_str()), kind);
        }
    }

    #[test]
    fn test_unknown_kind_reads_as_text() {
        assert_eq!(MessageKind::from_str("hologram"), MessageKind::Text);
    }

    #[test]
    fn test_notification_kind_strings() {
        assert_eq!(NotificationKind::ChatMention.as_str(), "chat_mention");
        assert_eq!(NotificationKind::PostComment.to_string(), "post_comment");
    }
}
