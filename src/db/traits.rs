// Database trait — backend-agnostic async interface for all DB operations.
//
// Implementor: SqliteDatabase (wraps rusqlite). All methods are async so a
// native async backend could sit behind the same interface later.
//
// The trait mirrors the queries.rs function signatures, so callers hold an
// `Arc<dyn Database>` and never touch a Connection directly. send_message
// is the one compound operation: the whole message + mentions +
// notifications unit runs in a single transaction under a single lock.

use anyhow::Result;
use async_trait::async_trait;

use super::models::{Mention, Message, Notification, OutgoingMessage, RoomMember, User};
use crate::notify::NotificationTrigger;

#[async_trait]
pub trait Database: Send + Sync {
    // --- Lifecycle ---

    /// Count the number of user-created tables in the database.
    async fn table_count(&self) -> Result<i64>;

    // --- Users & membership ---

    /// Create a user and return their id.
    async fn create_user(&self, username: &str) -> Result<i64>;

    /// Look up a user by username (case-insensitive).
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Add a user to a room (no-op if already a member).
    async fn add_room_member(&self, room_id: i64, user_id: i64) -> Result<()>;

    /// The member set mentions resolve against.
    async fn room_members(&self, room_id: i64) -> Result<Vec<RoomMember>>;

    // --- Messages ---

    /// Run the atomic send transaction: insert the message, its mentions,
    /// and their notifications; roll back entirely on any failure.
    async fn send_message(&self, outgoing: OutgoingMessage) -> Result<Message>;

    /// Read a room's messages newest-first with limit/offset. Content is
    /// returned as stored (envelope or legacy plaintext).
    async fn fetch_messages(&self, room_id: i64, limit: u32, offset: u32) -> Result<Vec<Message>>;

    /// Hard-delete a message and its mention rows.
    async fn delete_message(&self, message_id: i64) -> Result<bool>;

    /// The mention rows for one message.
    async fn mentions_for_message(&self, message_id: i64) -> Result<Vec<Mention>>;

    // --- Notifications ---

    /// Idempotent fan-out for callers outside the send path (post/comment
    /// handlers). Runs in its own transaction.
    async fn dispatch_notifications(&self, triggers: Vec<NotificationTrigger>) -> Result<Vec<i64>>;

    /// A recipient's notifications, newest first.
    async fn list_notifications(&self, recipient_id: i64, limit: u32) -> Result<Vec<Notification>>;

    /// How many unread notifications a recipient has.
    async fn unread_count(&self, recipient_id: i64) -> Result<i64>;

    /// Flip a notification's read flag.
    async fn mark_read(&self, notification_id: i64) -> Result<bool>;

    /// Delete notifications older than the given number of days.
    async fn sweep_notifications(&self, older_than_days: i64) -> Result<usize>;

    // --- Status ---

    async fn message_count(&self) -> Result<i64>;

    /// (total, unread) notification counts across all recipients.
    async fn notification_counts(&self) -> Result<(i64, i64)>;
}
