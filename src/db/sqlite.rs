// SqliteDatabase — rusqlite backend implementing the Database trait.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Send.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points — Rust enforces this because
// MutexGuard is !Send.
//
// The free functions in queries.rs remain usable against a bare Connection,
// which is what the unit tests do.

use anyhow::Result;
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{Mention, Message, Notification, OutgoingMessage, RoomMember, User};
use super::traits::Database;
use crate::notify::{self, NotificationTrigger};

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }

    async fn create_user(&self, username: &str) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::create_user(&conn, username)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().await;
        super::queries::get_user_by_username(&conn, username)
    }

    async fn add_room_member(&self, room_id: i64, user_id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        super::queries::add_room_member(&conn, room_id, user_id)
    }

    async fn room_members(&self, room_id: i64) -> Result<Vec<RoomMember>> {
        let conn = self.conn.lock().await;
        super::queries::get_room_members(&conn, room_id)
    }

    async fn send_message(&self, outgoing: OutgoingMessage) -> Result<Message> {
        let mut conn = self.conn.lock().await;
        super::queries::send_message_tx(&mut conn, &outgoing)
    }

    async fn fetch_messages(&self, room_id: i64, limit: u32, offset: u32) -> Result<Vec<Message>> {
        let conn = self.conn.lock().await;
        super::queries::fetch_messages(&conn, room_id, limit, offset)
    }

    async fn delete_message(&self, message_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock().await;
        super::queries::delete_message(&mut conn, message_id)
    }

    async fn mentions_for_message(&self, message_id: i64) -> Result<Vec<Mention>> {
        let conn = self.conn.lock().await;
        super::queries::mentions_for_message(&conn, message_id)
    }

    async fn dispatch_notifications(&self, triggers: Vec<NotificationTrigger>) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let created = notify::dispatch(&tx, &triggers)?;
        tx.commit()?;
        Ok(created)
    }

    async fn list_notifications(&self, recipient_id: i64, limit: u32) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().await;
        super::queries::list_notifications(&conn, recipient_id, limit)
    }

    async fn unread_count(&self, recipient_id: i64) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::unread_count(&conn, recipient_id)
    }

    async fn mark_read(&self, notification_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        super::queries::mark_read(&conn, notification_id)
    }

    async fn sweep_notifications(&self, older_than_days: i64) -> Result<usize> {
        let conn = self.conn.lock().await;
        super::queries::sweep_notifications(&conn, older_than_days)
    }

    async fn message_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::message_count(&conn)
    }

    async fn notification_counts(&self) -> Result<(i64, i64)> {
        let conn = self.conn.lock().await;
        super::queries::notification_counts(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::MessageKind;
    use crate::db::schema::create_tables;

    async fn test_db() -> SqliteDatabase {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        SqliteDatabase::new(conn)
    }

    #[tokio::test]
    async fn test_trait_user_roundtrip() {
        let db = test_db().await;
        let id = db.create_user("alice").await.unwrap();
        let found = db.get_user_by_username("ALICE").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(db.get_user_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_trait_send_and_fetch() {
        let db = test_db().await;
        let alice = db.create_user("alice").await.unwrap();
        let bob = db.create_user("bob").await.unwrap();
        db.add_room_member(1, alice).await.unwrap();
        db.add_room_member(1, bob).await.unwrap();

        let message = db
            .send_message(OutgoingMessage {
                room_id: 1,
                sender_id: alice,
                stored_content: "stored".to_string(),
                plaintext: "hi @bob".to_string(),
                kind: MessageKind::Text,
                attachment_ref: None,
            })
            .await
            .unwrap();

        let fetched = db.fetch_messages(1, 10, 0).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, message.id);

        assert_eq!(db.mentions_for_message(message.id).await.unwrap().len(), 1);
        assert_eq!(db.unread_count(bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trait_dispatch_is_idempotent() {
        let db = test_db().await;
        let trigger = notify::mention_trigger(5, "alice", 1, 10);
        let first = db.dispatch_notifications(vec![trigger.clone()]).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = db.dispatch_notifications(vec![trigger]).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_trait_table_count() {
        let db = test_db().await;
        assert_eq!(db.table_count().await.unwrap(), 6);
    }
}
