use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::params;

use aura_shared::types::{MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{DeliveryStatus, Message, MessageKind};

impl Database {
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, kind, media_url, sent_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id.as_str(),
                message.sender.as_str(),
                message.receiver.as_str(),
                message.content,
                message.kind.as_str(),
                message.media_url,
                message.sent_at.to_rfc3339(),
                message.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Messages exchanged between two peers, oldest first.
    pub fn conversation(
        &self,
        a: &UserId,
        b: &UserId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, content, kind, media_url, sent_at, status
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY sent_at ASC
             LIMIT ?3 OFFSET ?4",
        )?;

        let rows = stmt.query_map(
            params![a.as_str(), b.as_str(), limit, offset],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: &MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, sender_id, receiver_id, content, kind, media_url, sent_at, status
                 FROM messages WHERE id = ?1",
                params![id.as_str()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Mark every message sent to `recipient` that is still `sent` as
    /// `delivered`. Returns the number of rows updated.
    pub fn mark_delivered(&self, recipient: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET status = 'delivered'
             WHERE receiver_id = ?1 AND status = 'sent'",
            params![recipient.as_str()],
        )?;
        Ok(affected)
    }

    /// Mark every message from `sender` to `recipient` as `read` (invoked
    /// when the recipient opens the conversation).
    pub fn mark_read(&self, recipient: &UserId, sender: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET status = 'read'
             WHERE receiver_id = ?1 AND sender_id = ?2 AND status != 'read'",
            params![recipient.as_str(), sender.as_str()],
        )?;
        Ok(affected)
    }

    /// Per-sender counts of messages addressed to `recipient` that have
    /// not been read yet.
    pub fn unread_counts(&self, recipient: &UserId) -> Result<HashMap<UserId, u32>> {
        let mut stmt = self.conn().prepare(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND status != 'read'
             GROUP BY sender_id",
        )?;

        let rows = stmt.query_map(params![recipient.as_str()], |row| {
            let sender: String = row.get(0)?;
            let count: u32 = row.get(1)?;
            Ok((UserId::new(sender), count))
        })?;

        let mut counts = HashMap::new();
        for row in rows {
            let (sender, count) = row?;
            counts.insert(sender, count);
        }
        Ok(counts)
    }

    /// Delete the conversation between two peers in both directions.
    pub fn clear_conversation(&self, a: &UserId, b: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)",
            params![a.as_str(), b.as_str()],
        )?;
        tracing::debug!(removed = affected, "conversation cleared");
        Ok(affected)
    }

    /// Case-insensitive content search within one conversation.
    pub fn search_conversation(
        &self,
        a: &UserId,
        b: &UserId,
        query: &str,
    ) -> Result<Vec<Message>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, content, kind, media_url, sent_at, status
             FROM messages
             WHERE ((sender_id = ?1 AND receiver_id = ?2)
                 OR (sender_id = ?2 AND receiver_id = ?1))
               AND LOWER(content) LIKE ?3
             ORDER BY sent_at ASC",
        )?;

        let rows = stmt.query_map(params![a.as_str(), b.as_str(), pattern], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let receiver: String = row.get(2)?;
    let content: String = row.get(3)?;
    let kind: String = row.get(4)?;
    let media_url: Option<String> = row.get(5)?;
    let sent_at_str: String = row.get(6)?;
    let status: String = row.get(7)?;

    let sent_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&sent_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: MessageId(id),
        sender: UserId::new(sender),
        receiver: UserId::new(receiver),
        content,
        kind: MessageKind::parse(&kind),
        media_url,
        sent_at,
        status: DeliveryStatus::parse(&status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    #[test]
    fn test_conversation_ordering() {
        let (_dir, db) = open_db();

        let mut first = Message::text(uid("u1"), uid("u2"), "first");
        first.sent_at = Utc::now() - chrono::Duration::seconds(10);
        let second = Message::text(uid("u2"), uid("u1"), "second");

        db.insert_message(&second).unwrap();
        db.insert_message(&first).unwrap();

        let convo = db.conversation(&uid("u1"), &uid("u2"), 50, 0).unwrap();
        assert_eq!(convo.len(), 2);
        assert_eq!(convo[0].content, "first");
        assert_eq!(convo[1].content, "second");
    }

    #[test]
    fn test_conversation_excludes_other_pairs() {
        let (_dir, db) = open_db();

        db.insert_message(&Message::text(uid("u1"), uid("u2"), "ours"))
            .unwrap();
        db.insert_message(&Message::text(uid("u1"), uid("u3"), "theirs"))
            .unwrap();

        let convo = db.conversation(&uid("u1"), &uid("u2"), 50, 0).unwrap();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo[0].content, "ours");
    }

    #[test]
    fn test_status_transitions() {
        let (_dir, db) = open_db();

        let msg = Message::text(uid("u1"), uid("u2"), "hi");
        db.insert_message(&msg).unwrap();

        assert_eq!(db.mark_delivered(&uid("u2")).unwrap(), 1);
        assert_eq!(
            db.get_message(&msg.id).unwrap().status,
            DeliveryStatus::Delivered
        );

        assert_eq!(db.mark_read(&uid("u2"), &uid("u1")).unwrap(), 1);
        assert_eq!(db.get_message(&msg.id).unwrap().status, DeliveryStatus::Read);

        // Already read: nothing left to update
        assert_eq!(db.mark_delivered(&uid("u2")).unwrap(), 0);
        assert_eq!(db.mark_read(&uid("u2"), &uid("u1")).unwrap(), 0);
    }

    #[test]
    fn test_unread_counts_per_sender() {
        let (_dir, db) = open_db();

        db.insert_message(&Message::text(uid("u1"), uid("me"), "a"))
            .unwrap();
        db.insert_message(&Message::text(uid("u1"), uid("me"), "b"))
            .unwrap();
        db.insert_message(&Message::text(uid("u2"), uid("me"), "c"))
            .unwrap();
        // Outgoing messages never count
        db.insert_message(&Message::text(uid("me"), uid("u1"), "d"))
            .unwrap();

        let counts = db.unread_counts(&uid("me")).unwrap();
        assert_eq!(counts.get(&uid("u1")), Some(&2));
        assert_eq!(counts.get(&uid("u2")), Some(&1));

        db.mark_read(&uid("me"), &uid("u1")).unwrap();
        let counts = db.unread_counts(&uid("me")).unwrap();
        assert_eq!(counts.get(&uid("u1")), None);
    }

    #[test]
    fn test_clear_conversation_both_directions() {
        let (_dir, db) = open_db();

        db.insert_message(&Message::text(uid("u1"), uid("u2"), "a"))
            .unwrap();
        db.insert_message(&Message::text(uid("u2"), uid("u1"), "b"))
            .unwrap();
        db.insert_message(&Message::text(uid("u1"), uid("u3"), "keep"))
            .unwrap();

        assert_eq!(db.clear_conversation(&uid("u1"), &uid("u2")).unwrap(), 2);
        assert!(db.conversation(&uid("u1"), &uid("u2"), 50, 0).unwrap().is_empty());
        assert_eq!(db.conversation(&uid("u1"), &uid("u3"), 50, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let (_dir, db) = open_db();

        db.insert_message(&Message::text(uid("u1"), uid("u2"), "Neural Link established"))
            .unwrap();
        db.insert_message(&Message::text(uid("u2"), uid("u1"), "plain text"))
            .unwrap();

        let hits = db
            .search_conversation(&uid("u1"), &uid("u2"), "neural")
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Neural Link established");
    }

    #[test]
    fn test_image_message_roundtrip() {
        let (_dir, db) = open_db();

        let msg = Message::image(uid("u1"), uid("u2"), "", "data:image/png;base64,AAAA");
        db.insert_message(&msg).unwrap();

        let restored = db.get_message(&msg.id).unwrap();
        assert_eq!(restored.kind, MessageKind::Image);
        assert_eq!(
            restored.media_url.as_deref(),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[test]
    fn test_get_missing_message() {
        let (_dir, db) = open_db();
        let missing = db.get_message(&MessageId("PKT-MISSING00".into()));
        assert!(matches!(missing, Err(StoreError::NotFound)));
    }
}
