//! Snapshot operations for per-channel message logs.

use rusqlite::params;

use atrium_shared::{ChannelId, Message, MessageId, Scope, UserId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Append one message to a channel log.  Re-appending the same id
    /// overwrites in place, which is how edits reach the snapshot.
    pub fn append_message(
        &self,
        scope: &Scope,
        channel_id: &ChannelId,
        message: &Message,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO messages
                 (scope, channel_id, id, author_id, author, text, ts,
                  parent_id, thread_count, mentions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                scope.key(),
                channel_id.as_str(),
                message.id.as_str(),
                message.author_id.as_str(),
                message.author,
                message.text,
                message.ts,
                message.parent_id.as_ref().map(MessageId::as_str),
                message.thread_count,
                serde_json::to_string(&message.mentions).unwrap_or_else(|_| "[]".to_string()),
            ],
        )?;
        Ok(())
    }

    /// Replace a channel's whole log in one transaction (full-log flush
    /// after a history fetch or refresh).
    pub fn replace_messages(
        &mut self,
        scope: &Scope,
        channel_id: &ChannelId,
        messages: &[Message],
    ) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE scope = ?1 AND channel_id = ?2",
            params![scope.key(), channel_id.as_str()],
        )?;
        for message in messages {
            tx.execute(
                "INSERT OR REPLACE INTO messages
                     (scope, channel_id, id, author_id, author, text, ts,
                      parent_id, thread_count, mentions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    scope.key(),
                    channel_id.as_str(),
                    message.id.as_str(),
                    message.author_id.as_str(),
                    message.author,
                    message.text,
                    message.ts,
                    message.parent_id.as_ref().map(MessageId::as_str),
                    message.thread_count,
                    serde_json::to_string(&message.mentions).unwrap_or_else(|_| "[]".to_string()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Load a channel's log, ordered ascending by timestamp.
    pub fn messages_for_channel(
        &self,
        scope: &Scope,
        channel_id: &ChannelId,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, author_id, author, text, ts, parent_id, thread_count, mentions
             FROM messages
             WHERE scope = ?1 AND channel_id = ?2
             ORDER BY ts ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![scope.key(), channel_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let author_id: String = row.get(1)?;
    let author: String = row.get(2)?;
    let text: Option<String> = row.get(3)?;
    let ts: i64 = row.get(4)?;
    let parent_id: Option<String> = row.get(5)?;
    let thread_count: Option<u32> = row.get(6)?;
    let mentions_json: String = row.get(7)?;

    // Malformed persisted mention lists decode to empty, never an error.
    let mentions: Vec<String> = serde_json::from_str(&mentions_json).unwrap_or_default();

    Ok(Message {
        id: MessageId::new(id),
        author_id: UserId::new(author_id),
        author,
        text,
        ts,
        parent_id: parent_id.map(MessageId::new),
        thread_count,
        mentions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new("teamA", "projA")
    }

    fn msg(id: &str, ts: i64) -> Message {
        Message {
            id: MessageId::new(id),
            author_id: UserId::new("u1"),
            author: "Alice".into(),
            text: Some(format!("text of {id}")),
            ts,
            parent_id: None,
            thread_count: None,
            mentions: vec![],
        }
    }

    #[test]
    fn logs_come_back_ascending_by_ts() {
        let db = Database::open_in_memory().unwrap();
        let channel = ChannelId::new("c1");

        db.append_message(&scope(), &channel, &msg("m2", 200)).unwrap();
        db.append_message(&scope(), &channel, &msg("m1", 100)).unwrap();

        let got = db.messages_for_channel(&scope(), &channel).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].id.as_str(), "m1");
        assert_eq!(got[1].id.as_str(), "m2");
    }

    #[test]
    fn replace_is_a_full_flush() {
        let mut db = Database::open_in_memory().unwrap();
        let channel = ChannelId::new("c1");

        db.append_message(&scope(), &channel, &msg("old", 1)).unwrap();
        db.replace_messages(&scope(), &channel, &[msg("m1", 100), msg("m2", 200)])
            .unwrap();

        let got = db.messages_for_channel(&scope(), &channel).unwrap();
        assert_eq!(got.len(), 2);
        assert!(got.iter().all(|m| m.id.as_str() != "old"));
    }

    #[test]
    fn reappend_same_id_overwrites() {
        let db = Database::open_in_memory().unwrap();
        let channel = ChannelId::new("c1");

        db.append_message(&scope(), &channel, &msg("m1", 100)).unwrap();
        let mut edited = msg("m1", 100);
        edited.text = Some("edited".into());
        db.append_message(&scope(), &channel, &edited).unwrap();

        let got = db.messages_for_channel(&scope(), &channel).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text.as_deref(), Some("edited"));
    }

    #[test]
    fn malformed_mentions_decode_to_empty() {
        let db = Database::open_in_memory().unwrap();
        let channel = ChannelId::new("c1");

        db.conn()
            .execute(
                "INSERT INTO messages
                     (scope, channel_id, id, author_id, author, text, ts, mentions)
                 VALUES (?1, ?2, 'm1', 'u1', 'Alice', 'hi', 100, 'not json')",
                params![scope().key(), channel.as_str()],
            )
            .unwrap();

        let got = db.messages_for_channel(&scope(), &channel).unwrap();
        assert_eq!(got.len(), 1);
        assert!(got[0].mentions.is_empty());
    }

    #[test]
    fn logs_are_scoped() {
        let db = Database::open_in_memory().unwrap();
        let channel = ChannelId::new("c1");
        let other = Scope::new("teamB", "projB");

        db.append_message(&scope(), &channel, &msg("m1", 100)).unwrap();

        assert!(db.messages_for_channel(&other, &channel).unwrap().is_empty());
    }
}
