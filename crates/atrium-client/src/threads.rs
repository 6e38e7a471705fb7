//! Thread aggregation over the durable snapshot.
//!
//! Derives a "threads I participate in" digest purely from persisted
//! channels, messages, and read cursors.  No network, no in-memory session
//! state: the result is reproducible from the snapshot alone.

use std::collections::HashMap;

use atrium_shared::constants::PREVIEW_MAX_CHARS;
use atrium_shared::{ChannelId, Message, Scope, UserId};
use atrium_store::Database;

use crate::error::Result;

/// One thread the user participates in, ready for display.
#[derive(Debug, Clone)]
pub struct ThreadItem {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub root: Message,
    pub replies: Vec<Message>,
    /// Timestamp of the latest activity: the last reply, or the root if
    /// no replies are stored locally.
    pub last_ts: i64,
    /// Replies strictly newer than the channel's read cursor.
    pub unread: usize,
    pub preview: String,
}

/// Collect the threads in `scope` that `me` participates in, newest
/// activity first.
///
/// A root message is a thread when it has locally stored replies or a
/// server-reported reply count; the user participates when they authored
/// the root or any stored reply.  Direct-message channels never surface
/// threads.
pub fn aggregate_threads(db: &Database, scope: &Scope, me: &UserId) -> Result<Vec<ThreadItem>> {
    let mut items = Vec::new();

    for channel in db.list_channels(scope)? {
        if channel.is_direct() {
            continue;
        }

        let log = db.messages_for_channel(scope, &channel.id)?;
        let cursor = db.read_cursor(scope, &channel.id)?;

        let mut replies_by_root: HashMap<&str, Vec<&Message>> = HashMap::new();
        for message in &log {
            if let Some(parent) = &message.parent_id {
                replies_by_root.entry(parent.as_str()).or_default().push(message);
            }
        }

        for root in log.iter().filter(|m| m.parent_id.is_none()) {
            let replies = replies_by_root
                .get(root.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            // thread_count covers replies the server knows about but the
            // local log has not fetched yet.
            let is_thread = !replies.is_empty() || root.thread_count.unwrap_or(0) > 0;
            if !is_thread {
                continue;
            }

            let participates =
                root.author_id == *me || replies.iter().any(|r| r.author_id == *me);
            if !participates {
                continue;
            }

            // messages_for_channel orders by ts; replies inherit it.
            let mut replies: Vec<Message> = replies.iter().map(|&r| r.clone()).collect();
            replies.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.as_str().cmp(b.id.as_str())));

            let last_ts = replies.last().map(|r| r.ts).unwrap_or(root.ts);
            let unread = replies.iter().filter(|r| r.ts > cursor).count();

            let latest = replies.last().unwrap_or(root);
            let preview: String = latest
                .text
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(PREVIEW_MAX_CHARS)
                .collect();

            items.push(ThreadItem {
                channel_id: channel.id.clone(),
                channel_name: channel.display_name().to_string(),
                root: root.clone(),
                replies,
                last_ts,
                unread,
                preview,
            });
        }
    }

    // Newest activity first; root id breaks ties so the order is stable
    // across runs.
    items.sort_by(|a, b| b.last_ts.cmp(&a.last_ts).then_with(|| a.root.id.as_str().cmp(b.root.id.as_str())));
    Ok(items)
}
