//! Read-cursor & mention tracker.
//!
//! Advances per-channel read cursors (monotonically, never rewinding),
//! re-broadcasts read state on a heartbeat while a channel view is mounted,
//! and scans newly arrived messages for mentions of the current user.
//!
//! The mention scan keeps a per-channel "processed count": only messages
//! past it are examined, so a full log replacement never re-alerts as long
//! as the count strictly grows.  The count resets when the observed channel
//! changes, keyed to the channel id rather than to the log length.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use atrium_net::SocketManager;
use atrium_shared::constants::READ_BROADCAST_INTERVAL;
use atrium_shared::protocol::ClientFrame;
use atrium_shared::{ChannelId, Message, Scope, UserId};
use atrium_store::Database;

use crate::bus::{AppEvent, EventBus};
use crate::error::{ClientError, Result};

/// Callback invoked when a newly arrived message mentions the current user.
pub type MentionCallback = Box<dyn Fn(&str, &str) + Send + Sync>;

struct ScanState {
    channel: Option<ChannelId>,
    processed: usize,
}

/// Highest timestamp seen, bound to the channel it was seen in.  Switching
/// channels resets the position so one channel's progress never leaks into
/// another's read receipts.
struct SeenState {
    channel: Option<ChannelId>,
    ts: i64,
}

pub struct ReadTracker {
    db: Arc<Mutex<Database>>,
    socket: Arc<SocketManager>,
    bus: EventBus,
    me_id: UserId,
    me_name: String,
    seen: Arc<Mutex<SeenState>>,
    scan: Mutex<ScanState>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    on_mention: Mutex<Option<MentionCallback>>,
}

impl ReadTracker {
    pub fn new(
        db: Arc<Mutex<Database>>,
        socket: Arc<SocketManager>,
        bus: EventBus,
        me_id: UserId,
        me_name: impl Into<String>,
    ) -> Self {
        Self {
            db,
            socket,
            bus,
            me_id,
            me_name: me_name.into(),
            seen: Arc::new(Mutex::new(SeenState {
                channel: None,
                ts: 0,
            })),
            scan: Mutex::new(ScanState {
                channel: None,
                processed: 0,
            }),
            heartbeat: Mutex::new(None),
            on_mention: Mutex::new(None),
        }
    }

    /// Register the host-UI alert callback.  Replaces any previous one.
    pub fn set_on_mention(&self, callback: MentionCallback) -> Result<()> {
        *self.lock(&self.on_mention, "on_mention")? = Some(callback);
        Ok(())
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
        mutex
            .lock()
            .map_err(|e| ClientError::State(format!("{what} lock poisoned: {e}")))
    }

    // ------------------------------------------------------------------
    // Read cursors
    // ------------------------------------------------------------------

    /// Advance the read cursor for a channel to `max(current, ts)`.
    /// Returns the stored cursor; never regresses.
    pub fn mark_channel_read(&self, scope: &Scope, channel: &ChannelId, ts: i64) -> Result<i64> {
        let stored = self
            .lock(&self.db, "snapshot")?
            .advance_read_cursor(scope, channel, ts)?;
        self.bus.publish(AppEvent::ReadCursorMoved {
            channel: channel.clone(),
            ts: stored,
        });
        Ok(stored)
    }

    /// Record the latest timestamp seen in `channel`, independent of the
    /// persisted per-channel cursors.  Moving to a different channel resets
    /// the position rather than carrying the old maximum over.
    pub fn mark_seen_up_to(&self, channel: &ChannelId, ts: i64) -> Result<()> {
        let mut seen = self.lock(&self.seen, "seen")?;
        if seen.channel.as_ref() != Some(channel) {
            seen.channel = Some(channel.clone());
            seen.ts = ts;
        } else {
            seen.ts = seen.ts.max(ts);
        }
        Ok(())
    }

    pub fn seen_up_to(&self) -> Result<i64> {
        Ok(self.lock(&self.seen, "seen")?.ts)
    }

    /// Tell other participants this user has read up to `ts`.
    pub async fn broadcast_read(&self, channel: &ChannelId, ts: i64) {
        let sent = self
            .socket
            .publish(ClientFrame::ReadReceipt {
                user_id: self.me_id.clone(),
                user_name: self.me_name.clone(),
                channel_id: channel.clone(),
                ts,
            })
            .await;
        if !sent {
            debug!(channel = %channel, "read receipt dropped: socket offline");
        }
    }

    // ------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------

    /// Start re-broadcasting read state for `channel` on a fixed interval,
    /// keeping read receipts accurate even without new messages.  Any
    /// previous heartbeat is stopped first; the interval never leaks across
    /// channel switches.
    pub fn start_heartbeat(&self, channel: ChannelId) -> Result<()> {
        let mut guard = self.lock(&self.heartbeat, "heartbeat")?;
        if let Some(old) = guard.take() {
            old.abort();
        }

        // Claim the seen position for this channel; a stale maximum from a
        // previously viewed channel must not be broadcast as read progress
        // here.
        {
            let mut seen = self.lock(&self.seen, "seen")?;
            if seen.channel.as_ref() != Some(&channel) {
                seen.channel = Some(channel.clone());
                seen.ts = 0;
            }
        }

        let socket = Arc::clone(&self.socket);
        let seen = Arc::clone(&self.seen);
        let user_id = self.me_id.clone();
        let user_name = self.me_name.clone();

        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(READ_BROADCAST_INTERVAL);
            loop {
                interval.tick().await;
                let ts = match seen.lock() {
                    Ok(s) if s.channel.as_ref() == Some(&channel) => s.ts,
                    Ok(_) => 0,
                    Err(e) => {
                        warn!(error = %e, "seen position unavailable; stopping heartbeat");
                        break;
                    }
                };
                socket
                    .publish(ClientFrame::ReadReceipt {
                        user_id: user_id.clone(),
                        user_name: user_name.clone(),
                        channel_id: channel.clone(),
                        ts,
                    })
                    .await;
            }
        }));
        Ok(())
    }

    /// Stop the heartbeat (channel view unmounted or switched).
    pub fn stop_heartbeat(&self) -> Result<()> {
        if let Some(task) = self.lock(&self.heartbeat, "heartbeat")?.take() {
            task.abort();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mention detection
    // ------------------------------------------------------------------

    /// Scan a channel's log for mentions of the current user among messages
    /// appended since the last call.  Already-seen messages are never
    /// re-scanned; switching channels resets the scan.
    pub fn observe(&self, channel: &ChannelId, messages: &[Message]) -> Result<()> {
        let mut scan = self.lock(&self.scan, "scan")?;

        if scan.channel.as_ref() != Some(channel) {
            scan.channel = Some(channel.clone());
            scan.processed = 0;
        }

        // A shrunken log within the same channel (e.g. a refresh replaced
        // it) must not index out of range.
        let start = scan.processed.min(messages.len());

        for message in &messages[start..] {
            if message.author_id == self.me_id {
                continue;
            }
            if message.mentions_display_name(&self.me_name) {
                debug!(channel = %channel, author = %message.author, "mention detected");
                let text = message.text.clone().unwrap_or_default();
                match self.lock(&self.on_mention, "on_mention") {
                    Ok(cb) => {
                        if let Some(cb) = cb.as_ref() {
                            cb(&message.author, &text);
                        }
                    }
                    Err(e) => warn!(error = %e, "mention callback unavailable"),
                }
                self.bus.publish(AppEvent::MentionDetected {
                    author: message.author.clone(),
                    text,
                });
            }
        }

        scan.processed = messages.len();
        Ok(())
    }
}

impl Drop for ReadTracker {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.heartbeat.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use atrium_net::SocketCommand;
    use atrium_shared::MessageId;

    fn msg(id: &str, author_id: &str, text: &str, ts: i64) -> Message {
        Message {
            id: MessageId::new(id),
            author_id: UserId::new(author_id),
            author: author_id.to_string(),
            text: Some(text.to_string()),
            ts,
            parent_id: None,
            thread_count: None,
            mentions: vec![],
        }
    }

    fn make_tracker() -> (Arc<ReadTracker>, tokio::sync::mpsc::Receiver<SocketCommand>) {
        let (socket, cmd_rx) = SocketManager::detached("tok");
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let tracker = Arc::new(ReadTracker::new(
            db,
            Arc::new(socket),
            EventBus::default(),
            UserId::new("me"),
            "Alice",
        ));
        (tracker, cmd_rx)
    }

    #[tokio::test]
    async fn cursor_is_monotonic() {
        let (tracker, _rx) = make_tracker();
        let scope = Scope::new("t", "p");
        let channel = ChannelId::new("c1");

        assert_eq!(tracker.mark_channel_read(&scope, &channel, 500).unwrap(), 500);
        assert_eq!(tracker.mark_channel_read(&scope, &channel, 200).unwrap(), 500);
    }

    #[tokio::test]
    async fn mention_fires_exactly_once_as_the_log_grows() {
        let (tracker, _rx) = make_tracker();
        let channel = ChannelId::new("c1");

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tracker
            .set_on_mention(Box::new(move |author, text| {
                assert_eq!(author, "u2");
                assert_eq!(text, "hi @Alice");
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        let m1 = msg("m1", "u2", "no mention here", 100);
        let m2 = msg("m2", "u2", "hi @Alice", 200);

        tracker.observe(&channel, &[]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tracker.observe(&channel, std::slice::from_ref(&m1)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tracker.observe(&channel, &[m1.clone(), m2.clone()]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // Re-observing the same log does not re-alert.
        tracker.observe(&channel, &[m1, m2]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn own_messages_never_alert() {
        let (tracker, _rx) = make_tracker();
        let channel = ChannelId::new("c1");

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tracker
            .set_on_mention(Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        let own = msg("m1", "me", "note to self: @Alice", 100);
        tracker.observe(&channel, &[own]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn structured_mention_token_also_alerts() {
        let (tracker, _rx) = make_tracker();
        let channel = ChannelId::new("c1");

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tracker
            .set_on_mention(Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        let mut m = msg("m1", "u2", "ping", 100);
        m.mentions = vec!["name:Alice".into()];
        tracker.observe(&channel, &[m]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scan_resets_on_channel_switch() {
        let (tracker, _rx) = make_tracker();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tracker
            .set_on_mention(Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        // Three messages processed in c1.
        let c1 = ChannelId::new("c1");
        let plain: Vec<Message> = (0..3)
            .map(|i| msg(&format!("m{i}"), "u2", "nothing", 100 + i))
            .collect();
        tracker.observe(&c1, &plain).unwrap();

        // Switching to a shorter log in c2 must rescan from zero, not skip
        // past the mention at index 0.
        let c2 = ChannelId::new("c2");
        let mention = msg("x1", "u2", "hey @Alice", 50);
        tracker.observe(&c2, std::slice::from_ref(&mention)).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn seen_position_is_a_per_channel_maximum() {
        let (tracker, _rx) = make_tracker();
        let c1 = ChannelId::new("c1");
        let c2 = ChannelId::new("c2");

        tracker.mark_seen_up_to(&c1, 100).unwrap();
        tracker.mark_seen_up_to(&c1, 50).unwrap();
        assert_eq!(tracker.seen_up_to().unwrap(), 100);
        tracker.mark_seen_up_to(&c1, 200).unwrap();
        assert_eq!(tracker.seen_up_to().unwrap(), 200);

        // Switching channels starts over instead of keeping the old maximum.
        tracker.mark_seen_up_to(&c2, 10).unwrap();
        assert_eq!(tracker.seen_up_to().unwrap(), 10);
    }

    #[tokio::test]
    async fn broadcast_read_publishes_a_receipt_frame() {
        let (tracker, mut rx) = make_tracker();
        let channel = ChannelId::new("c1");

        tracker.broadcast_read(&channel, 777).await;

        match rx.recv().await {
            Some(SocketCommand::Publish(ClientFrame::ReadReceipt {
                user_id,
                user_name,
                channel_id,
                ts,
            })) => {
                assert_eq!(user_id.as_str(), "me");
                assert_eq!(user_name, "Alice");
                assert_eq!(channel_id.as_str(), "c1");
                assert_eq!(ts, 777);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_rebroadcasts_until_stopped() {
        let (tracker, mut rx) = make_tracker();
        let c1 = ChannelId::new("c1");
        tracker.mark_seen_up_to(&c1, 42).unwrap();
        tracker.start_heartbeat(c1).unwrap();

        // First tick is immediate, then one per interval.
        tokio::time::sleep(READ_BROADCAST_INTERVAL * 2 + READ_BROADCAST_INTERVAL / 2).await;
        tracker.stop_heartbeat().unwrap();

        let mut receipts = 0;
        while let Ok(cmd) = rx.try_recv() {
            if let SocketCommand::Publish(ClientFrame::ReadReceipt { ts, .. }) = cmd {
                assert_eq!(ts, 42);
                receipts += 1;
            }
        }
        assert!(receipts >= 3, "expected at least 3 receipts, got {receipts}");

        // Stopped: no further frames appear.
        tokio::time::sleep(READ_BROADCAST_INTERVAL * 2).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_never_carries_another_channels_position() {
        let (tracker, mut rx) = make_tracker();
        let busy = ChannelId::new("c1");
        let quiet = ChannelId::new("c2");

        // Lots of traffic seen in c1, then the view moves to c2.
        tracker.mark_seen_up_to(&busy, 9_000).unwrap();
        tracker.start_heartbeat(quiet.clone()).unwrap();
        tracker.mark_seen_up_to(&quiet, 100).unwrap();

        tokio::time::sleep(READ_BROADCAST_INTERVAL + READ_BROADCAST_INTERVAL / 2).await;
        tracker.stop_heartbeat().unwrap();

        let mut receipts = 0;
        while let Ok(cmd) = rx.try_recv() {
            if let SocketCommand::Publish(ClientFrame::ReadReceipt { channel_id, ts, .. }) = cmd {
                assert_eq!(channel_id, quiet);
                assert!(ts <= 100, "read position leaked across channels: {ts}");
                receipts += 1;
            }
        }
        assert!(receipts >= 1);
    }
}
