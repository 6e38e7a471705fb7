//! Typed in-process event bus.
//!
//! Cross-cutting state changes are broadcast as [`AppEvent`]s on a
//! `tokio::sync::broadcast` channel.  The bus is injected into components
//! rather than reached through ambient globals; publishing is
//! fire-and-forget with no acknowledgment.

use tokio::sync::broadcast;

use atrium_shared::{ChannelId, UserId};

/// Topics broadcast across the application session.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The channel roster of the current context changed.
    ChannelsChanged,
    /// A channel's message log changed (append, history load or refresh).
    MessagesChanged { channel: ChannelId },
    /// The local user's read cursor moved forward.
    ReadCursorMoved { channel: ChannelId, ts: i64 },
    /// A newly arrived message mentions the local user.
    MentionDetected { author: String, text: String },
    /// Another participant's read position moved.
    PeerReadReceipt {
        channel: ChannelId,
        user_id: UserId,
        ts: i64,
    },
    /// Comments changed for a document.
    CommentsChanged { doc_id: String },
    /// The file vault changed.
    VaultChanged,
}

/// Cloneable handle to the session-scoped broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event.  Having zero subscribers is not an error.
    pub fn publish(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(AppEvent::MessagesChanged {
            channel: ChannelId::new("c1"),
        });

        match rx.recv().await.unwrap() {
            AppEvent::MessagesChanged { channel } => assert_eq!(channel.as_str(), "c1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publishing_with_no_subscribers_is_fine() {
        let bus = EventBus::default();
        bus.publish(AppEvent::VaultChanged);
    }
}
