//! SFU signaling bridge.
//!
//! Signaling requests ride the realtime socket and are correlated with
//! their responses by a generated request id.  Every request resolves
//! within a bounded timeout; expiry is a soft failure
//! ([`SfuReply::TimedOut`]), never a hang.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::debug;
use uuid::Uuid;

use atrium_shared::protocol::{ClientFrame, SignalKind};
use atrium_shared::{ChannelId, UserId};

use crate::socket::SocketManager;

/// Outcome of a signaling request.
#[derive(Debug)]
pub enum SfuReply {
    /// The SFU answered within the timeout.
    Answered(serde_json::Value),
    /// No response arrived in time.  The pending entry is dropped; a late
    /// response will be discarded.
    TimedOut,
    /// The socket is not connected (or dropped mid-request).
    Disconnected,
}

/// Request/response correlation over the realtime socket.
pub struct SfuBridge {
    socket: Arc<SocketManager>,
    pending: Mutex<HashMap<String, oneshot::Sender<serde_json::Value>>>,
    timeout: Duration,
}

impl SfuBridge {
    pub fn new(socket: Arc<SocketManager>, timeout: Duration) -> Self {
        Self {
            socket,
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Send a signaling request and wait (bounded) for its correlated
    /// response.
    pub async fn request(
        &self,
        channel_id: &ChannelId,
        target: &UserId,
        signal: SignalKind,
    ) -> SfuReply {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        self.pending.lock().await.insert(request_id.clone(), tx);

        let sent = self
            .socket
            .publish(ClientFrame::Signal {
                request_id: request_id.clone(),
                channel_id: channel_id.clone(),
                target: target.clone(),
                signal,
            })
            .await;

        if !sent {
            self.pending.lock().await.remove(&request_id);
            return SfuReply::Disconnected;
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(payload)) => SfuReply::Answered(payload),
            Ok(Err(_)) => SfuReply::Disconnected,
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                debug!(request_id, "signaling request timed out");
                SfuReply::TimedOut
            }
        }
    }

    /// Resolve a pending request from an incoming `signalReply` frame.
    /// Replies for unknown or expired ids are dropped.
    pub async fn handle_reply(&self, request_id: &str, payload: serde_json::Value) {
        match self.pending.lock().await.remove(request_id) {
            Some(tx) => {
                let _ = tx.send(payload);
            }
            None => debug!(request_id, "dropping reply for unknown or expired request"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::SocketCommand;

    fn offer() -> SignalKind {
        SignalKind::Offer("v=0".into())
    }

    #[tokio::test]
    async fn reply_resolves_pending_request() {
        let (socket, mut cmd_rx) = SocketManager::detached("tok");
        let bridge = Arc::new(SfuBridge::new(Arc::new(socket), Duration::from_secs(2)));

        let responder = {
            let bridge = Arc::clone(&bridge);
            tokio::spawn(async move {
                let cmd = cmd_rx.recv().await.expect("a signal frame");
                let SocketCommand::Publish(ClientFrame::Signal { request_id, .. }) = cmd else {
                    panic!("expected a signal frame");
                };
                bridge
                    .handle_reply(&request_id, serde_json::json!({ "sdp": "answer" }))
                    .await;
            })
        };

        let reply = bridge
            .request(&ChannelId::new("c1"), &UserId::new("u2"), offer())
            .await;
        responder.await.unwrap();

        match reply {
            SfuReply::Answered(payload) => assert_eq!(payload["sdp"], "answer"),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_reply_times_out_softly() {
        let (socket, mut cmd_rx) = SocketManager::detached("tok");
        let bridge = SfuBridge::new(Arc::new(socket), Duration::from_millis(20));

        let reply = bridge
            .request(&ChannelId::new("c1"), &UserId::new("u2"), offer())
            .await;
        assert!(matches!(reply, SfuReply::TimedOut));

        // The frame was still sent; only the response is missing.
        assert!(matches!(
            cmd_rx.recv().await,
            Some(SocketCommand::Publish(ClientFrame::Signal { .. }))
        ));
    }

    #[tokio::test]
    async fn disconnected_socket_is_reported() {
        let socket = SocketManager::new("ws://localhost:1/chat");
        let bridge = SfuBridge::new(Arc::new(socket), Duration::from_millis(20));

        let reply = bridge
            .request(&ChannelId::new("c1"), &UserId::new("u2"), offer())
            .await;
        assert!(matches!(reply, SfuReply::Disconnected));
    }

    #[tokio::test]
    async fn late_or_unknown_replies_are_dropped() {
        let (socket, _cmd_rx) = SocketManager::detached("tok");
        let bridge = SfuBridge::new(Arc::new(socket), Duration::from_millis(20));

        // Must not panic or leak.
        bridge
            .handle_reply("never-issued", serde_json::json!({}))
            .await;
    }
}
