//! Realtime chat socket with tokio mpsc command/notification pattern.
//!
//! The socket task runs in a dedicated tokio task.  External code
//! communicates with it through typed command and notification channels,
//! keeping the transport fully asynchronous and decoupled from client state.
//!
//! Connection semantics: [`SocketManager::connect`] reuses a live connection
//! when the bearer token is unchanged and recreates it otherwise, so calling
//! it repeatedly never produces duplicate connections or duplicate message
//! deliveries.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use atrium_shared::protocol::{ClientFrame, ServerFrame};

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

/// Commands sent *into* the socket task.
#[derive(Debug)]
pub enum SocketCommand {
    /// Serialize and send a frame to the server.
    Publish(ClientFrame),
    /// Gracefully close the connection.
    Shutdown,
}

/// Notifications sent *from* the socket task to the application.
#[derive(Debug, Clone)]
pub enum SocketNotification {
    /// A frame arrived from the server.
    Frame(ServerFrame),
    /// The connection closed (remote close or transport error).
    Closed,
}

/// Result of a [`SocketManager::connect`] call.
pub enum ConnectOutcome {
    /// A live connection with the same token already existed; nothing new
    /// was created.
    Reused,
    /// A fresh connection was established; the receiver carries its
    /// notifications.
    Fresh(mpsc::Receiver<SocketNotification>),
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

struct Live {
    token: String,
    cmd_tx: mpsc::Sender<SocketCommand>,
    /// `None` for detached (in-memory) transports.
    task: Option<JoinHandle<()>>,
}

impl Live {
    fn is_alive(&self) -> bool {
        self.task.as_ref().map_or(true, |t| !t.is_finished())
    }
}

/// Owns at most one live socket connection for the session.
pub struct SocketManager {
    url: String,
    inner: tokio::sync::Mutex<Option<Live>>,
}

impl SocketManager {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            inner: tokio::sync::Mutex::new(None),
        }
    }

    /// An in-memory transport: published frames land on the returned
    /// command receiver instead of a network socket.  Used by tests and
    /// offline tooling.
    pub fn detached(token: impl Into<String>) -> (Self, mpsc::Receiver<SocketCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let manager = Self {
            url: String::new(),
            inner: tokio::sync::Mutex::new(Some(Live {
                token: token.into(),
                cmd_tx,
                task: None,
            })),
        };
        (manager, cmd_rx)
    }

    /// Establish the live connection, reusing an existing one if the token
    /// is unchanged.
    pub async fn connect(&self, token: &str) -> anyhow::Result<ConnectOutcome> {
        let mut guard = self.inner.lock().await;

        if let Some(live) = guard.as_ref() {
            if live.token == token && live.is_alive() {
                debug!("reusing existing realtime connection");
                return Ok(ConnectOutcome::Reused);
            }
        }

        // Token changed or connection died: tear down before reconnecting.
        if let Some(old) = guard.take() {
            let _ = old.cmd_tx.try_send(SocketCommand::Shutdown);
            if let Some(task) = old.task {
                task.abort();
            }
        }

        let mut request = self.url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Authorization", format!("Bearer {token}").parse()?);

        let (ws, _response) = connect_async(request).await?;
        info!(url = %self.url, "realtime socket connected");

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (note_tx, note_rx) = mpsc::channel(256);
        let task = tokio::spawn(run_socket(ws, cmd_rx, note_tx));

        *guard = Some(Live {
            token: token.to_string(),
            cmd_tx,
            task: Some(task),
        });

        Ok(ConnectOutcome::Fresh(note_rx))
    }

    /// Send a frame on the live connection.  Returns `false` (after a log)
    /// when no connection exists; callers treat that as a soft failure.
    pub async fn publish(&self, frame: ClientFrame) -> bool {
        let guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(live) if live.is_alive() => live
                .cmd_tx
                .send(SocketCommand::Publish(frame))
                .await
                .is_ok(),
            _ => {
                warn!("dropping frame: realtime socket not connected");
                false
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .await
            .as_ref()
            .is_some_and(Live::is_alive)
    }

    /// Close the live connection, if any.
    pub async fn shutdown(&self) {
        if let Some(live) = self.inner.lock().await.take() {
            let _ = live.cmd_tx.send(SocketCommand::Shutdown).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Socket task
// ---------------------------------------------------------------------------

async fn run_socket(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut cmd_rx: mpsc::Receiver<SocketCommand>,
    note_tx: mpsc::Sender<SocketNotification>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(SocketCommand::Publish(frame)) => {
                    match serde_json::to_string(&frame) {
                        Ok(json) => {
                            if let Err(e) = sink.send(WsMessage::Text(json)).await {
                                error!(error = %e, "socket send failed");
                                let _ = note_tx.send(SocketNotification::Closed).await;
                                break;
                            }
                        }
                        Err(e) => error!(error = %e, "failed to encode frame"),
                    }
                }
                Some(SocketCommand::Shutdown) | None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            let _ = note_tx.send(SocketNotification::Frame(frame)).await;
                        }
                        Err(e) => warn!(error = %e, "ignoring unparseable frame"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("socket closed by server");
                    let _ = note_tx.send(SocketNotification::Closed).await;
                    break;
                }
                // Pings are answered by the transport; binary frames are
                // not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "socket read error");
                    let _ = note_tx.send(SocketNotification::Closed).await;
                    break;
                }
            }
        }
    }

    debug!("socket task terminated");
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_shared::ChannelId;

    #[tokio::test]
    async fn detached_manager_delivers_published_frames() {
        let (manager, mut cmd_rx) = SocketManager::detached("tok");

        let frame = ClientFrame::Publish {
            channel_id: ChannelId::new("c1"),
            text: "hello".into(),
        };
        assert!(manager.publish(frame.clone()).await);

        match cmd_rx.recv().await {
            Some(SocketCommand::Publish(sent)) => assert_eq!(sent, frame),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_with_unchanged_token_reuses_the_live_connection() {
        let (manager, mut cmd_rx) = SocketManager::detached("tok");

        match manager.connect("tok").await {
            Ok(ConnectOutcome::Reused) => {}
            _ => panic!("expected the existing connection to be reused"),
        }

        // The reused connection still carries frames.
        let frame = ClientFrame::Publish {
            channel_id: ChannelId::new("c1"),
            text: "still here".into(),
        };
        assert!(manager.publish(frame).await);
        assert!(matches!(
            cmd_rx.recv().await,
            Some(SocketCommand::Publish(_))
        ));
    }

    #[tokio::test]
    async fn publish_without_connection_is_a_soft_failure() {
        let manager = SocketManager::new("ws://localhost:1/chat");
        let sent = manager
            .publish(ClientFrame::Publish {
                channel_id: ChannelId::new("c1"),
                text: "hello".into(),
            })
            .await;
        assert!(!sent);
        assert!(!manager.is_connected().await);
    }
}
