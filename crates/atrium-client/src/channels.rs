//! Channel & message store.
//!
//! Owns the authoritative channel roster and per-channel ordered message
//! logs for one (team, project) context.  All mutation happens synchronously
//! between suspension points on the shared state mutex; async results carry
//! the epoch they were issued under and are discarded when a context change
//! or channel switch overtook them.
//!
//! Flush contract: every mutation is persisted to the snapshot database
//! *before* the bus notification goes out, so snapshot readers (the thread
//! aggregator) are never more than one tick stale.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use percent_encoding::percent_decode_str;
use tracing::{debug, info, warn};

use atrium_net::{ChatBackend, ConnectOutcome, SfuBridge, SocketManager, SocketNotification};
use atrium_shared::protocol::ServerFrame;
use atrium_shared::{Channel, ChannelId, Message, Scope, UserId};
use atrium_store::Database;

use crate::bus::{AppEvent, EventBus};
use crate::error::{ClientError, Result};

struct StoreState {
    scope: Option<Scope>,
    /// Bumped on every `set_context`; guards roster-level async results.
    context_epoch: u64,
    /// Bumped on `set_context` and every channel switch; guards history
    /// fetches.
    channel_epoch: u64,
    channels: Vec<Channel>,
    logs: HashMap<ChannelId, Vec<Message>>,
    /// Channels whose history has been synchronized (fetched, refreshed or
    /// seeded from the snapshot).  Realtime appends alone never qualify, so
    /// the first activation still fetches the backlog.
    loaded: HashSet<ChannelId>,
    active: Option<ChannelId>,
    /// User-facing message for the last soft failure; cleared on success.
    last_error: Option<String>,
}

/// The single source of truth for channels and messages in the current
/// context.
pub struct ChannelStore {
    backend: Arc<dyn ChatBackend>,
    socket: Arc<SocketManager>,
    db: Arc<Mutex<Database>>,
    bus: EventBus,
    state: Mutex<StoreState>,
    sfu: Mutex<Option<Arc<SfuBridge>>>,
}

impl ChannelStore {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        socket: Arc<SocketManager>,
        db: Arc<Mutex<Database>>,
        bus: EventBus,
    ) -> Self {
        Self {
            backend,
            socket,
            db,
            bus,
            state: Mutex::new(StoreState {
                scope: None,
                context_epoch: 0,
                channel_epoch: 0,
                channels: Vec::new(),
                logs: HashMap::new(),
                loaded: HashSet::new(),
                active: None,
                last_error: None,
            }),
            sfu: Mutex::new(None),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|e| ClientError::State(format!("state lock poisoned: {e}")))
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| ClientError::State(format!("snapshot lock poisoned: {e}")))
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    /// Rebind the store to a different team/project scope.  Invalidates all
    /// channel data so one project's messages are never visible from
    /// another, then reloads the roster.
    pub async fn set_context(&self, team_id: &str, project_id: &str) -> Result<()> {
        {
            let mut st = self.state()?;
            st.context_epoch += 1;
            st.channel_epoch += 1;
            st.scope = Some(Scope::new(team_id, project_id));
            st.channels.clear();
            st.logs.clear();
            st.loaded.clear();
            st.active = None;
            st.last_error = None;
        }
        info!(team = team_id, project = project_id, "context bound");
        self.load_channels().await
    }

    /// Fetch the channel roster for the current context.  Fails soft: on
    /// error the previously known roster stays in place and the error is
    /// reported through [`last_error`](Self::last_error).
    pub async fn load_channels(&self) -> Result<()> {
        let (scope, epoch) = {
            let st = self.state()?;
            let scope = st.scope.clone().ok_or(ClientError::NoContext)?;
            (scope, st.context_epoch)
        };

        match self.backend.fetch_channels(&scope.project_id).await {
            Ok(channels) => {
                {
                    let mut st = self.state()?;
                    if st.context_epoch != epoch {
                        debug!("discarding stale channel roster");
                        return Ok(());
                    }
                    st.channels = channels.clone();
                    st.last_error = None;
                }
                self.db()?.replace_channels(&scope, &channels)?;
                self.bus.publish(AppEvent::ChannelsChanged);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "channel roster load failed; keeping previous roster");
                self.state()?.last_error = Some(format!("Failed to load channels: {e}"));
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Channel activation
    // ------------------------------------------------------------------

    /// Mark a channel as active.  Accepts percent-encoded identifiers.  The
    /// first activation of a channel fetches its history from the backend
    /// before returning.
    pub async fn set_channel(&self, raw_id: &str) -> Result<ChannelId> {
        let decoded = percent_decode_str(raw_id).decode_utf8_lossy().to_string();
        let id = ChannelId::new(decoded);

        let (scope, epoch, needs_fetch) = {
            let mut st = self.state()?;
            let scope = st.scope.clone().ok_or(ClientError::NoContext)?;
            st.channel_epoch += 1;
            st.active = Some(id.clone());
            (scope, st.channel_epoch, !st.loaded.contains(&id))
        };

        if !needs_fetch {
            return Ok(id);
        }

        match self.backend.fetch_messages(&id).await {
            Ok(messages) => {
                {
                    let mut st = self.state()?;
                    if st.channel_epoch != epoch || st.active.as_ref() != Some(&id) {
                        debug!(channel = %id, "discarding stale history fetch");
                        return Ok(id);
                    }
                    st.logs.insert(id.clone(), messages.clone());
                    st.loaded.insert(id.clone());
                    st.last_error = None;
                }
                self.db()?.replace_messages(&scope, &id, &messages)?;
                self.bus.publish(AppEvent::MessagesChanged {
                    channel: id.clone(),
                });
            }
            Err(e) => {
                warn!(channel = %id, error = %e, "history load failed");
                self.state()?.last_error = Some(format!("Failed to load messages: {e}"));
            }
        }
        Ok(id)
    }

    /// Re-synchronize one channel's log against the backend.  Skipped
    /// entirely for direct-message channels, whose history is assumed
    /// consistent via the local log.
    pub async fn refresh_channel(&self, id: &ChannelId) -> Result<()> {
        let (scope, epoch) = {
            let st = self.state()?;
            let scope = st.scope.clone().ok_or(ClientError::NoContext)?;
            match st.channels.iter().find(|c| &c.id == id) {
                Some(c) if c.is_direct() => {
                    debug!(channel = %id, "skipping refresh for direct-message channel");
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    debug!(channel = %id, "refresh requested for unknown channel");
                    return Ok(());
                }
            }
            (scope, st.context_epoch)
        };

        match self.backend.fetch_messages(id).await {
            Ok(messages) => {
                {
                    let mut st = self.state()?;
                    if st.context_epoch != epoch {
                        debug!(channel = %id, "discarding stale refresh");
                        return Ok(());
                    }
                    st.logs.insert(id.clone(), messages.clone());
                    st.loaded.insert(id.clone());
                    st.last_error = None;
                }
                self.db()?.replace_messages(&scope, id, &messages)?;
                self.bus.publish(AppEvent::MessagesChanged {
                    channel: id.clone(),
                });
            }
            Err(e) => {
                warn!(channel = %id, error = %e, "refresh failed");
                self.state()?.last_error = Some(format!("Failed to refresh channel: {e}"));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Realtime
    // ------------------------------------------------------------------

    /// Establish the live-update connection for the session.  Idempotent:
    /// repeated calls with the same token reuse the existing connection and
    /// never duplicate deliveries.
    pub async fn init_realtime(self: &Arc<Self>, token: &str) -> Result<()> {
        match self.socket.connect(token).await {
            Ok(ConnectOutcome::Reused) => Ok(()),
            Ok(ConnectOutcome::Fresh(notifications)) => {
                let store = Arc::clone(self);
                tokio::spawn(run_pump(store, notifications));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "realtime connection failed");
                self.state()?.last_error = Some(format!("Realtime unavailable: {e}"));
                Ok(())
            }
        }
    }

    /// Register the SFU bridge so signal replies arriving on the socket can
    /// be correlated.
    pub fn attach_sfu(&self, bridge: Arc<SfuBridge>) -> Result<()> {
        *self
            .sfu
            .lock()
            .map_err(|e| ClientError::State(format!("sfu lock poisoned: {e}")))? = Some(bridge);
        Ok(())
    }

    fn sfu_bridge(&self) -> Option<Arc<SfuBridge>> {
        self.sfu.lock().ok().and_then(|guard| guard.clone())
    }

    /// Route one incoming socket frame.
    pub(crate) async fn handle_frame(&self, frame: ServerFrame) -> Result<()> {
        match frame {
            ServerFrame::Message {
                channel_id,
                message,
            } => self.apply_incoming(&channel_id, message),
            ServerFrame::ReadReceipt {
                user_id,
                channel_id,
                ts,
                ..
            } => {
                self.bus.publish(AppEvent::PeerReadReceipt {
                    channel: channel_id,
                    user_id,
                    ts,
                });
                Ok(())
            }
            ServerFrame::SignalReply {
                request_id,
                payload,
            } => {
                match self.sfu_bridge() {
                    Some(bridge) => bridge.handle_reply(&request_id, payload).await,
                    None => debug!(request_id, "signal reply with no bridge attached"),
                }
                Ok(())
            }
            ServerFrame::Error { message } => {
                warn!(message, "server reported error");
                Ok(())
            }
        }
    }

    /// Append a message delivered by the realtime transport, in arrival
    /// order, then flush and notify.
    pub(crate) fn apply_incoming(&self, channel_id: &ChannelId, message: Message) -> Result<()> {
        let scope = {
            let mut st = self.state()?;
            let Some(scope) = st.scope.clone() else {
                debug!(channel = %channel_id, "dropping message: no context bound");
                return Ok(());
            };
            st.logs
                .entry(channel_id.clone())
                .or_default()
                .push(message.clone());
            scope
        };
        self.db()?.append_message(&scope, channel_id, &message)?;
        self.bus.publish(AppEvent::MessagesChanged {
            channel: channel_id.clone(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Send a message to the active channel.  The POST response is the
    /// authoritative stored message; it is appended, flushed and announced.
    pub async fn send_message(&self, text: &str) -> Result<Message> {
        let (scope, channel, epoch) = {
            let st = self.state()?;
            let scope = st.scope.clone().ok_or(ClientError::NoContext)?;
            let channel = st.active.clone().ok_or(ClientError::NoActiveChannel)?;
            (scope, channel, st.context_epoch)
        };

        let message = match self.backend.post_message(&channel, text).await {
            Ok(m) => m,
            Err(e) => {
                self.state()?.last_error = Some(format!("Failed to send message: {e}"));
                return Err(e.into());
            }
        };

        {
            let mut st = self.state()?;
            if st.context_epoch != epoch {
                debug!(channel = %channel, "context switched mid-send; message persisted remotely only");
                return Ok(message);
            }
            st.logs
                .entry(channel.clone())
                .or_default()
                .push(message.clone());
        }
        self.db()?.append_message(&scope, &channel, &message)?;
        self.bus
            .publish(AppEvent::MessagesChanged { channel });
        Ok(message)
    }

    /// Create a multi-party channel in the current project and add it to
    /// the roster.
    pub async fn create_channel(&self, name: &str) -> Result<Channel> {
        let (scope, epoch) = {
            let st = self.state()?;
            let scope = st.scope.clone().ok_or(ClientError::NoContext)?;
            (scope, st.context_epoch)
        };

        let channel = self.backend.create_channel(&scope.project_id, name).await?;

        {
            let mut st = self.state()?;
            if st.context_epoch != epoch {
                debug!(channel = %channel.id, "context switched mid-create");
                return Ok(channel);
            }
            st.channels.push(channel.clone());
        }
        self.db()?.upsert_channel(&scope, &channel)?;
        self.bus.publish(AppEvent::ChannelsChanged);
        Ok(channel)
    }

    /// Open (creating if needed) the synthetic direct-message channel for a
    /// peer.  The in-memory log is seeded from the snapshot, so activating
    /// the channel never hits the backend.
    pub fn open_dm(&self, peer: &UserId) -> Result<ChannelId> {
        let channel = Channel::direct(peer.clone());
        let id = channel.id.clone();

        let (scope, created) = {
            let mut st = self.state()?;
            let scope = st.scope.clone().ok_or(ClientError::NoContext)?;
            let created = !st.channels.iter().any(|c| c.id == id);
            if created {
                st.channels.push(channel.clone());
            }
            (scope, created)
        };

        // Seed the log from the snapshot before anything activates it; the
        // snapshot is the authoritative history for direct messages, so the
        // channel counts as loaded.
        let history = self.db()?.messages_for_channel(&scope, &id)?;
        {
            let mut st = self.state()?;
            st.logs.entry(id.clone()).or_insert(history);
            st.loaded.insert(id.clone());
        }

        if created {
            self.db()?.upsert_channel(&scope, &channel)?;
            self.bus.publish(AppEvent::ChannelsChanged);
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn channels(&self) -> Result<Vec<Channel>> {
        Ok(self.state()?.channels.clone())
    }

    pub fn messages(&self, channel_id: &ChannelId) -> Result<Vec<Message>> {
        Ok(self
            .state()?
            .logs
            .get(channel_id)
            .cloned()
            .unwrap_or_default())
    }

    pub fn active_channel(&self) -> Result<Option<ChannelId>> {
        Ok(self.state()?.active.clone())
    }

    pub fn scope(&self) -> Result<Option<Scope>> {
        Ok(self.state()?.scope.clone())
    }

    /// The last soft failure, for inline display.  Cleared by the next
    /// successful load.
    pub fn last_error(&self) -> Result<Option<String>> {
        Ok(self.state()?.last_error.clone())
    }
}

/// Forward socket notifications into the store until the socket closes.
async fn run_pump(
    store: Arc<ChannelStore>,
    mut notifications: tokio::sync::mpsc::Receiver<SocketNotification>,
) {
    while let Some(note) = notifications.recv().await {
        match note {
            SocketNotification::Frame(frame) => {
                if let Err(e) = store.handle_frame(frame).await {
                    warn!(error = %e, "failed to apply socket frame");
                }
            }
            SocketNotification::Closed => {
                debug!("realtime socket closed");
            }
        }
    }
}
