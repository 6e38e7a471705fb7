//! # atrium-net
//!
//! Network collaborators of the client core: the JSON/HTTPS backend API,
//! the realtime chat socket (a background tokio task driven by typed
//! command/notification channels) and the SFU signaling bridge with bounded
//! request/response correlation.

pub mod api;
pub mod sfu;
pub mod socket;

mod error;

pub use api::{ApiClient, ChatBackend};
pub use error::NetError;
pub use sfu::{SfuBridge, SfuReply};
pub use socket::{ConnectOutcome, SocketCommand, SocketManager, SocketNotification};
