//! Frames exchanged with the realtime `/chat` socket.
//!
//! Both directions are JSON text frames: a tagged enum with a `type`
//! discriminator so the backend can route without fully decoding payloads.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, Message, UserId};

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Publish a message into a channel.
    #[serde(rename_all = "camelCase")]
    Publish { channel_id: ChannelId, text: String },

    /// Tell other participants this user has read up to `ts`.
    #[serde(rename_all = "camelCase")]
    ReadReceipt {
        user_id: UserId,
        user_name: String,
        channel_id: ChannelId,
        ts: i64,
    },

    /// SFU signaling request, correlated by `request_id`.
    #[serde(rename_all = "camelCase")]
    Signal {
        request_id: String,
        channel_id: ChannelId,
        target: UserId,
        signal: SignalKind,
    },
}

/// Frames received from the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerFrame {
    /// A message arrived in a channel.
    #[serde(rename_all = "camelCase")]
    Message {
        channel_id: ChannelId,
        message: Message,
    },

    /// Another participant's read position moved.
    #[serde(rename_all = "camelCase")]
    ReadReceipt {
        user_id: UserId,
        user_name: String,
        channel_id: ChannelId,
        ts: i64,
    },

    /// Response to a [`ClientFrame::Signal`] request.
    #[serde(rename_all = "camelCase")]
    SignalReply {
        request_id: String,
        payload: serde_json::Value,
    },

    /// Server-side error report; informational only.
    Error { message: String },
}

/// WebRTC signaling payloads relayed through the SFU bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum SignalKind {
    /// SDP offer.
    Offer(String),
    /// SDP answer.
    Answer(String),
    /// ICE candidate.
    IceCandidate(String),
    /// Call ended.
    Hangup,
}
