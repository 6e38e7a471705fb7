//! Core domain types.
//!
//! Ids are backend-issued strings wrapped in newtypes.  The dual encoding of
//! channel kind used on the wire (an `isDM` flag *and* a reserved `dm:` id
//! prefix) is collapsed into [`ChannelKind`] exactly once, in
//! [`Channel::classify`]; downstream code matches on the variant and never
//! re-derives the kind from string prefixes.

use serde::{Deserialize, Serialize};

use crate::constants::{DM_PREFIX, MENTION_SIGIL, MENTION_TOKEN_PREFIX, NAME_MARKER};

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Globally unique channel identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Synthesize the id of the direct-message channel for a peer.
    pub fn for_peer(peer: &UserId) -> Self {
        Self(format!("{DM_PREFIX}{peer}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the raw id carries the reserved direct-message prefix.
    /// Only [`Channel::classify`] should need this.
    pub fn has_dm_prefix(&self) -> bool {
        self.0.starts_with(DM_PREFIX)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier, unique within its channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// The (team, project) context a roster and its message logs belong to.
/// Snapshot rows are keyed by scope so one project's data is never visible
/// from another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Scope {
    pub team_id: String,
    pub project_id: String,
}

impl Scope {
    pub fn new(team_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Storage key, used to partition snapshot tables.
    pub fn key(&self) -> String {
        format!("{}/{}", self.team_id, self.project_id)
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// What kind of conversation a channel is.  Derived once at the wire
/// boundary; see [`Channel::classify`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChannelKind {
    /// Two-party channel synthesized from a peer user id.
    Direct { peer_id: UserId },
    /// Multi-party named channel.
    Group { name: String },
}

/// A conversation context with an ordered message log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub kind: ChannelKind,
}

impl Channel {
    /// Derive a [`Channel`] from its wire representation.
    ///
    /// The backend encodes direct-message channels redundantly: an `isDM`
    /// flag and a reserved `dm:` id prefix.  Either marks the channel as
    /// direct.  Group names may carry a leading `#`, which is stripped for
    /// display.
    pub fn classify(id: ChannelId, name: &str, is_dm: bool) -> Self {
        if is_dm || id.has_dm_prefix() {
            let peer = id
                .as_str()
                .strip_prefix(DM_PREFIX)
                .unwrap_or(id.as_str())
                .to_string();
            Self {
                kind: ChannelKind::Direct {
                    peer_id: UserId(peer),
                },
                id,
            }
        } else {
            Self {
                id,
                kind: ChannelKind::Group {
                    name: name.trim_start_matches(NAME_MARKER).to_string(),
                },
            }
        }
    }

    /// Synthesize the direct-message channel for a peer.
    pub fn direct(peer_id: UserId) -> Self {
        Self {
            id: ChannelId::for_peer(&peer_id),
            kind: ChannelKind::Direct { peer_id },
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.kind, ChannelKind::Direct { .. })
    }

    /// Name suitable for list views (peer id for DMs, bare name for groups).
    pub fn display_name(&self) -> &str {
        match &self.kind {
            ChannelKind::Direct { peer_id } => peer_id.as_str(),
            ChannelKind::Group { name } => name.as_str(),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.  The owning channel is implicit: logs are
/// partitioned per channel, so the message itself carries no channel id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub author_id: UserId,
    /// Sender display name.
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Milliseconds since epoch; non-decreasing in insertion order per
    /// channel, not globally unique.
    pub ts: i64,
    /// Set on replies; absent on thread-root candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    /// Cached reply count, possibly stale relative to the fetched log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_count: Option<u32>,
    /// Structured mention tokens of the form `name:<displayName>`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}

impl Message {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    /// Whether this message mentions the given display name, either through
    /// a structured `name:<displayName>` token or the literal `@name` in the
    /// body.  Either signal suffices.
    pub fn mentions_display_name(&self, display_name: &str) -> bool {
        let token = format!("{MENTION_TOKEN_PREFIX}{display_name}");
        if self.mentions.iter().any(|m| m == &token) {
            return true;
        }
        let needle = format!("{MENTION_SIGIL}{display_name}");
        self.text.as_deref().is_some_and(|t| t.contains(&needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: Option<&str>, mentions: &[&str]) -> Message {
        Message {
            id: MessageId::new("m1"),
            author_id: UserId::new("u2"),
            author: "Bob".into(),
            text: text.map(str::to_string),
            ts: 100,
            parent_id: None,
            thread_count: None,
            mentions: mentions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn classify_respects_flag_and_prefix() {
        let by_flag = Channel::classify(ChannelId::new("c1"), "general", true);
        assert!(by_flag.is_direct());

        let by_prefix = Channel::classify(ChannelId::new("dm:u9"), "", false);
        assert!(by_prefix.is_direct());
        assert_eq!(by_prefix.display_name(), "u9");

        let group = Channel::classify(ChannelId::new("c2"), "#general", false);
        assert!(!group.is_direct());
        assert_eq!(group.display_name(), "general");
    }

    #[test]
    fn mention_by_token_or_text() {
        assert!(msg(None, &["name:Alice"]).mentions_display_name("Alice"));
        assert!(msg(Some("hi @Alice"), &[]).mentions_display_name("Alice"));
        assert!(!msg(Some("hi Alice"), &[]).mentions_display_name("Alice"));
        assert!(!msg(None, &["name:Alicia"]).mentions_display_name("Alice"));
    }

    #[test]
    fn message_wire_shape_is_camel_case() {
        let m = Message {
            id: MessageId::new("m1"),
            author_id: UserId::new("u1"),
            author: "Alice".into(),
            text: Some("hello".into()),
            ts: 42,
            parent_id: Some(MessageId::new("m0")),
            thread_count: Some(3),
            mentions: vec!["name:Bob".into()],
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["authorId"], "u1");
        assert_eq!(json["parentId"], "m0");
        assert_eq!(json["threadCount"], 3);
    }
}
