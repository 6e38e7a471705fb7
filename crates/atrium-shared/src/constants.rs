//! Protocol-wide constants.

use std::time::Duration;

/// Reserved id prefix marking a synthetic direct-message channel.
pub const DM_PREFIX: &str = "dm:";

/// Leading marker some backends prepend to group channel names.
pub const NAME_MARKER: char = '#';

/// Sigil used for textual mentions inside message bodies.
pub const MENTION_SIGIL: char = '@';

/// Structured mention tokens carry this prefix (`name:<displayName>`).
pub const MENTION_TOKEN_PREFIX: &str = "name:";

/// Maximum length of a thread preview string, in characters.
pub const PREVIEW_MAX_CHARS: usize = 120;

/// How often a mounted channel view re-broadcasts its read position.
pub const READ_BROADCAST_INTERVAL: Duration = Duration::from_secs(5);

/// How long an SFU signaling request waits for its correlated response.
pub const SFU_REQUEST_TIMEOUT: Duration = Duration::from_millis(2500);
