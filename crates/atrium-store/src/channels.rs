//! Snapshot operations for the channel roster.

use rusqlite::params;

use atrium_shared::constants::DM_PREFIX;
use atrium_shared::{Channel, ChannelId, ChannelKind, Scope, UserId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or update a single channel in the roster for `scope`.
    pub fn upsert_channel(&self, scope: &Scope, channel: &Channel) -> Result<()> {
        let (name, is_direct, peer_id) = flatten_kind(channel);
        self.conn().execute(
            "INSERT INTO channels (scope, id, name, is_direct, peer_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (scope, id) DO UPDATE SET
                 name = excluded.name,
                 is_direct = excluded.is_direct,
                 peer_id = excluded.peer_id",
            params![
                scope.key(),
                channel.id.as_str(),
                name,
                is_direct as i32,
                peer_id,
            ],
        )?;
        Ok(())
    }

    /// Replace the whole roster for `scope` in one transaction.
    pub fn replace_channels(&mut self, scope: &Scope, channels: &[Channel]) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "DELETE FROM channels WHERE scope = ?1",
            params![scope.key()],
        )?;
        for channel in channels {
            let (name, is_direct, peer_id) = flatten_kind(channel);
            tx.execute(
                "INSERT INTO channels (scope, id, name, is_direct, peer_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    scope.key(),
                    channel.id.as_str(),
                    name,
                    is_direct as i32,
                    peer_id,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// List the roster for `scope`, ordered by id for deterministic reads.
    pub fn list_channels(&self, scope: &Scope) -> Result<Vec<Channel>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, is_direct, peer_id
             FROM channels
             WHERE scope = ?1
             ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![scope.key()], row_to_channel)?;

        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?);
        }
        Ok(channels)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn flatten_kind(channel: &Channel) -> (&str, bool, Option<&str>) {
    match &channel.kind {
        ChannelKind::Direct { peer_id } => ("", true, Some(peer_id.as_str())),
        ChannelKind::Group { name } => (name.as_str(), false, None),
    }
}

/// Map a `rusqlite::Row` to a [`Channel`].
fn row_to_channel(row: &rusqlite::Row<'_>) -> rusqlite::Result<Channel> {
    let id: String = row.get(0)?;
    let name: String = row.get(1)?;
    let is_direct: bool = row.get(2)?;
    let peer_id: Option<String> = row.get(3)?;

    let kind = if is_direct {
        // peer_id is always written for direct rows; fall back to the id
        // suffix if an old row lacks it.
        let peer = peer_id.unwrap_or_else(|| id.trim_start_matches(DM_PREFIX).to_string());
        ChannelKind::Direct {
            peer_id: UserId::new(peer),
        }
    } else {
        ChannelKind::Group { name }
    };

    Ok(Channel {
        id: ChannelId::new(id),
        kind,
    })
}
