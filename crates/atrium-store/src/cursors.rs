//! Read-cursor persistence.
//!
//! A cursor marks the timestamp of the last message the user is considered
//! to have seen in a channel.  Cursors only ever move forward; the monotonic
//! guarantee is enforced in SQL so every caller gets it for free.

use rusqlite::params;

use atrium_shared::{ChannelId, Scope};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// The read cursor for a channel, or 0 if none was ever recorded.
    pub fn read_cursor(&self, scope: &Scope, channel_id: &ChannelId) -> Result<i64> {
        match self.conn().query_row(
            "SELECT ts FROM read_cursors WHERE scope = ?1 AND channel_id = ?2",
            params![scope.key(), channel_id.as_str()],
            |row| row.get(0),
        ) {
            Ok(ts) => Ok(ts),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Advance the read cursor to `max(current, ts)` and return the stored
    /// value.  Never regresses.
    pub fn advance_read_cursor(
        &self,
        scope: &Scope,
        channel_id: &ChannelId,
        ts: i64,
    ) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO read_cursors (scope, channel_id, ts)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (scope, channel_id) DO UPDATE SET
                 ts = MAX(read_cursors.ts, excluded.ts)",
            params![scope.key(), channel_id.as_str(), ts],
        )?;
        self.read_cursor(scope, channel_id)
    }
}
