//! v001 -- Initial schema creation.
//!
//! Creates the three snapshot tables: `channels`, `messages` and
//! `read_cursors`.  Every table is partitioned by `scope`
//! (`<team>/<project>`) so two contexts never share rows.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Channel roster
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS channels (
    scope     TEXT NOT NULL,              -- "<team>/<project>"
    id        TEXT NOT NULL,              -- backend-issued id; "dm:<peer>" for DMs
    name      TEXT NOT NULL,              -- display name, marker already stripped
    is_direct INTEGER NOT NULL DEFAULT 0, -- boolean 0/1
    peer_id   TEXT,                       -- set iff is_direct

    PRIMARY KEY (scope, id)
);

-- ----------------------------------------------------------------
-- Per-channel message logs
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    scope        TEXT NOT NULL,
    channel_id   TEXT NOT NULL,
    id           TEXT NOT NULL,           -- unique within the channel
    author_id    TEXT NOT NULL,
    author       TEXT NOT NULL,           -- sender display name
    text         TEXT,
    ts           INTEGER NOT NULL,        -- milliseconds since epoch
    parent_id    TEXT,                    -- set on replies
    thread_count INTEGER,                 -- cached reply count, may be stale
    mentions     TEXT NOT NULL DEFAULT '[]', -- JSON array of mention tokens

    PRIMARY KEY (scope, channel_id, id)
);

CREATE INDEX IF NOT EXISTS idx_messages_channel_ts
    ON messages(scope, channel_id, ts ASC);

-- ----------------------------------------------------------------
-- Read cursors
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS read_cursors (
    scope      TEXT NOT NULL,
    channel_id TEXT NOT NULL,
    ts         INTEGER NOT NULL,          -- last seen message timestamp

    PRIMARY KEY (scope, channel_id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
