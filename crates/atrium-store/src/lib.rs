//! # atrium-store
//!
//! Durable local snapshot of chat state: channel rosters, per-channel message
//! logs and read cursors, backed by SQLite.
//!
//! Every table is keyed by [`Scope`](atrium_shared::Scope) (team + project)
//! so one context's data is never visible from another.  The live in-memory
//! store flushes every mutation here *before* notifying subscribers, which
//! lets the thread aggregator read snapshots independently of socket
//! connectivity and still see state at most one tick stale.

pub mod channels;
pub mod cursors;
pub mod database;
pub mod messages;
pub mod migrations;

mod error;

pub use database::Database;
pub use error::StoreError;
