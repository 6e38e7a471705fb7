//! # atrium-client
//!
//! The client-local core of the workspace chat: the channel & message store
//! (single source of truth for the current context's logs), the read-cursor
//! & mention tracker, and the thread aggregator.
//!
//! The three components never call each other synchronously; they cooperate
//! through shared identifiers, the typed [`EventBus`] and the durable
//! snapshot in `atrium-store`, recomputing derived state idempotently.

pub mod bus;
pub mod channels;
pub mod read_tracker;
pub mod threads;

mod error;

pub use bus::{AppEvent, EventBus};
pub use channels::ChannelStore;
pub use error::ClientError;
pub use read_tracker::ReadTracker;
pub use threads::{aggregate_threads, ThreadItem};

use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide tracing subscriber.  Host applications call
/// this once at startup; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("atrium_client=debug,atrium_net=debug,atrium_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
