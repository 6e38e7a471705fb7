use thiserror::Error;

/// Errors produced by the client core.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Snapshot layer failure.
    #[error("Store error: {0}")]
    Store(#[from] atrium_store::StoreError),

    /// Network layer failure.
    #[error("Network error: {0}")]
    Net(#[from] atrium_net::NetError),

    /// Shared state lock was poisoned by a panicking holder.
    #[error("State error: {0}")]
    State(String),

    /// Operation requires a bound (team, project) context.
    #[error("No context bound; call set_context first")]
    NoContext,

    /// Operation requires an active channel.
    #[error("No active channel")]
    NoActiveChannel,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
