use thiserror::Error;

/// Errors produced by the network layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// HTTP transport or status error from the backend.
    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The realtime socket is not connected.
    #[error("Realtime socket not connected")]
    NotConnected,

    /// Frame (de)serialization failure.
    #[error("Frame serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;
