//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client core can run against a
//! local backend with zero configuration.

use std::time::Duration;

use crate::constants::SFU_REQUEST_TIMEOUT;

/// Client core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the REST backend.
    /// Env: `ATRIUM_API_URL`
    /// Default: `http://localhost:8080`
    pub api_base_url: String,

    /// URL of the realtime chat socket.
    /// Env: `ATRIUM_SOCKET_URL`
    /// Default: `ws://localhost:8080/chat`
    pub socket_url: String,

    /// Bearer token for the REST backend and the socket.
    /// Env: `ATRIUM_TOKEN`
    /// Default: empty (anonymous; the backend will reject writes).
    pub auth_token: String,

    /// Namespace for the local snapshot database file.
    /// Env: `ATRIUM_NAMESPACE`
    /// Default: `atrium`
    pub namespace: String,

    /// SFU signaling request timeout.
    /// Env: `ATRIUM_SFU_TIMEOUT_MS`
    /// Default: 2500 ms.
    pub sfu_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            socket_url: "ws://localhost:8080/chat".to_string(),
            auth_token: String::new(),
            namespace: "atrium".to_string(),
            sfu_timeout: SFU_REQUEST_TIMEOUT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("ATRIUM_API_URL") {
            config.api_base_url = url;
        }

        if let Ok(url) = std::env::var("ATRIUM_SOCKET_URL") {
            config.socket_url = url;
        }

        if let Ok(token) = std::env::var("ATRIUM_TOKEN") {
            config.auth_token = token;
        }

        if let Ok(ns) = std::env::var("ATRIUM_NAMESPACE") {
            if !ns.is_empty() {
                config.namespace = ns;
            }
        }

        if let Ok(ms) = std::env::var("ATRIUM_SFU_TIMEOUT_MS") {
            if let Ok(parsed) = ms.parse::<u64>() {
                config.sfu_timeout = Duration::from_millis(parsed);
            } else {
                tracing::warn!(value = %ms, "Invalid ATRIUM_SFU_TIMEOUT_MS, using default");
            }
        }

        config
    }
}
