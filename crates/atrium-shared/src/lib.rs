//! # atrium-shared
//!
//! Domain types, socket protocol frames and configuration shared by every
//! Atrium crate.  Channels, messages and read cursors are defined here once
//! so the store, the network layer and the client core all agree on them.

pub mod config;
pub mod constants;
pub mod protocol;
pub mod types;

pub use config::Config;
pub use types::*;
