//! Client for request/response exchanges with the Device.
//!
//! The Device can only answer when the Host clocks it, and may not have its
//! response ready within the transaction that carried the command.  The client
//! sends the command, then polls with empty messages until a response arrives.
//!
//! See [`AsyncLinkClient`] for usage.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

pub mod futures;

pub use futures::{AsyncDelay, AsyncLinkClient};

/// Configuration for creating a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Empty polls to make after the command before giving up on a response
    pub max_polls: u32,
}

impl ClientConfig {
    pub const DEFAULT_MAX_POLLS: u32 = 100;

    pub const fn new() -> Self {
        Self {
            max_polls: Self::DEFAULT_MAX_POLLS,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
