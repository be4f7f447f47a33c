//! Typed control messages from page clients.
//!
//! The only message the cache engine itself recognizes is
//! `{"type":"SKIP_WAITING"}`; anything else is ignored.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A control message posted from a page context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Activate the waiting worker version immediately.
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl ClientMessage {
    /// Parse a raw message. Unrecognized or malformed messages yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(_) => {
                debug!(raw, "ignoring unrecognized client message");
                None
            }
        }
    }
}
