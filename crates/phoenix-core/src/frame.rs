//! Wire frame types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Phoenix Channels wire frame.
///
/// ```json
/// { "topic": "...", "event": "...", "payload": {...}, "ref": "..." }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// The channel topic this frame belongs to.
    pub topic: String,
    /// The event name.
    pub event: String,
    /// The event payload.
    pub payload: Value,
    /// The correlation ref, if any.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
}

impl Frame {
    /// Builds a frame with no ref set.
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            r#ref: None,
        }
    }

    /// Builds a frame carrying a correlation ref.
    pub fn with_ref(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
        r#ref: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
            r#ref: Some(r#ref.into()),
        }
    }
}

/// The payload shape carried by a `phx_reply` frame's `payload` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPayload {
    /// The reply status, e.g. `"ok"` or `"error"`.
    pub status: String,
    /// The reply body.
    pub response: Value,
}

/// Reserved event names used by the protocol.
pub mod events {
    /// Sent by the client to join a channel.
    pub const JOIN: &str = "phx_join";
    /// Sent by the client to leave a channel.
    pub const LEAVE: &str = "phx_leave";
    /// Sent by the server carrying a correlated reply.
    pub const REPLY: &str = "phx_reply";
    /// Sent by the server (or synthesized locally) when a channel closes.
    pub const CLOSE: &str = "phx_close";
    /// Sent by the server (or synthesized locally) on a channel-level error.
    pub const ERROR: &str = "phx_error";
    /// The reserved topic carrying heartbeat frames.
    pub const HEARTBEAT_TOPIC: &str = "phoenix";
    /// The heartbeat event name.
    pub const HEARTBEAT: &str = "heartbeat";
}
