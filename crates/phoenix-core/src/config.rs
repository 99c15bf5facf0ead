//! Socket configuration.

use std::time::Duration;

use serde_json::Value;

use crate::timer::{default_reconnect_schedule, Interval};

/// Tunables for a [`crate::socket::Socket`].
///
/// Mirrors the shape of the teacher's transport-layer config builders:
/// a plain struct with a sensible [`Default`], constructed with struct
/// update syntax at the call site rather than a fluent builder, since there
/// is no multi-step validation to justify one.
pub struct SocketConfig {
    /// How often a heartbeat frame is sent while the socket is open.
    pub heartbeat_interval: Duration,
    /// The delay before each reconnect attempt, indexed by attempt count.
    pub reconnect_interval: Interval,
    /// Static params appended to the connection URL's query string, e.g. an
    /// auth token.
    pub params: Value,
    /// The default timeout used for `join`/`leave`/`push` calls (and
    /// rejoin attempts) that don't specify their own.
    pub timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(30_000),
            reconnect_interval: default_reconnect_schedule(),
            params: Value::Object(Default::default()),
            timeout: Duration::from_millis(10_000),
        }
    }
}
