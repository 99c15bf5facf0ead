//! Channel multiplexing and reliability engine for Phoenix Channels clients.
//!
//! This crate owns the protocol-level state machines — [`socket::Socket`]
//! connection lifecycle, [`channel::Channel`] join/leave, and
//! [`push::Push`] request/reply correlation — over an abstract
//! [`transport::Transport`]. A concrete WebSocket transport lives in the
//! sibling `phoenix-transport` crate; this crate never dials a socket
//! itself.

pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod push;
pub mod socket;
pub mod timer;
pub mod transport;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod scenarios;

/// Commonly used types, re-exported for a single glob import.
pub mod prelude {
    pub use crate::channel::{Channel, ChannelState};
    pub use crate::config::SocketConfig;
    pub use crate::error::{ChannelError, ChannelResult, TransportError, TransportResult, UrlError, UrlResult};
    pub use crate::frame::{events, Frame, ReplyPayload};
    pub use crate::push::{Push, PushStatus};
    pub use crate::socket::Socket;
    pub use crate::transport::{Transport, TransportBuilder, TransportObserver};
}
