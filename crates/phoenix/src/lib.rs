//! A Phoenix Channels client.
//!
//! ```no_run
//! use phoenix::prelude::*;
//!
//! let socket = Socket::new(
//!     "ws://localhost:4000/socket",
//!     SocketConfig::default(),
//!     phoenix::default_transport_builder(),
//! );
//! socket.connect();
//!
//! let channel = socket.channel("rooms:lobby", serde_json::json!({}));
//! channel.join(None).unwrap().receive("ok", |_resp| {
//!     println!("joined");
//! });
//! ```
//!
//! This crate is a thin façade: the engine lives in `phoenix-core`, the
//! WebSocket plumbing in `phoenix-transport`. Most applications only need
//! this crate and its [`prelude`].

pub use phoenix_core::{channel, config, error, frame, logging, push, socket, timer, transport};
pub use phoenix_transport::{ws_transport_builder as default_transport_builder, WsTransport};

/// Commonly used types, re-exported for a single glob import.
pub mod prelude {
    pub use phoenix_core::prelude::*;
    pub use phoenix_transport::WsTransport;

    pub use crate::default_transport_builder;
}
