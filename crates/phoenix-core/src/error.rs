//! Error types for the channel multiplexing engine.
//!
//! Errors are split by concern, the way the capability traits they guard are
//! split: transport failures, channel usage mistakes, and URL construction
//! each get their own enum rather than one catch-all.

use thiserror::Error;

/// Errors surfaced by a [`crate::transport::Transport`] implementation.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The transport failed to establish a connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Sending a frame failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The transport is not open.
    #[error("transport is not connected")]
    NotConnected,

    /// The transport reported a protocol-level error.
    #[error("transport error: {0}")]
    Protocol(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Usage errors — programmer mistakes caught at the call site, never panics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// `join` was called a second time on the same channel instance.
    #[error("'join' can only be called a single time per channel instance (topic '{topic}')")]
    AlreadyJoined {
        /// The channel's topic.
        topic: String,
    },

    /// `push` was called before the channel was ever joined.
    #[error("tried to push '{event}' to '{topic}' before joining")]
    NotJoined {
        /// The channel's topic.
        topic: String,
        /// The event that was attempted.
        event: String,
    },
}

/// Result type for channel usage operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors constructing a Socket's endpoint URL.
#[derive(Debug, Clone, Error)]
pub enum UrlError {
    /// The endpoint did not include a recognizable scheme or domain.
    #[error("expected endpoint to include a scheme and domain, got '{0}'")]
    MissingDomain(String),
}

/// Result type for URL construction.
pub type UrlResult<T> = Result<T, UrlError>;
