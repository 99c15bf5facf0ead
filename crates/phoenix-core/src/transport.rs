//! Transport capability traits.
//!
//! The WebSocket transport itself — framing, TLS, the HTTP upgrade — is an
//! external collaborator (see `phoenix-transport` for the concrete
//! `tokio-tungstenite` implementation). This module only defines the seam:
//! a [`Transport`] that accepts outbound text frames and a set of
//! [`TransportObserver`]s it notifies of lifecycle signals.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TransportResult;

/// Receives lifecycle signals from a [`Transport`].
///
/// A transport delivers these four signals serially per observer — never two
/// concurrent invocations on the same observer — so implementations may
/// assume single-threaded-per-observer access, even though the transport
/// itself runs on its own task.
pub trait TransportObserver: Send + Sync {
    /// The transport finished connecting.
    fn opened(&self);
    /// The transport closed, deliberately or otherwise.
    fn closed(&self, code: u16, reason: String);
    /// A text frame arrived.
    fn message(&self, text: String);
    /// The transport reported an error.
    fn error(&self, err: crate::error::TransportError);
}

/// A WebSocket-like transport: connect, send text frames, close, and notify
/// a set of observers of lifecycle events.
///
/// Observer list mutation must be safe under concurrent signal delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Initiates the connection. Lifecycle signals arrive via observers.
    async fn connect(&self) -> TransportResult<()>;

    /// Sends a text frame. Assumed to be a brief, non-blocking call.
    async fn send(&self, text: String) -> TransportResult<()>;

    /// Closes the transport deliberately.
    async fn close(&self, code: u16, reason: String) -> TransportResult<()>;

    /// Registers an observer to receive lifecycle signals.
    fn add_observer(&self, observer: Arc<dyn TransportObserver>);

    /// Removes a previously registered observer (by pointer identity).
    fn remove_observer(&self, observer: &Arc<dyn TransportObserver>);

    /// Returns the currently registered observers, in registration order.
    ///
    /// Used by [`crate::socket::Socket`] to transplant observers into a
    /// freshly constructed transport on reconnect.
    fn observers(&self) -> Vec<Arc<dyn TransportObserver>>;
}

/// Constructs a fresh [`Transport`] for the given endpoint URL, pre-seeded
/// with the given observers.
///
/// A [`crate::socket::Socket`] is generic over this builder rather than over
/// a concrete transport type, so tests can substitute a scripted mock without
/// touching the multiplexing engine.
pub type TransportBuilder =
    Arc<dyn Fn(&str, Vec<Arc<dyn TransportObserver>>) -> Arc<dyn Transport> + Send + Sync>;
