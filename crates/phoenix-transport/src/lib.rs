//! The WebSocket transport implementation for `phoenix-core`'s `Socket`.

mod ws;

use std::sync::Arc;

use phoenix_core::transport::{Transport, TransportBuilder, TransportObserver};

pub use ws::WsTransport;

/// A [`TransportBuilder`] that dials `url` with a fresh [`WsTransport`] on
/// every call — exactly what `Socket` needs on reconnect, since each
/// attempt gets its own transport instance rather than one that tries to
/// reconnect itself.
pub fn ws_transport_builder() -> TransportBuilder {
    Arc::new(|url: &str, observers: Vec<Arc<dyn TransportObserver>>| {
        let transport = WsTransport::new(url.to_string());
        for observer in observers {
            transport.add_observer(observer);
        }
        transport as Arc<dyn Transport>
    })
}
