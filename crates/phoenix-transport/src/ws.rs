//! The concrete WebSocket transport, over `tokio-tungstenite`.
//!
//! Grounded on the teacher's `ws_client.rs` connection-manager loop: a
//! spawned task owns the split sink/stream and drains an outbound queue
//! alongside reading inbound frames via `tokio::select!`. Unlike the
//! teacher, this transport does not reconnect itself — `Socket` owns
//! reconnect backoff, and asks the transport builder for a brand new
//! instance on each attempt — so a dropped connection here is reported to
//! observers once and the loop simply ends.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, trace, warn};

use phoenix_core::error::{TransportError, TransportResult};
use phoenix_core::transport::{Transport, TransportObserver};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// A [`Transport`] backed by a single `tokio-tungstenite` WebSocket
/// connection. One instance is good for one connection attempt: once it
/// closes or errors it will not reconnect, matching the contract
/// [`phoenix_core::transport::TransportBuilder`] documents.
pub struct WsTransport {
    url: String,
    self_weak: Weak<WsTransport>,
    observers: Mutex<Vec<Arc<dyn TransportObserver>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl WsTransport {
    /// Builds a transport for `url`. Returned as an `Arc` because the
    /// connection-manager task `connect` spawns needs to outlive the
    /// `&self` call that started it; the transport keeps a weak reference
    /// to itself (set up via `Arc::new_cyclic`) to upgrade into that task.
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            url: url.into(),
            self_weak: weak.clone(),
            observers: Mutex::new(Vec::new()),
            outbound: Mutex::new(None),
        })
    }

    fn notify_opened(&self) {
        for obs in self.observers.lock().iter() {
            obs.opened();
        }
    }

    fn notify_closed(&self, code: u16, reason: String) {
        for obs in self.observers.lock().iter() {
            obs.closed(code, reason.clone());
        }
    }

    fn notify_message(&self, text: String) {
        for obs in self.observers.lock().iter() {
            obs.message(text.clone());
        }
    }

    fn notify_error(&self, err: TransportError) {
        for obs in self.observers.lock().iter() {
            obs.error(err.clone());
        }
    }

    async fn run(self: Arc<Self>, mut ws_tx: WsSink, mut ws_rx: WsSource, mut outbound_rx: mpsc::UnboundedReceiver<Message>) {
        self.notify_opened();
        loop {
            tokio::select! {
                outbound = outbound_rx.recv() => {
                    match outbound {
                        Some(msg) => {
                            if let Err(err) = ws_tx.send(msg).await {
                                warn!(url = %self.url, %err, "failed to send frame");
                                self.notify_error(TransportError::SendFailed(err.to_string()));
                            }
                        }
                        None => {
                            // Sender dropped: a deliberate close.
                            let _ = ws_tx.close().await;
                            self.notify_closed(1000, "client closed".to_string());
                            break;
                        }
                    }
                }
                inbound = ws_rx.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            trace!(url = %self.url, len = text.len(), "received frame");
                            self.notify_message(text.to_string());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = ws_tx.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, String::new()));
                            info!(url = %self.url, code, "server closed connection");
                            self.notify_closed(code, reason);
                            break;
                        }
                        Some(Ok(Message::Binary(_)) | Ok(Message::Frame(_))) => {}
                        Some(Err(err)) => {
                            warn!(url = %self.url, %err, "websocket error");
                            self.notify_error(TransportError::Protocol(err.to_string()));
                            self.notify_closed(1006, err.to_string());
                            break;
                        }
                        None => {
                            info!(url = %self.url, "websocket stream ended");
                            self.notify_closed(1006, "connection lost".to_string());
                            break;
                        }
                    }
                }
            }
        }
        *self.outbound.lock() = None;
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> TransportResult<()> {
        let (ws_stream, _response) = connect_async(&self.url)
            .await
            .map_err(|err| TransportError::ConnectionFailed(err.to_string()))?;

        let (ws_tx, ws_rx) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(outbound_tx);

        if let Some(strong) = self.self_weak.upgrade() {
            tokio::spawn(async move {
                strong.run(ws_tx, ws_rx, outbound_rx).await;
            });
        }
        Ok(())
    }

    async fn send(&self, text: String) -> TransportResult<()> {
        let sender = self.outbound.lock().clone();
        match sender {
            Some(tx) => tx
                .send(Message::Text(text.into()))
                .map_err(|_| TransportError::NotConnected),
            None => Err(TransportError::NotConnected),
        }
    }

    async fn close(&self, code: u16, reason: String) -> TransportResult<()> {
        if let Some(tx) = self.outbound.lock().take() {
            let _ = tx.send(Message::Close(Some(tokio_tungstenite::tungstenite::protocol::CloseFrame {
                code: code.into(),
                reason: reason.into(),
            })));
        }
        Ok(())
    }

    fn add_observer(&self, observer: Arc<dyn TransportObserver>) {
        self.observers.lock().push(observer);
    }

    fn remove_observer(&self, observer: &Arc<dyn TransportObserver>) {
        self.observers.lock().retain(|o| !Arc::ptr_eq(o, observer));
    }

    fn observers(&self) -> Vec<Arc<dyn TransportObserver>> {
        self.observers.lock().clone()
    }
}
