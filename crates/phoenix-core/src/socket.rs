//! Socket — connection lifecycle, heartbeat, reconnect backoff, and inbound
//! frame routing to channels.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use crate::channel::Channel;
use crate::config::SocketConfig;
use crate::error::{TransportError, UrlError, UrlResult};
use crate::frame::{events, Frame};
use crate::timer::RepeatingTimer;
use crate::transport::{Transport, TransportBuilder, TransportObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketState {
    Closed,
    Connecting,
    Open,
    Closing,
}

struct ObserverHooks {
    on_open: Vec<Arc<dyn Fn() + Send + Sync>>,
    on_close: Vec<Arc<dyn Fn(u16, String) + Send + Sync>>,
    on_error: Vec<Arc<dyn Fn(TransportError) + Send + Sync>>,
}

pub struct SocketInner {
    endpoint_url: String,
    config: SocketConfig,
    transport_builder: TransportBuilder,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    state: Mutex<SocketState>,
    channels: Mutex<Vec<Channel>>,
    send_buffer: Mutex<VecDeque<Frame>>,
    ref_counter: AtomicU64,
    heartbeat_timer: RepeatingTimer,
    reconnect_timer: RepeatingTimer,
    closed_deliberately: AtomicBool,
    hooks: Mutex<ObserverHooks>,
}

/// The connection to a Phoenix Channels endpoint.
///
/// Owns zero or more [`Channel`]s, the outbound send buffer they and the
/// heartbeat share, and the transport lifecycle (connect, heartbeat,
/// reconnect backoff). Cheap to clone — clones share the same connection.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    /// Builds a socket for `endpoint`, which must include a scheme and host,
    /// e.g. `"ws://localhost:4000/socket"`. The `/websocket` transport
    /// segment and `vsn` query parameter are appended automatically.
    pub fn new(endpoint: &str, config: SocketConfig, transport_builder: TransportBuilder) -> Self {
        let endpoint_url = build_endpoint_url(endpoint, &config.params)
            .unwrap_or_else(|err| {
                warn!(endpoint, %err, "socket endpoint could not be fully qualified, using as-is");
                endpoint.to_string()
            });

        let heartbeat_interval = config.heartbeat_interval;
        let reconnect_interval = config.reconnect_interval.clone();

        let inner = Arc::new_cyclic(|weak: &Weak<SocketInner>| {
            let weak_hb = weak.clone();
            let heartbeat_timer = RepeatingTimer::new(
                crate::timer::Interval::Fixed(heartbeat_interval),
                move || {
                    if let Some(inner) = weak_hb.upgrade() {
                        Socket { inner }.send_heartbeat();
                    }
                },
            );
            let weak_rc = weak.clone();
            let reconnect_timer = RepeatingTimer::new(reconnect_interval, move || {
                if let Some(inner) = weak_rc.upgrade() {
                    Socket { inner }.attempt_reconnect();
                }
            });

            SocketInner {
                endpoint_url,
                config,
                transport_builder,
                transport: Mutex::new(None),
                state: Mutex::new(SocketState::Closed),
                channels: Mutex::new(Vec::new()),
                send_buffer: Mutex::new(VecDeque::new()),
                ref_counter: AtomicU64::new(0),
                heartbeat_timer,
                reconnect_timer,
                closed_deliberately: AtomicBool::new(false),
                hooks: Mutex::new(ObserverHooks {
                    on_open: Vec::new(),
                    on_close: Vec::new(),
                    on_error: Vec::new(),
                }),
            }
        });
        Socket { inner }
    }

    pub(crate) fn from_inner(inner: Arc<SocketInner>) -> Self {
        Socket { inner }
    }

    fn downgrade(&self) -> Weak<SocketInner> {
        Arc::downgrade(&self.inner)
    }

    /// The fully-qualified endpoint URL this socket connects to.
    pub fn endpoint_url(&self) -> &str {
        &self.inner.endpoint_url
    }

    /// Whether the socket currently has an open transport.
    pub fn is_connected(&self) -> bool {
        *self.inner.state.lock() == SocketState::Open
    }

    /// Registers a callback fired each time the transport opens.
    pub fn on_open(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.inner.hooks.lock().on_open.push(Arc::new(callback));
    }

    /// Registers a callback fired each time the transport closes.
    pub fn on_close(&self, callback: impl Fn(u16, String) + Send + Sync + 'static) {
        self.inner.hooks.lock().on_close.push(Arc::new(callback));
    }

    /// Registers a callback fired on every transport-level error.
    pub fn on_error(&self, callback: impl Fn(TransportError) + Send + Sync + 'static) {
        self.inner.hooks.lock().on_error.push(Arc::new(callback));
    }

    /// Obtains (creating if necessary is the caller's job — this always
    /// creates a fresh instance) a channel for `topic`.
    pub fn channel(&self, topic: impl Into<String>, params: Value) -> Channel {
        let channel = Channel::new(topic, params, self.downgrade(), self.inner.config.timeout);
        self.inner.channels.lock().push(channel.clone());
        channel
    }

    /// Initiates the connection. A no-op if already connecting or open.
    pub fn connect(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != SocketState::Closed {
                return;
            }
            *state = SocketState::Connecting;
        }
        self.inner.closed_deliberately.store(false, Ordering::SeqCst);
        let transport = self.build_transport();
        tokio::spawn(async move {
            if let Err(err) = transport.connect().await {
                warn!(%err, "socket connect failed");
            }
        });
    }

    /// Deliberately closes the connection. Unlike a transport-initiated
    /// close, this does not schedule a reconnect.
    pub fn disconnect(&self, code: u16, reason: impl Into<String>) {
        let reason = reason.into();
        self.inner.closed_deliberately.store(true, Ordering::SeqCst);
        self.inner.heartbeat_timer.cancel();
        self.inner.reconnect_timer.cancel();
        *self.inner.state.lock() = SocketState::Closing;
        if let Some(transport) = self.inner.transport.lock().clone() {
            tokio::spawn(async move {
                let _ = transport.close(code, reason).await;
            });
        }
    }

    pub(crate) fn next_ref(&self) -> String {
        (self.inner.ref_counter.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Enqueues `frame` for sending. Sent immediately if the transport is
    /// open, otherwise buffered and flushed in order once it reopens.
    pub(crate) fn push_frame(&self, frame: Frame) {
        let open_transport = {
            let state = self.inner.state.lock();
            if *state == SocketState::Open {
                self.inner.transport.lock().clone()
            } else {
                None
            }
        };
        match open_transport {
            Some(transport) => self.send_now(transport, frame),
            None => self.inner.send_buffer.lock().push_back(frame),
        }
    }

    pub(crate) fn remove_channel(&self, channel: &Channel) {
        self.inner.channels.lock().retain(|c| !c.same_instance(channel));
    }

    fn send_now(&self, transport: Arc<dyn Transport>, frame: Frame) {
        let Ok(text) = serde_json::to_string(&frame) else { return };
        tokio::spawn(async move {
            if let Err(err) = transport.send(text).await {
                warn!(%err, "failed to send frame");
            }
        });
    }

    fn send_heartbeat(&self) {
        self.push_frame(Frame::with_ref(
            events::HEARTBEAT_TOPIC,
            events::HEARTBEAT,
            Value::Object(Default::default()),
            self.next_ref(),
        ));
    }

    fn build_transport(&self) -> Arc<dyn Transport> {
        let observers: Vec<Arc<dyn TransportObserver>> = {
            let existing = self.inner.transport.lock().clone();
            match existing {
                Some(old) => old.observers(),
                None => vec![Arc::new(SocketObserver(self.downgrade())) as Arc<dyn TransportObserver>],
            }
        };
        let transport = (self.inner.transport_builder)(&self.inner.endpoint_url, observers);
        *self.inner.transport.lock() = Some(transport.clone());
        transport
    }

    fn attempt_reconnect(&self) {
        if self.inner.closed_deliberately.load(Ordering::SeqCst) {
            return;
        }
        debug!(attempt = self.inner.reconnect_timer.attempt(), "attempting reconnect");
        *self.inner.state.lock() = SocketState::Connecting;
        let transport = self.build_transport();
        tokio::spawn(async move {
            if let Err(err) = transport.connect().await {
                warn!(%err, "socket reconnect failed");
            }
        });
    }

    fn handle_opened(&self) {
        debug!("socket opened");
        *self.inner.state.lock() = SocketState::Open;
        self.inner.reconnect_timer.cancel();
        self.inner.heartbeat_timer.start();

        let buffered: Vec<Frame> = {
            let mut buf = self.inner.send_buffer.lock();
            buf.drain(..).collect()
        };
        let transport = self.inner.transport.lock().clone();
        if let Some(transport) = transport {
            for frame in buffered {
                self.send_now(transport.clone(), frame);
            }
        }

        for channel in self.inner.channels.lock().iter() {
            if channel.state() == crate::channel::ChannelState::Errored {
                channel.rejoin();
            }
        }

        for hook in self.inner.hooks.lock().on_open.iter() {
            hook();
        }
    }

    fn handle_closed(&self, code: u16, reason: String) {
        debug!(code, %reason, "socket closed");
        self.mark_disconnected();

        for hook in self.inner.hooks.lock().on_close.iter() {
            hook(code, reason.clone());
        }
    }

    /// Shared by `handle_closed` and `handle_error`: both leave the socket
    /// disconnected and notify channels identically, since a transport that
    /// reports an error isn't guaranteed to also report closed.
    fn mark_disconnected(&self) {
        self.inner.heartbeat_timer.cancel();
        *self.inner.state.lock() = SocketState::Closed;

        let deliberate = self.inner.closed_deliberately.load(Ordering::SeqCst);
        if !deliberate {
            for channel in self.inner.channels.lock().iter() {
                use crate::channel::ChannelState::*;
                if matches!(channel.state(), Joined | Joining) {
                    channel.trigger(events::ERROR, Value::Object(Default::default()), None);
                }
            }
            self.inner.reconnect_timer.start();
        }
    }

    fn handle_message(&self, text: String) {
        let frame: Frame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(err) => {
                warn!(%err, "dropping malformed inbound frame");
                return;
            }
        };
        trace!(topic = %frame.topic, event = %frame.event, "inbound frame");
        if frame.topic == events::HEARTBEAT_TOPIC {
            return;
        }
        for channel in self.inner.channels.lock().iter() {
            if channel.topic() == frame.topic {
                channel.handle_inbound(&frame.event, frame.payload.clone(), frame.r#ref.clone());
            }
        }
    }

    fn handle_error(&self, err: TransportError) {
        warn!(%err, "transport error");
        self.mark_disconnected();

        for hook in self.inner.hooks.lock().on_error.iter() {
            hook(err.clone());
        }
    }
}

struct SocketObserver(Weak<SocketInner>);

impl TransportObserver for SocketObserver {
    fn opened(&self) {
        if let Some(inner) = self.0.upgrade() {
            Socket { inner }.handle_opened();
        }
    }

    fn closed(&self, code: u16, reason: String) {
        if let Some(inner) = self.0.upgrade() {
            Socket { inner }.handle_closed(code, reason);
        }
    }

    fn message(&self, text: String) {
        if let Some(inner) = self.0.upgrade() {
            Socket { inner }.handle_message(text);
        }
    }

    fn error(&self, err: TransportError) {
        if let Some(inner) = self.0.upgrade() {
            Socket { inner }.handle_error(err);
        }
    }
}

/// Appends the `/websocket` transport segment and `vsn=1.0.0` query
/// parameter to `endpoint`, preserving any existing path and query string.
fn build_endpoint_url(endpoint: &str, params: &Value) -> UrlResult<String> {
    let mut url = Url::parse(endpoint).map_err(|_| UrlError::MissingDomain(endpoint.to_string()))?;
    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain(endpoint.to_string()));
    }
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| UrlError::MissingDomain(endpoint.to_string()))?;
        segments.pop_if_empty().push("websocket");
    }
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("vsn", "1.0.0");
        if let Value::Object(map) = params {
            for (key, value) in map {
                let value_str = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                query.append_pair(key, &value_str);
            }
        }
    }
    Ok(url.to_string())
}
