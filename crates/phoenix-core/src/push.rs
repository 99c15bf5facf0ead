//! Push — one in-flight request/reply correlation on a channel.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

use crate::channel::ChannelInner;
use crate::frame::{Frame, ReplyPayload};
use crate::timer::{Interval, RepeatingTimer};

/// A well-known terminal push status, or any other status a server sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushStatus {
    /// The request succeeded.
    Ok,
    /// The server reported an error.
    Error,
    /// No reply arrived within the push's timeout.
    Timeout,
    /// Any other status string the server sent.
    Other(String),
}

impl PushStatus {
    /// The wire representation of this status.
    pub fn as_str(&self) -> &str {
        match self {
            PushStatus::Ok => "ok",
            PushStatus::Error => "error",
            PushStatus::Timeout => "timeout",
            PushStatus::Other(s) => s,
        }
    }
}

impl From<&str> for PushStatus {
    fn from(s: &str) -> Self {
        match s {
            "ok" => PushStatus::Ok,
            "error" => PushStatus::Error,
            "timeout" => PushStatus::Timeout,
            other => PushStatus::Other(other.to_string()),
        }
    }
}

type RecvCallback = Arc<dyn Fn(Value) + Send + Sync>;

struct PushState {
    timeout: Duration,
    r#ref: Option<String>,
    ref_event: Option<String>,
    sent: bool,
    received: Option<(String, Value)>,
    recv_hooks: Vec<(String, RecvCallback)>,
    timer: Option<RepeatingTimer>,
}

struct PushInner {
    channel: Weak<ChannelInner>,
    event: String,
    payload: Value,
    state: Mutex<PushState>,
}

/// One outbound request awaiting a correlated reply.
///
/// Cheap to clone — clones share the same underlying state, the way the
/// channel's push buffer and the caller's own handle both refer to the same
/// logical push.
#[derive(Clone)]
pub struct Push {
    inner: Arc<PushInner>,
}

impl Push {
    pub(crate) fn new(
        channel: Weak<ChannelInner>,
        event: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PushInner {
                channel,
                event: event.into(),
                payload,
                state: Mutex::new(PushState {
                    timeout,
                    r#ref: None,
                    ref_event: None,
                    sent: false,
                    received: None,
                    recv_hooks: Vec::new(),
                    timer: None,
                }),
            }),
        }
    }

    fn channel(&self) -> Option<crate::channel::Channel> {
        self.inner.channel.upgrade().map(crate::channel::Channel::from_inner)
    }

    /// The ref assigned to this push, if it has been sent.
    pub fn r#ref(&self) -> Option<String> {
        self.inner.state.lock().r#ref.clone()
    }

    /// Whether a response matching `status` has already arrived.
    pub fn has_received(&self, status: &str) -> bool {
        matches!(&self.inner.state.lock().received, Some((s, _)) if s == status)
    }

    /// Sends the push: assigns a fresh ref, arms the timeout, marks sent,
    /// and enqueues the frame on the socket. A push that has already timed
    /// out is not re-sent.
    pub fn send(&self) {
        let mut state = self.inner.state.lock();
        self.send_locked(&mut state);
    }

    /// Re-arms this push with a new timeout and re-sends it, clearing any
    /// prior ref, ref-event binding, and recorded response. Used by the join
    /// push on rejoin so it is reused rather than reallocated.
    pub fn resend(&self, timeout: Duration) {
        let mut state = self.inner.state.lock();
        state.timeout = timeout;
        self.cancel_ref_event_locked(&mut state);
        state.r#ref = None;
        state.ref_event = None;
        state.received = None;
        state.sent = false;
        self.send_locked(&mut state);
    }

    /// Registers interest in a terminal status. If a matching response has
    /// already arrived, `callback` runs immediately (outside any lock) with
    /// the cached response.
    pub fn receive<F>(&self, status: impl Into<String>, callback: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let status = status.into();
        let callback: RecvCallback = Arc::new(callback);
        let immediate = {
            let mut state = self.inner.state.lock();
            match &state.received {
                Some((s, resp)) if *s == status => Some(resp.clone()),
                _ => {
                    state.recv_hooks.push((status, callback.clone()));
                    None
                }
            }
        };
        if let Some(resp) = immediate {
            callback(resp);
        }
        self.clone()
    }

    /// Arms the timeout timer without sending. Used when a push is buffered
    /// on a channel that has not yet joined.
    pub fn start_timeout(&self) {
        let mut state = self.inner.state.lock();
        self.start_timeout_locked(&mut state);
    }

    /// Synthesizes a local terminal response, as if a reply frame carrying
    /// `status`/`response` had arrived.
    pub fn trigger(&self, status: impl Into<String>, response: Value) {
        self.record_response(status.into(), response);
    }

    fn send_locked(&self, state: &mut PushState) {
        if Self::has_received_locked(state, "timeout") {
            return;
        }
        self.start_timeout_locked(state);
        state.sent = true;
        let Some(channel) = self.channel() else { return };
        let r#ref = state.r#ref.clone().unwrap_or_default();
        let frame = Frame::with_ref(
            channel.topic().to_string(),
            self.inner.event.clone(),
            self.inner.payload.clone(),
            r#ref.clone(),
        );
        trace!(topic = %channel.topic(), event = %self.inner.event, r#ref = %r#ref, "push send");
        channel.enqueue_frame(frame);
    }

    fn start_timeout_locked(&self, state: &mut PushState) {
        if state.timer.is_some() {
            return;
        }
        let Some(channel) = self.channel() else { return };
        let r#ref = channel.make_ref();
        let ref_event = channel.reply_event_name(&r#ref);
        state.r#ref = Some(r#ref);
        state.ref_event = Some(ref_event.clone());

        let weak_reply = Arc::downgrade(&self.inner);
        channel.on(&ref_event, move |payload, _ref| {
            if let Some(inner) = weak_reply.upgrade() {
                Push { inner }.handle_reply(payload);
            }
        });

        let weak_timeout = Arc::downgrade(&self.inner);
        let timer = RepeatingTimer::new(Interval::Fixed(state.timeout), move || {
            if let Some(inner) = weak_timeout.upgrade() {
                Push { inner }.handle_timeout();
            }
        });
        timer.start();
        state.timer = Some(timer);
    }

    fn handle_reply(&self, payload: Value) {
        let Ok(reply) = serde_json::from_value::<ReplyPayload>(payload) else {
            return;
        };
        self.record_response(reply.status, reply.response);
    }

    fn handle_timeout(&self) {
        // Remove the stale ref-event binding here too, not only on a normal
        // reply, so a late server reply cannot reach a dead hook.
        let timer = {
            let mut state = self.inner.state.lock();
            self.cancel_ref_event_locked(&mut state);
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.cancel();
        }
        self.record_response("timeout".to_string(), Value::Object(Default::default()));
    }

    fn record_response(&self, status: String, response: Value) {
        let hooks = {
            let mut state = self.inner.state.lock();
            self.cancel_ref_event_locked(&mut state);
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.received = Some((status.clone(), response.clone()));
            state
                .recv_hooks
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, cb)| cb.clone())
                .collect::<Vec<_>>()
        };
        for hook in hooks {
            hook(response.clone());
        }
    }

    fn cancel_ref_event_locked(&self, state: &mut PushState) {
        let Some(ref_event) = state.ref_event.take() else {
            return;
        };
        if let Some(channel) = self.channel() {
            channel.off(&ref_event);
        }
    }

    fn has_received_locked(state: &PushState, status: &str) -> bool {
        matches!(&state.received, Some((s, _)) if s == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::socket::Socket;
    use crate::test_support::{MockTransport, immediate_builder};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    async fn joined_channel() -> (Socket, Channel, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let socket = Socket::new(
            "ws://localhost:4000/socket",
            Default::default(),
            immediate_builder(transport.clone()),
        );
        socket.connect();
        transport.fire_opened();
        let channel = socket.channel("rooms:lobby", serde_json::json!({}));
        channel.join(None).unwrap();
        tokio::task::yield_now().await;
        transport.reply_ok_to_all(serde_json::json!({}));
        (socket, channel, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn receive_after_response_fires_synchronously() {
        let (_socket, channel, transport) = joined_channel().await;
        let push = channel.push("msg", serde_json::json!({}), None).unwrap();
        tokio::task::yield_now().await;
        transport.reply_ok_to_all(serde_json::json!({"ok": true}));

        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();
        push.receive("ok", move |_resp| {
            f.store(true, Ordering::SeqCst);
        });
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_once_and_blocks_late_reply() {
        let (_socket, channel, transport) = joined_channel().await;
        let push = channel.push("msg", serde_json::json!({}), Some(Duration::from_millis(50)));
        let push = push.unwrap();

        let timeouts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let t = timeouts.clone();
        push.receive("timeout", move |_| {
            t.fetch_add(1, Ordering::SeqCst);
        });
        let oks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let o = oks.clone();
        push.receive("ok", move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);

        // A late reply with the push's old ref must not fire "ok": its
        // ref-event binding was removed when the timeout fired.
        transport.reply_ok_to_all(serde_json::json!({}));
        assert_eq!(oks.load(Ordering::SeqCst), 0);
    }
}
