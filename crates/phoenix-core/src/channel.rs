//! Channel — per-topic join/leave state machine and event dispatch.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::frame::events;
use crate::push::Push;
use crate::socket::{Socket, SocketInner};
use crate::timer::{default_reconnect_schedule, RepeatingTimer};

/// The channel's join lifecycle state.
///
/// `Leaving` is not present in the source implementation's state set, where
/// a helper checks membership against a state the enum never actually took
/// on; it is added here so that check is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Errored,
    Joining,
    Joined,
    Leaving,
}

type Binding = (String, Arc<dyn Fn(Value, Option<String>) + Send + Sync>);

struct State {
    channel_state: ChannelState,
    joined_once: bool,
    bindings: Vec<Binding>,
    push_buffer: Vec<Push>,
    join_push: Option<Push>,
}

pub struct ChannelInner {
    topic: String,
    params: Value,
    socket: Weak<SocketInner>,
    state: Mutex<State>,
    rejoin_timer: RepeatingTimer,
    default_timeout: Duration,
}

/// One topic's join/leave state machine, push buffer, and event bindings.
///
/// Cheap to clone — clones share the same underlying state, the way a
/// [`crate::push::Push`] and the channel's own buffer both refer to one
/// logical push.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn new(
        topic: impl Into<String>,
        params: Value,
        socket: Weak<SocketInner>,
        default_timeout: Duration,
    ) -> Self {
        let topic = topic.into();
        let state = Mutex::new(State {
            channel_state: ChannelState::Closed,
            joined_once: false,
            bindings: Vec::new(),
            push_buffer: Vec::new(),
            join_push: None,
        });

        let inner = Arc::new_cyclic(|weak: &Weak<ChannelInner>| {
            let weak_for_rejoin = weak.clone();
            // Shares the socket's reconnect schedule rather than a separate
            // channel-local one — see DESIGN.md.
            let rejoin_timer = RepeatingTimer::new(default_reconnect_schedule(), move || {
                if let Some(inner) = weak_for_rejoin.upgrade() {
                    Channel { inner }.rejoin();
                }
            });
            ChannelInner {
                topic,
                params,
                socket,
                state,
                rejoin_timer,
                default_timeout,
            }
        });

        let channel = Channel { inner };
        channel.install_standard_bindings();
        channel
    }

    pub(crate) fn from_inner(inner: Arc<ChannelInner>) -> Self {
        Channel { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ChannelInner> {
        Arc::downgrade(&self.inner)
    }

    /// The topic this channel was created for, e.g. `"rooms:lobby"`.
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// The channel's current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.inner.state.lock().channel_state
    }

    pub fn is_joined(&self) -> bool {
        self.state() == ChannelState::Joined
    }

    /// Whether `self` and `other` are handles to the same underlying
    /// channel instance, as opposed to two separate instances created for
    /// the same topic.
    pub fn same_instance(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Joins the channel. May only be called once per channel instance —
    /// rejoining after a disconnect is handled internally by the rejoin
    /// timer, not by calling `join` again.
    pub fn join(&self, timeout: Option<Duration>) -> ChannelResult<Push> {
        let mut state = self.inner.state.lock();
        if state.joined_once {
            return Err(ChannelError::AlreadyJoined {
                topic: self.inner.topic.clone(),
            });
        }
        state.joined_once = true;
        state.channel_state = ChannelState::Joining;

        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let join_push = Push::new(
            self.downgrade(),
            events::JOIN,
            self.inner.params.clone(),
            timeout,
        );
        self.bind_join_push(&join_push);
        state.join_push = Some(join_push.clone());
        drop(state);

        join_push.send();
        Ok(join_push)
    }

    /// Leaves the channel. Any buffered pushes are dropped; a push already
    /// in flight keeps its own independent timeout.
    pub fn leave(&self, timeout: Option<Duration>) -> Push {
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        {
            let mut state = self.inner.state.lock();
            state.channel_state = ChannelState::Leaving;
            state.push_buffer.clear();
        }
        self.inner.rejoin_timer.cancel();

        let leave_push = Push::new(self.downgrade(), events::LEAVE, Value::Object(Default::default()), timeout);
        let weak = self.downgrade();
        leave_push.receive("ok", move |_resp| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.finish_leave();
            }
        });
        let weak = self.downgrade();
        leave_push.receive("timeout", move |_resp| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.finish_leave();
            }
        });
        leave_push.send();

        if !self.socket_connected() {
            leave_push.trigger("ok", Value::Object(Default::default()));
        }
        leave_push
    }

    /// Sends `event`/`payload` on this channel. Buffered locally until the
    /// channel has joined if it has not yet done so.
    pub fn push(&self, event: impl Into<String>, payload: Value, timeout: Option<Duration>) -> ChannelResult<Push> {
        let event = event.into();
        let mut state = self.inner.state.lock();
        if !state.joined_once {
            return Err(ChannelError::NotJoined {
                topic: self.inner.topic.clone(),
                event,
            });
        }
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let push = Push::new(self.downgrade(), event, payload, timeout);
        if state.channel_state == ChannelState::Joined {
            drop(state);
            push.send();
        } else {
            push.start_timeout();
            state.push_buffer.push(push.clone());
        }
        Ok(push)
    }

    /// Registers `callback` for `event`. Multiple callbacks may share an
    /// event name; all fire, in registration order, on each dispatch.
    pub fn on<F>(&self, event: impl Into<String>, callback: F)
    where
        F: Fn(Value, Option<String>) + Send + Sync + 'static,
    {
        self.inner
            .state
            .lock()
            .bindings
            .push((event.into(), Arc::new(callback)));
    }

    /// Removes every callback registered for `event`.
    pub fn off(&self, event: &str) {
        self.inner.state.lock().bindings.retain(|(e, _)| e != event);
    }

    /// Dispatches `payload` to every binding registered for `event`.
    pub fn trigger(&self, event: &str, payload: Value, r#ref: Option<String>) {
        let matching: Vec<_> = {
            let state = self.inner.state.lock();
            state
                .bindings
                .iter()
                .filter(|(e, _)| e == event)
                .map(|(_, cb)| cb.clone())
                .collect()
        };
        for cb in matching {
            cb(payload.clone(), r#ref.clone());
        }
    }

    /// Handles an inbound frame addressed to this channel's topic.
    pub(crate) fn handle_inbound(&self, event: &str, payload: Value, r#ref: Option<String>) {
        self.trigger(event, payload, r#ref);
    }

    pub(crate) fn reply_event_name(&self, r#ref: &str) -> String {
        format!("chan_reply_{ref}", ref = r#ref)
    }

    pub(crate) fn make_ref(&self) -> String {
        self.socket().map(|s| s.next_ref()).unwrap_or_default()
    }

    pub(crate) fn enqueue_frame(&self, frame: crate::frame::Frame) {
        if let Some(socket) = self.socket() {
            socket.push_frame(frame);
        }
    }

    fn socket(&self) -> Option<Socket> {
        self.inner.socket.upgrade().map(Socket::from_inner)
    }

    fn socket_connected(&self) -> bool {
        self.socket().map(|s| s.is_connected()).unwrap_or(false)
    }

    fn install_standard_bindings(&self) {
        let weak = self.downgrade();
        self.on(events::REPLY, move |payload, r#ref| {
            let Some(inner) = weak.upgrade() else { return };
            let channel = Channel { inner };
            let Some(r#ref) = r#ref else { return };
            let event = channel.reply_event_name(&r#ref);
            channel.trigger(&event, payload, Some(r#ref));
        });

        let weak = self.downgrade();
        self.on(events::CLOSE, move |_payload, _ref| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.handle_server_close();
            }
        });

        let weak = self.downgrade();
        self.on(events::ERROR, move |_payload, _ref| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.handle_server_error();
            }
        });
    }

    fn bind_join_push(&self, join_push: &Push) {
        let weak = self.downgrade();
        join_push.receive("ok", move |_resp| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.handle_join_ok();
            }
        });
        // A server that explicitly replies {status: "error"} to a join is
        // treated the same as a join timeout — see DESIGN.md.
        let weak = self.downgrade();
        join_push.receive("error", move |_resp| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.handle_join_error();
            }
        });
        let weak = self.downgrade();
        join_push.receive("timeout", move |_resp| {
            if let Some(inner) = weak.upgrade() {
                Channel { inner }.handle_join_error();
            }
        });
    }

    fn handle_join_ok(&self) {
        debug!(topic = %self.topic(), "channel joined");
        self.inner.rejoin_timer.cancel();
        let pending = {
            let mut state = self.inner.state.lock();
            state.channel_state = ChannelState::Joined;
            std::mem::take(&mut state.push_buffer)
        };
        for push in pending {
            push.send();
        }
    }

    fn handle_join_error(&self) {
        let still_wants_joined = {
            let mut state = self.inner.state.lock();
            if state.channel_state == ChannelState::Leaving {
                false
            } else {
                state.channel_state = ChannelState::Errored;
                true
            }
        };
        if still_wants_joined && self.socket_connected() {
            warn!(topic = %self.topic(), "channel join failed, scheduling rejoin");
            self.inner.rejoin_timer.start();
        }
    }

    fn handle_server_close(&self) {
        self.inner.rejoin_timer.cancel();
        self.inner.state.lock().channel_state = ChannelState::Closed;
        if let Some(socket) = self.socket() {
            socket.remove_channel(self);
        }
    }

    fn handle_server_error(&self) {
        let leaving = self.inner.state.lock().channel_state == ChannelState::Leaving;
        if leaving {
            return;
        }
        self.inner.state.lock().channel_state = ChannelState::Errored;
        if self.socket_connected() {
            self.inner.rejoin_timer.start();
        }
    }

    fn finish_leave(&self) {
        self.inner.rejoin_timer.cancel();
        self.inner.state.lock().channel_state = ChannelState::Closed;
        if let Some(socket) = self.socket() {
            socket.remove_channel(self);
        }
    }

    /// Called by the socket after it regains a connection, so every errored
    /// channel gets a chance to rejoin rather than waiting out its backoff.
    pub(crate) fn rejoin(&self) {
        let join_push = {
            let mut state = self.inner.state.lock();
            if state.channel_state == ChannelState::Leaving || state.channel_state == ChannelState::Closed {
                return;
            }
            state.channel_state = ChannelState::Joining;
            state.join_push.clone()
        };
        if let Some(push) = join_push {
            push.resend(self.inner.default_timeout);
        }
    }
}
