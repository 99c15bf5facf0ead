//! End-to-end scenarios exercising [`crate::socket::Socket`],
//! [`crate::channel::Channel`], and [`crate::push::Push`] together over a
//! scripted transport, the way a real server would be expected to respond.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::config::SocketConfig;
use crate::socket::Socket;
use crate::test_support::{immediate_builder, MockTransport};

fn socket_and_transport() -> (Socket, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let socket = Socket::new(
        "ws://localhost:4000/socket",
        SocketConfig::default(),
        immediate_builder(transport.clone()),
    );
    (socket, transport)
}

#[tokio::test(start_paused = true)]
async fn join_then_echo_round_trip() {
    let (socket, transport) = socket_and_transport();
    socket.connect();
    transport.fire_opened();

    let channel = socket.channel("rooms:lobby", json!({}));
    channel.join(None).unwrap();
    tokio::task::yield_now().await;
    transport.reply_ok_to_all(json!({}));

    let echoed = Arc::new(Mutex::new(None));
    let e = echoed.clone();
    channel
        .push("echo", json!({"body": "hello"}), None)
        .unwrap()
        .receive("ok", move |resp| *e.lock() = Some(resp));
    tokio::task::yield_now().await;
    transport.reply_ok_to_all(json!({"body": "hello"}));

    assert_eq!(*echoed.lock(), Some(json!({"body": "hello"})));
}

#[tokio::test(start_paused = true)]
async fn pushes_made_before_join_flush_in_fifo_order() {
    let (socket, transport) = socket_and_transport();
    socket.connect();
    transport.fire_opened();
    let channel = socket.channel("rooms:lobby", json!({}));

    let order = Arc::new(Mutex::new(Vec::new()));
    let o1 = order.clone();
    channel
        .push("a", Value::String("a".into()), None)
        .unwrap()
        .receive("ok", move |_| o1.lock().push("a"));
    let o2 = order.clone();
    channel
        .push("b", Value::String("b".into()), None)
        .unwrap()
        .receive("ok", move |_| o2.lock().push("b"));

    channel.join(None).unwrap();
    tokio::task::yield_now().await;
    transport.reply_ok_to_all(json!({})); // join reply flushes a, b onto the wire
    tokio::task::yield_now().await;
    transport.reply_ok_to_all(json!({})); // reply to a, b

    assert_eq!(*order.lock(), vec!["a", "b"]);
}

#[tokio::test(start_paused = true)]
async fn interleaved_replies_correlate_to_the_right_push() {
    let (socket, transport) = socket_and_transport();
    socket.connect();
    transport.fire_opened();
    let channel = socket.channel("rooms:lobby", json!({}));
    channel.join(None).unwrap();
    tokio::task::yield_now().await;
    transport.reply_ok_to_all(json!({}));

    let push_a = channel.push("get", json!({"id": "a"}), None).unwrap();
    let push_b = channel.push("get", json!({"id": "b"}), None).unwrap();
    tokio::task::yield_now().await;

    let ref_a = push_a.r#ref().unwrap();
    let ref_b = push_b.r#ref().unwrap();
    assert_ne!(ref_a, ref_b);

    // Reply to b first, out of send order, then a.
    transport.reply_status_to_all("ok", json!("doesn't matter, replies go by ref"));

    let result_a = Arc::new(Mutex::new(None));
    let ra = result_a.clone();
    push_a.receive("ok", move |resp| *ra.lock() = Some(resp));
    let result_b = Arc::new(Mutex::new(None));
    let rb = result_b.clone();
    push_b.receive("ok", move |resp| *rb.lock() = Some(resp));

    assert_eq!(
        *result_a.lock(),
        Some(json!("doesn't matter, replies go by ref"))
    );
    assert_eq!(
        *result_b.lock(),
        Some(json!("doesn't matter, replies go by ref"))
    );
}

#[tokio::test(start_paused = true)]
async fn push_timeout_rejects_a_subsequent_late_reply() {
    let (socket, transport) = socket_and_transport();
    socket.connect();
    transport.fire_opened();
    let channel = socket.channel("rooms:lobby", json!({}));
    channel.join(None).unwrap();
    tokio::task::yield_now().await;
    transport.reply_ok_to_all(json!({}));

    let push = channel
        .push("slow", json!({}), Some(Duration::from_millis(50)))
        .unwrap();
    let timed_out = Arc::new(AtomicUsize::new(0));
    let t = timed_out.clone();
    push.receive("timeout", move |_| {
        t.fetch_add(1, Ordering::SeqCst);
    });
    let got_ok = Arc::new(AtomicUsize::new(0));
    let g = got_ok.clone();
    push.receive("ok", move |_| {
        g.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::advance(Duration::from_millis(55)).await;
    tokio::task::yield_now().await;
    assert_eq!(timed_out.load(Ordering::SeqCst), 1);

    transport.reply_ok_to_all(json!({}));
    assert_eq!(got_ok.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn socket_reconnects_with_backoff_and_rejoins_channels() {
    let (socket, transport) = socket_and_transport();
    socket.connect();
    transport.fire_opened();
    let channel = socket.channel("rooms:lobby", json!({}));
    channel.join(None).unwrap();
    tokio::task::yield_now().await;
    transport.reply_ok_to_all(json!({}));
    assert!(channel.is_joined());

    let sent_before_drop = transport.sent_count();

    // The server drops the connection unexpectedly.
    transport.fire_closed(1006, "connection lost");
    assert_eq!(channel.state(), crate::channel::ChannelState::Errored);

    // Nothing happens before the first backoff step elapses.
    tokio::time::advance(Duration::from_millis(900)).await;
    tokio::task::yield_now().await;
    assert_eq!(socket.is_connected(), false);

    // First reconnect attempt fires at the 1s mark (the default schedule's
    // first step) and the scripted transport "succeeds" immediately.
    tokio::time::advance(Duration::from_millis(150)).await;
    tokio::task::yield_now().await;
    transport.fire_opened();
    tokio::task::yield_now().await;

    assert!(socket.is_connected());
    // The channel rejoins automatically; a fresh join frame went out.
    assert!(transport.sent_count() > sent_before_drop);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_fires_on_cadence_and_stops_after_disconnect() {
    let (socket, transport) = socket_and_transport();
    socket.connect();
    transport.fire_opened();

    let before = transport.sent_count();
    tokio::time::advance(Duration::from_millis(30_000)).await;
    tokio::task::yield_now().await;
    assert!(transport.sent_count() > before);

    transport.fire_closed(1000, "bye");
    let after_close = transport.sent_count();
    tokio::time::advance(Duration::from_millis(60_000)).await;
    tokio::task::yield_now().await;
    assert_eq!(transport.sent_count(), after_close);
}
