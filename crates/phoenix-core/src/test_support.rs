//! A scripted in-memory [`Transport`] used by this crate's own tests.
//!
//! Real transport plumbing — TLS, the HTTP upgrade, actual sockets — lives
//! in `phoenix-transport`. Here a send is just an entry in a list and a
//! reply is just a synthesized `phx_reply` frame handed back to whichever
//! observers are registered, so join/push/reconnect behavior can be tested
//! without a server.

#![cfg(test)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::TransportResult;
use crate::frame::{events, Frame};
use crate::transport::{Transport, TransportBuilder, TransportObserver};

pub struct MockTransport {
    observers: Mutex<Vec<Arc<dyn TransportObserver>>>,
    sent: Mutex<Vec<Frame>>,
    replied_refs: Mutex<HashSet<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            replied_refs: Mutex::new(HashSet::new()),
        }
    }

    pub fn fire_opened(&self) {
        for obs in self.observers.lock().iter() {
            obs.opened();
        }
    }

    pub fn fire_closed(&self, code: u16, reason: &str) {
        for obs in self.observers.lock().iter() {
            obs.closed(code, reason.to_string());
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Replies `"ok"` with `response` to every sent frame carrying a ref
    /// that has not already been replied to. Call again (after yielding, so
    /// any sends the reply itself triggered get recorded) to reply to the
    /// next wave.
    pub fn reply_ok_to_all(&self, response: Value) {
        self.reply_status_to_all("ok", response);
    }

    pub fn reply_status_to_all(&self, status: &str, response: Value) {
        let pending: Vec<Frame> = {
            let sent = self.sent.lock();
            let replied = self.replied_refs.lock();
            sent.iter()
                .filter(|f| matches!(&f.r#ref, Some(r) if !replied.contains(r)))
                .cloned()
                .collect()
        };
        for frame in pending {
            let r#ref = frame.r#ref.clone().unwrap();
            self.replied_refs.lock().insert(r#ref.clone());
            let reply = Frame::with_ref(
                frame.topic.clone(),
                events::REPLY,
                serde_json::json!({"status": status, "response": response}),
                r#ref,
            );
            let text = serde_json::to_string(&reply).unwrap();
            for obs in self.observers.lock().iter() {
                obs.message(text.clone());
            }
        }
    }

    pub fn last_ref(&self) -> Option<String> {
        self.sent.lock().last().and_then(|f| f.r#ref.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> TransportResult<()> {
        Ok(())
    }

    async fn send(&self, text: String) -> TransportResult<()> {
        if let Ok(frame) = serde_json::from_str::<Frame>(&text) {
            self.sent.lock().push(frame);
        }
        Ok(())
    }

    async fn close(&self, code: u16, reason: String) -> TransportResult<()> {
        self.fire_closed(code, &reason);
        Ok(())
    }

    fn add_observer(&self, observer: Arc<dyn TransportObserver>) {
        self.observers.lock().push(observer);
    }

    fn remove_observer(&self, observer: &Arc<dyn TransportObserver>) {
        self.observers
            .lock()
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    fn observers(&self) -> Vec<Arc<dyn TransportObserver>> {
        self.observers.lock().clone()
    }
}

/// A [`TransportBuilder`] that always hands back the same pre-built mock,
/// ignoring the endpoint URL, and transplants whatever observers the socket
/// already registered (mirroring what the real builder does on reconnect).
pub fn immediate_builder(transport: Arc<MockTransport>) -> TransportBuilder {
    Arc::new(move |_url: &str, observers: Vec<Arc<dyn TransportObserver>>| {
        for obs in observers {
            transport.add_observer(obs);
        }
        transport.clone() as Arc<dyn Transport>
    })
}
