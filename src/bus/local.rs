//! In-process message dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Handler, Message, MessageBus};

/// Synchronous publish/subscribe bus.
///
/// `emit` runs every sink, then every handler subscribed to the topic, on
/// the caller's thread. Handler lists are copied out before dispatch, so a
/// handler may emit or subscribe without deadlocking.
///
/// Sinks see every emitted message; the websocket bridge uses one to forward
/// outbound traffic, tests use [`MessageLog`].
#[derive(Default)]
pub struct LocalBus {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
    sinks: Mutex<Vec<Handler>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every message passed to [`emit`](MessageBus::emit).
    pub fn add_sink(&self, sink: Handler) {
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    /// Deliver an inbound message to subscribers only, skipping sinks so
    /// remote traffic is not echoed back to its origin.
    pub fn dispatch(&self, message: &Message) -> usize {
        let handlers = self.handlers_for(&message.msg_type);
        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    /// Attach a [`MessageLog`] recording every emitted message.
    pub fn record(&self) -> Arc<MessageLog> {
        let log = Arc::new(MessageLog::default());
        let sink = Arc::clone(&log);
        self.add_sink(Arc::new(move |message: &Message| sink.push(message.clone())));
        log
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        topics.sort();
        topics
    }

    fn handlers_for(&self, topic: &str) -> Vec<Handler> {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

impl MessageBus for LocalBus {
    fn emit(&self, message: Message) {
        let sinks = self
            .sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for sink in &sinks {
            sink(&message);
        }
        self.dispatch(&message);
    }

    fn on(&self, topic: &str, handler: Handler) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic.to_string())
            .or_default()
            .push(handler);
    }
}

/// Every message seen by a sink, in order.
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Mutex<Vec<Message>>,
}

impl MessageLog {
    pub fn push(&self, message: Message) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    pub fn all(&self) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Messages of one type.
    pub fn of_type(&self, msg_type: &str) -> Vec<Message> {
        self.all()
            .into_iter()
            .filter(|m| m.msg_type == msg_type)
            .collect()
    }

    pub fn last_of_type(&self, msg_type: &str) -> Option<Message> {
        self.of_type(msg_type).pop()
    }

    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
