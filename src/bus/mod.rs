//! Message bus: message type, dispatch and the websocket transport.
//!
//! Handlers run synchronously on the thread that emitted (or received) the
//! message. Code holding a lock must not emit; collect messages and emit them
//! after the lock is released.

use std::sync::Arc;

pub mod local;
pub mod message;
pub mod websocket;

pub use local::{LocalBus, MessageLog};
pub use message::Message;
pub use websocket::{WebSocketBridge, bus_url_from_core_config, default_bus_url};

/// Callback invoked for each message on a subscribed topic.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

pub trait MessageBus: Send + Sync {
    /// Publish a message.
    fn emit(&self, message: Message);

    /// Subscribe to a topic.
    fn on(&self, topic: &str, handler: Handler);
}
