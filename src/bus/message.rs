use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bus message: `{"type": ..., "data": {...}, "context": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl Message {
    /// New message with an empty context. Non-object `data` is dropped.
    pub fn new(msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: into_object(data),
            context: Map::new(),
        }
    }

    /// New message of another type that keeps this message's context.
    pub fn forward(&self, msg_type: impl Into<String>, data: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: into_object(data),
            context: self.context.clone(),
        }
    }

    /// Answer sent back to the sender: `source` and `destination` swap.
    pub fn reply(&self, msg_type: impl Into<String>, data: Value) -> Self {
        let mut message = self.forward(msg_type, data);
        let source = message.context.remove("source");
        let destination = message.context.remove("destination");
        if let Some(destination) = destination {
            message.context.insert("source".to_string(), destination);
        }
        if let Some(source) = source {
            message.context.insert("destination".to_string(), source);
        }
        message
    }

    /// `<type>.response` reply.
    pub fn response(&self, data: Value) -> Self {
        self.reply(format!("{}.response", self.msg_type), data)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
