//! Live connection protocol.
//!
//! Client → server: `init { path }` and `event { id, event, value?, data? }`.
//! Server → client: `patch`, `chart`, `body_class`, `reload`.
//!
//! Every message is an object tagged by a `type` field. Text frames carry
//! JSON; binary frames carry the same objects as MessagePack maps. A
//! connection answers in the encoding the client last used.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid MessagePack message: {0}")]
    MessagePackDecode(#[from] rmp_serde::decode::Error),

    #[error("failed to encode MessagePack message: {0}")]
    MessagePackEncode(#[from] rmp_serde::encode::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Declare the page the client is showing.
    Init { path: String },
    /// A DOM event on an element with a registered handler.
    Event(ClientEvent),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Element id the handler was registered under.
    pub id: String,
    /// Event type, e.g. `click` or `input`.
    pub event: String,
    /// Current value for input-like events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Form fields for submit-like events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl ClientEvent {
    pub fn new(id: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event: event.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// The value as text, if it is a string or a scalar.
    pub fn value_str(&self) -> Option<String> {
        match self.value.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// A form field, if present.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref()?.get(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Replace the island's fragment.
    Patch { island: String, html: String },
    /// Opaque visualization configuration.
    Chart { id: String, config: Value },
    /// Toggle a class on the document body.
    BodyClass {
        #[serde(rename = "className")]
        class_name: String,
        action: ClassAction,
    },
    /// Ask the client to reload the page.
    Reload,
}

/// One message on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Json,
    MessagePack,
}

impl Codec {
    /// The codec a frame was written with.
    pub fn of(frame: &Frame) -> Self {
        match frame {
            Frame::Text(_) => Codec::Json,
            Frame::Binary(_) => Codec::MessagePack,
        }
    }

    pub fn decode(frame: &Frame) -> Result<ClientMessage, ProtocolError> {
        match frame {
            Frame::Text(text) => Ok(serde_json::from_str(text)?),
            Frame::Binary(bytes) => Ok(rmp_serde::from_slice(bytes)?),
        }
    }

    pub fn encode(self, message: &ServerMessage) -> Result<Frame, ProtocolError> {
        match self {
            Codec::Json => Ok(Frame::Text(serde_json::to_string(message)?)),
            // Named encoding keeps the `type` tag; compact encoding would
            // turn the message into a positional array.
            Codec::MessagePack => Ok(Frame::Binary(rmp_serde::to_vec_named(message)?)),
        }
    }
}
