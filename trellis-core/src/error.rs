//! Error types.
//!
//! Only [`Error::RouteNotFound`] and the artifact/render failures ever reach
//! a client as an error response. Every other variant is recovered at the
//! boundary of the render, derivation, effect or handler that raised it and
//! is only logged.

use std::any::Any;

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::reactive::NodeId;
use crate::routing::RouteError;

/// Boxed error returned by application artifacts.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no route matches `{0}`")]
    RouteNotFound(String),

    #[error("artifact `{key}` violates its contract: {reason}")]
    ArtifactContractViolation { key: String, reason: String },

    #[error("rendering `{path}` failed: {source}")]
    Render {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("computed {node} failed: {message}")]
    Derivation { node: NodeId, message: String },

    #[error("effect {node} failed: {message}")]
    Effect { node: NodeId, message: String },

    #[error("handler for `{event}` on `{element}` failed: {message}")]
    HandlerDispatch {
        element: String,
        event: String,
        message: String,
    },

    #[error("failed to send to client: {0}")]
    TransportSend(#[from] TransportError),

    #[error("malformed inbound message: {0}")]
    MalformedInboundMessage(#[from] ProtocolError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure to hand a message to a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
