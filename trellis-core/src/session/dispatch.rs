//! Inbound event dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use super::Session;
use crate::error::{panic_message, Error};
use crate::protocol::ClientEvent;

/// What happened to a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler ran to completion.
    Handled,
    /// No handler is registered for the element and event type.
    Unhandled,
    /// The handler returned an error or panicked. It was logged.
    Failed,
}

/// Route `event` to the handler registered for its element and type.
///
/// The handler runs directly. Effects it triggers run on each write, unless
/// the handler opens its own batch with `session.runtime().batch(..)`.
/// Failures never escape.
pub fn dispatch_event(session: &Session, event: &ClientEvent) -> Dispatch {
    let Some(handler) = session.handler(&event.id, &event.event) else {
        debug!(
            session = %session.id(),
            element = %event.id,
            event = %event.event,
            "no handler, event dropped"
        );
        return Dispatch::Unhandled;
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| handler(session, event)));

    let message = match outcome {
        Ok(Ok(())) => return Dispatch::Handled,
        Ok(Err(error)) => error.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    let error = Error::HandlerDispatch {
        element: event.id.clone(),
        event: event.event.clone(),
        message,
    };
    warn!(session = %session.id(), %error, "handler recovered");
    Dispatch::Failed
}
