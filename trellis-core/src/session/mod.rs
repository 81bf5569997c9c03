//! Sessions
//!
//! A session is the server-side context of one page view. It owns a private
//! reactive [`Runtime`], the event handlers and islands the page registered,
//! and, for live connections, the transport patches are pushed through.
//!
//! - Ephemeral sessions exist for the duration of one initial render and are
//!   disposed right after. They never have a transport.
//! - Durable sessions live as long as their connection and are re-populated
//!   on every `init`.
//!
//! Nothing is transferred from the ephemeral render to the durable session:
//! the live connection re-executes the page from scratch.

mod dispatch;
mod reconcile;
mod store;
mod transport;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BoxError, Result, TransportError};
use crate::protocol::{ClassAction, ClientEvent, Codec, ServerMessage};
use crate::reactive::Runtime;
use crate::routing::RouteMatch;
use crate::view::{el, Node};

pub use dispatch::{dispatch_event, Dispatch};
pub use store::SessionStore;
pub use transport::{ChannelTransport, Transport};

/// Attribute marking an island's wrapper element.
pub const ISLAND_ATTR: &str = "data-island";

/// Event handler. Receives the session it was registered on.
pub type Handler =
    Arc<dyn Fn(&Session, &ClientEvent) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Island render closure.
pub type RenderFn = Arc<dyn Fn() -> Node + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    Ephemeral,
    Durable,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Ephemeral => write!(f, "ephemeral"),
            SessionKind::Durable => write!(f, "durable"),
        }
    }
}

#[derive(Default)]
struct Island {
    render: Option<RenderFn>,
    /// Fragment text the client currently shows.
    baseline: String,
}

#[derive(Default)]
struct Registrations {
    /// element id → event type → handler
    handlers: IndexMap<String, IndexMap<String, Handler>>,
    islands: IndexMap<String, Island>,
}

struct SessionInner {
    id: Uuid,
    kind: SessionKind,
    runtime: Runtime,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    codec: Mutex<Codec>,
    route: Mutex<Option<RouteMatch>>,
    registrations: Mutex<Registrations>,
    disposed: AtomicBool,
}

/// Handle to a session. Clones share the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    fn with_kind(kind: SessionKind, transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                kind,
                runtime: Runtime::new(),
                transport: Mutex::new(transport),
                codec: Mutex::new(Codec::default()),
                route: Mutex::new(None),
                registrations: Mutex::new(Registrations::default()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// A session for a single initial render.
    pub fn ephemeral() -> Self {
        Self::with_kind(SessionKind::Ephemeral, None)
    }

    /// A session bound to a live connection.
    pub fn durable(transport: Arc<dyn Transport>) -> Self {
        Self::with_kind(SessionKind::Durable, Some(transport))
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> SessionKind {
        self.inner.kind
    }

    /// The session's reactive graph.
    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    pub fn route(&self) -> Option<RouteMatch> {
        self.inner.route.lock().clone()
    }

    pub fn set_route(&self, route: RouteMatch) {
        *self.inner.route.lock() = Some(route);
    }

    /// A route parameter of the current match.
    pub fn param(&self, name: &str) -> Option<String> {
        self.inner.route.lock().as_ref()?.params.get(name).cloned()
    }

    pub fn codec(&self) -> Codec {
        *self.inner.codec.lock()
    }

    /// Answer in `codec` from now on.
    pub fn set_codec(&self, codec: Codec) {
        *self.inner.codec.lock() = codec;
    }

    pub fn has_transport(&self) -> bool {
        self.inner.transport.lock().is_some()
    }

    /// Wrap `content` as island `id` and record its text as the baseline.
    pub fn island(&self, id: &str, content: impl Into<Node>) -> Node {
        let content = content.into();
        let baseline = content.render();

        self.inner
            .registrations
            .lock()
            .islands
            .entry(id.to_string())
            .or_default()
            .baseline = baseline;

        el("div").attr(ISLAND_ATTR, id).child(content).into()
    }

    /// Register the closure that re-renders island `id`.
    ///
    /// The closure is not invoked until the next reconciliation. Islands
    /// are reconciled in first-registration order.
    pub fn register_island<F>(&self, id: &str, render: F)
    where
        F: Fn() -> Node + Send + Sync + 'static,
    {
        self.inner
            .registrations
            .lock()
            .islands
            .entry(id.to_string())
            .or_default()
            .render = Some(Arc::new(render));
    }

    /// Register `handler` for `event` on the element with id `element`.
    ///
    /// A later registration for the same pair replaces the earlier one.
    pub fn on<F>(&self, element: &str, event: &str, handler: F)
    where
        F: Fn(&Session, &ClientEvent) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        self.inner
            .registrations
            .lock()
            .handlers
            .entry(element.to_string())
            .or_default()
            .insert(event.to_string(), Arc::new(handler));
    }

    pub(crate) fn handler(&self, element: &str, event: &str) -> Option<Handler> {
        self.inner
            .registrations
            .lock()
            .handlers
            .get(element)?
            .get(event)
            .cloned()
    }

    pub fn handler_count(&self) -> usize {
        self.inner
            .registrations
            .lock()
            .handlers
            .values()
            .map(IndexMap::len)
            .sum()
    }

    /// Island ids in registration order.
    pub fn island_ids(&self) -> Vec<String> {
        self.inner.registrations.lock().islands.keys().cloned().collect()
    }

    /// The last fragment text sent (or rendered) for island `id`.
    pub fn baseline(&self, id: &str) -> Option<String> {
        self.inner
            .registrations
            .lock()
            .islands
            .get(id)
            .map(|island| island.baseline.clone())
    }

    /// Push one message to the client.
    ///
    /// Sessions without a transport drop the message.
    pub fn send(&self, message: &ServerMessage) -> Result<()> {
        let Some(transport) = self.inner.transport.lock().clone() else {
            debug!(session = %self.id(), ?message, "no transport, message dropped");
            return Ok(());
        };

        let frame = self
            .codec()
            .encode(message)
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        transport.send(frame)?;
        Ok(())
    }

    /// Send each message independently. Returns how many were delivered.
    pub fn flush(&self, messages: Vec<ServerMessage>) -> usize {
        let mut sent = 0;
        for message in messages {
            match self.send(&message) {
                Ok(()) => sent += 1,
                Err(error) => warn!(session = %self.id(), %error, "send failed"),
            }
        }
        sent
    }

    /// Hand a visualization configuration to the client.
    pub fn send_chart(&self, id: &str, config: Value) -> Result<()> {
        self.send(&ServerMessage::Chart {
            id: id.to_string(),
            config,
        })
    }

    pub fn set_body_class(&self, class_name: &str, action: ClassAction) -> Result<()> {
        self.send(&ServerMessage::BodyClass {
            class_name: class_name.to_string(),
            action,
        })
    }

    pub fn request_reload(&self) -> Result<()> {
        self.send(&ServerMessage::Reload)
    }

    /// Drop the graph and every registration, keeping identity and
    /// transport. Used before a page is re-executed.
    pub fn reset(&self) {
        let old = std::mem::take(&mut *self.inner.registrations.lock());
        self.inner.runtime.dispose();
        drop(old);
    }

    /// Release everything the session holds. The session cannot be used
    /// for live updates afterwards.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let old = std::mem::take(&mut *self.inner.registrations.lock());
        self.inner.runtime.shutdown();
        self.inner.transport.lock().take();
        self.inner.route.lock().take();
        drop(old);
        debug!(session = %self.id(), kind = %self.kind(), "session disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("transport", &self.has_transport())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
