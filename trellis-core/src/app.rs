//! Request and connection orchestration.
//!
//! Two phases, with no state carried between them:
//!
//! 1. An HTTP request is matched, the page runs once inside an ephemeral
//!    session, and the tree is serialized into a document. The session is
//!    disposed before the response is returned.
//! 2. The client opens a live connection and sends `init { path }`. The page
//!    re-executes inside the connection's durable session, which then
//!    receives events and pushes patches for as long as the connection lives.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::artifact::{ApiRequest, ArtifactRegistry, PageContext};
use crate::config::AppConfig;
use crate::error::{panic_message, BoxError, Error, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::protocol::{ClientMessage, Codec, Frame, ServerMessage};
use crate::routing::{build_route_table, normalize_path, RouteKind, RouteMatch, RouteTable};
use crate::session::{dispatch_event, Dispatch, Session, SessionStore};
use crate::view::{el, text, Node};

pub struct App {
    config: AppConfig,
    registry: ArtifactRegistry,
    routes: RwLock<Arc<RouteTable>>,
    sessions: SessionStore,
}

impl App {
    /// Create an app over an already built route table.
    pub fn new(config: AppConfig, registry: ArtifactRegistry, routes: RouteTable) -> Self {
        for problem in registry.check(&routes) {
            warn!(error = %problem, "route cannot be served");
        }
        Self {
            config,
            registry,
            routes: RwLock::new(Arc::new(routes)),
            sessions: SessionStore::new(),
        }
    }

    /// Create an app by scanning `config.app_root`.
    pub fn load(config: AppConfig, registry: ArtifactRegistry) -> Result<Self> {
        let routes = build_route_table(&config.app_root, &config.extensions)?;
        Ok(Self::new(config, registry, routes))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &ArtifactRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The current route table. Requests in flight keep the table they
    /// started with.
    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.read().clone()
    }

    pub fn replace_routes(&self, routes: RouteTable) {
        for problem in self.registry.check(&routes) {
            warn!(error = %problem, "route cannot be served");
        }
        *self.routes.write() = Arc::new(routes);
    }

    /// Rescan the app root and swap the new table in. Returns the number of
    /// routes. On failure the previous table stays in place.
    pub fn rebuild_routes(&self) -> Result<usize> {
        let routes = build_route_table(&self.config.app_root, &self.config.extensions)?;
        let count = routes.len();
        self.replace_routes(routes);
        info!(routes = count, "route table swapped");
        Ok(count)
    }

    /// Tell every live client to reload. Returns how many were told.
    pub fn reload_clients(&self) -> usize {
        self.sessions.broadcast(&ServerMessage::Reload)
    }

    fn match_path(&self, path: &str) -> Result<RouteMatch> {
        self.routes()
            .match_route(path)
            .ok_or_else(|| Error::RouteNotFound(normalize_path(path)))
    }

    /// Serve an HTTP request: a page document or an API reply.
    pub fn handle_http(&self, request: &HttpRequest) -> HttpResponse {
        let matched = match self.match_path(&request.path) {
            Ok(matched) => matched,
            Err(error) => {
                debug!(%error, method = %request.method, "not found");
                return HttpResponse::not_found();
            }
        };

        let response = match matched.entry.kind() {
            RouteKind::Page => self.serve_page(&matched, &request.path),
            RouteKind::Api => self.serve_api(&matched, request),
        };

        response.unwrap_or_else(|error| {
            warn!(%error, path = %request.path, "request failed");
            HttpResponse::internal_error()
        })
    }

    fn serve_page(&self, matched: &RouteMatch, path: &str) -> Result<HttpResponse> {
        let session = Session::ephemeral();
        let rendered = self.render(&session, matched, path);
        session.dispose();

        let tree = rendered?;
        Ok(HttpResponse::html(self.document(tree)))
    }

    fn serve_api(&self, matched: &RouteMatch, request: &HttpRequest) -> Result<HttpResponse> {
        let api = self.registry.resolve_api(matched.entry.artifact())?;
        let api_request = ApiRequest {
            params: matched.params.clone(),
            method: request.method.clone(),
            headers: request.headers.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
        };

        let reply = run_artifact(&request.path, || api(&api_request))?;
        Ok(reply.into_response())
    }

    /// Execute the matched page inside `session` and wrap it in its
    /// layouts, innermost first, so the root layout ends up outermost.
    pub fn render(&self, session: &Session, matched: &RouteMatch, path: &str) -> Result<Node> {
        let entry = &matched.entry;
        let page = self.registry.resolve_page(entry.artifact())?;
        let layouts = entry
            .layouts()
            .iter()
            .map(|key| self.registry.resolve_layout(key))
            .collect::<Result<Vec<_>>>()?;

        session.set_route(matched.clone());
        let path = normalize_path(path);
        let cx = PageContext {
            session,
            params: &matched.params,
            path: &path,
        };

        let mut tree = run_artifact(&path, || page(&cx))?;
        for layout in layouts.iter().rev() {
            let inner = tree;
            tree = run_artifact(&path, || layout(&cx, inner))?;
        }
        Ok(tree)
    }

    /// Serialize `body` into the document shell that loads the client
    /// script.
    pub fn document(&self, body: Node) -> String {
        let head = el("head")
            .child(el("meta").attr("charset", "utf-8"))
            .child(el("title").child(text(&self.config.title)));
        let body = el("body")
            .child(body)
            .child(el("script").attr("src", &self.config.client_script));
        let html: Node = el("html").child(head).child(body).into();
        format!("<!DOCTYPE html>{}", html.render())
    }

    /// Re-execute the page for `path` inside a durable session.
    ///
    /// The session's previous graph and registrations are dropped first.
    /// The rendered tree itself is discarded: the client already shows it,
    /// and the island baselines were recorded while rendering.
    pub fn hydrate(&self, session: &Session, path: &str) -> Result<()> {
        let matched = self.match_path(path)?;
        if matched.entry.kind() != RouteKind::Page {
            return Err(Error::ArtifactContractViolation {
                key: matched.entry.artifact().to_string(),
                reason: "live connections can only initialize pages".into(),
            });
        }

        session.reset();
        self.render(session, &matched, path)?;
        info!(
            session = %session.id(),
            route = %matched.entry.pattern().as_str(),
            islands = session.island_ids().len(),
            "session hydrated"
        );
        Ok(())
    }

    /// Process one inbound frame on a live connection.
    ///
    /// The session answers in the codec of the frame it last received.
    pub fn handle_frame(&self, session: &Session, frame: &Frame) -> Result<()> {
        let message = Codec::decode(frame)?;
        session.set_codec(Codec::of(frame));

        match message {
            ClientMessage::Init { path } => self.hydrate(session, &path),
            ClientMessage::Event(event) => {
                if dispatch_event(session, &event) != Dispatch::Unhandled {
                    session.reconcile_and_flush();
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("routes", &self.routes().len())
            .field("artifacts", &self.registry.len())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

/// Run application code, turning errors and panics into render failures.
fn run_artifact<T>(
    path: &str,
    f: impl FnOnce() -> std::result::Result<T, BoxError>,
) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(Error::Render {
            path: path.to_string(),
            source,
        }),
        Err(payload) => Err(Error::Render {
            path: path.to_string(),
            source: panic_message(payload.as_ref()).into(),
        }),
    }
}
