//! Artifact registry.
//!
//! Route entries name their page, layouts and API handler by artifact key:
//! the file's path under the app root without its extension
//! (`users/[id]/page`, `layout`, `api/hello`). The registry maps those keys
//! to the callables the application compiled in.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BoxError, Error, Result};
use crate::http::HttpResponse;
use crate::routing::{Params, RouteKind, RouteTable};
use crate::session::Session;
use crate::view::Node;

/// What a page or layout sees while it executes.
pub struct PageContext<'a> {
    pub session: &'a Session,
    pub params: &'a Params,
    /// Normalized request path.
    pub path: &'a str,
}

impl PageContext<'_> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Input of an API artifact.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub params: Params,
    pub method: String,
    pub headers: IndexMap<String, String>,
    pub query: IndexMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// What an API artifact may return.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply {
    Response(HttpResponse),
    /// Serialized as a `200 application/json` response.
    Json(Value),
}

impl From<HttpResponse> for ApiReply {
    fn from(response: HttpResponse) -> Self {
        ApiReply::Response(response)
    }
}

impl From<Value> for ApiReply {
    fn from(value: Value) -> Self {
        ApiReply::Json(value)
    }
}

impl ApiReply {
    pub fn into_response(self) -> HttpResponse {
        match self {
            ApiReply::Response(response) => response,
            ApiReply::Json(value) => HttpResponse::json(&value),
        }
    }
}

pub type PageFn = Arc<dyn Fn(&PageContext<'_>) -> std::result::Result<Node, BoxError> + Send + Sync>;
pub type LayoutFn =
    Arc<dyn Fn(&PageContext<'_>, Node) -> std::result::Result<Node, BoxError> + Send + Sync>;
pub type ApiFn = Arc<dyn Fn(&ApiRequest) -> std::result::Result<ApiReply, BoxError> + Send + Sync>;

#[derive(Clone)]
pub enum Artifact {
    Page(PageFn),
    /// Receives the already rendered inner tree.
    Layout(LayoutFn),
    Api(ApiFn),
}

impl Artifact {
    fn kind_name(&self) -> &'static str {
        match self {
            Artifact::Page(_) => "page",
            Artifact::Layout(_) => "layout",
            Artifact::Api(_) => "api",
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Artifact::{}", self.kind_name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactRegistry {
    artifacts: IndexMap<String, Artifact>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page<F>(mut self, key: &str, page: F) -> Self
    where
        F: Fn(&PageContext<'_>) -> std::result::Result<Node, BoxError> + Send + Sync + 'static,
    {
        self.artifacts
            .insert(key.to_string(), Artifact::Page(Arc::new(page)));
        self
    }

    pub fn layout<F>(mut self, key: &str, layout: F) -> Self
    where
        F: Fn(&PageContext<'_>, Node) -> std::result::Result<Node, BoxError> + Send + Sync + 'static,
    {
        self.artifacts
            .insert(key.to_string(), Artifact::Layout(Arc::new(layout)));
        self
    }

    pub fn api<F, R>(mut self, key: &str, handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> std::result::Result<R, BoxError> + Send + Sync + 'static,
        R: Into<ApiReply>,
    {
        let handler = move |request: &ApiRequest| -> std::result::Result<ApiReply, BoxError> {
            handler(request).map(Into::into)
        };
        self.artifacts
            .insert(key.to_string(), Artifact::Api(Arc::new(handler)));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.artifacts.get(key)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn resolve_page(&self, key: &str) -> Result<PageFn> {
        match self.lookup(key)? {
            Artifact::Page(page) => Ok(page.clone()),
            other => Err(wrong_kind(key, "page", other)),
        }
    }

    pub fn resolve_layout(&self, key: &str) -> Result<LayoutFn> {
        match self.lookup(key)? {
            Artifact::Layout(layout) => Ok(layout.clone()),
            other => Err(wrong_kind(key, "layout", other)),
        }
    }

    pub fn resolve_api(&self, key: &str) -> Result<ApiFn> {
        match self.lookup(key)? {
            Artifact::Api(api) => Ok(api.clone()),
            other => Err(wrong_kind(key, "api", other)),
        }
    }

    /// Every artifact `table` refers to that is missing or of the wrong kind.
    pub fn check(&self, table: &RouteTable) -> Vec<Error> {
        let mut problems = Vec::new();
        for entry in table.iter() {
            let resolved = match entry.kind() {
                RouteKind::Page => self.resolve_page(entry.artifact()).map(drop),
                RouteKind::Api => self.resolve_api(entry.artifact()).map(drop),
            };
            problems.extend(resolved.err());
            for layout in entry.layouts() {
                problems.extend(self.resolve_layout(layout).err());
            }
        }
        problems
    }

    fn lookup(&self, key: &str) -> Result<&Artifact> {
        self.artifacts
            .get(key)
            .ok_or_else(|| Error::ArtifactContractViolation {
                key: key.to_string(),
                reason: "no artifact registered".into(),
            })
    }
}

fn wrong_kind(key: &str, expected: &str, found: &Artifact) -> Error {
    Error::ArtifactContractViolation {
        key: key.to_string(),
        reason: format!("expected a {expected}, found a {}", found.kind_name()),
    }
}
