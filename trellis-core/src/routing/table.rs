//! Route table and matching.

use std::sync::Arc;

use super::pattern::{Params, RoutePattern};

/// What a route's artifact produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Page,
    Api,
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pattern: RoutePattern,
    kind: RouteKind,
    artifact: String,
    /// Layout artifact keys, root first.
    layouts: Vec<String>,
}

impl RouteEntry {
    pub fn new(pattern: RoutePattern, kind: RouteKind, artifact: impl Into<String>) -> Self {
        Self {
            pattern,
            kind,
            artifact: artifact.into(),
            layouts: Vec::new(),
        }
    }

    /// Attach layouts, ordered root to leaf.
    pub fn with_layouts(mut self, layouts: Vec<String>) -> Self {
        self.layouts = layouts;
        self
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// Registry key of the page or API artifact.
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    pub fn layouts(&self) -> &[String] {
        &self.layouts
    }
}

/// A successful match.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub entry: Arc<RouteEntry>,
    pub params: Params,
}

/// Ordered, immutable route table.
///
/// Static routes come before dynamic ones; within each group, longer
/// patterns come first. The first entry that accepts a path wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<Arc<RouteEntry>>,
}

impl RouteTable {
    /// Build a table from entries in any order.
    pub fn from_entries(entries: impl IntoIterator<Item = RouteEntry>) -> Self {
        let mut entries: Vec<Arc<RouteEntry>> = entries.into_iter().map(Arc::new).collect();
        // Stable: ties keep their scan order.
        entries.sort_by_key(|entry| {
            let pattern = entry.pattern();
            (pattern.param_count() > 0, std::cmp::Reverse(pattern.as_str().len()))
        });
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter().map(|entry| entry.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the first route accepting `path`.
    pub fn match_route(&self, path: &str) -> Option<RouteMatch> {
        let path = normalize_path(path);
        self.entries.iter().find_map(|entry| {
            entry.pattern().captures(&path).map(|params| RouteMatch {
                entry: entry.clone(),
                params,
            })
        })
    }
}

/// Match `path` against `table`. `None` means not found.
pub fn match_route(path: &str, table: &RouteTable) -> Option<RouteMatch> {
    table.match_route(path)
}

/// Ensure a leading slash and strip one trailing slash, except for the root.
pub fn normalize_path(path: &str) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    match path.strip_suffix('/') {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => path,
    }
}
