//! Route Resolver
//!
//! Maps request paths to artifacts using file conventions.
//!
//! - `scan`: walks the app directory into a [`RouteTable`]
//! - `pattern`: compiles `[name]` patterns into anchored matchers
//! - `table`: orders routes and matches paths against them
//!
//! The table is immutable once built. In development mode the server
//! rebuilds it on file changes and swaps it in whole.

mod pattern;
mod scan;
mod table;

use std::path::PathBuf;

use thiserror::Error;

pub use pattern::{Params, RoutePattern};
pub use scan::{artifact_key, build_route_table, is_artifact_path};
pub use table::{match_route, normalize_path, RouteEntry, RouteKind, RouteMatch, RouteTable};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid segment `{segment}` in route `{pattern}`")]
    InvalidSegment { pattern: String, segment: String },

    #[error("parameter `{name}` appears twice in route `{pattern}`")]
    DuplicateParam { pattern: String, name: String },

    #[error("app root `{0}` is not a directory")]
    MissingRoot(PathBuf),

    #[error("failed to compile route matcher: {0}")]
    Regex(#[from] regex::Error),

    #[error("failed to scan app directory: {0}")]
    Walk(#[from] walkdir::Error),
}
