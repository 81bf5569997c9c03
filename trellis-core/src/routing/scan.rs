//! File-convention route discovery.
//!
//! Walks an app directory once and turns its artifact files into a
//! [`RouteTable`]:
//!
//! ```text
//! app/
//! ├── layout.rs            wraps every page
//! ├── page.rs              /
//! ├── about/page.rs        /about
//! ├── users/
//! │   ├── layout.rs        wraps pages under /users
//! │   └── [id]/page.rs     /users/[id]
//! └── api/hello.rs         /api/hello
//! ```
//!
//! Artifacts are identified by their path relative to the root with the
//! extension removed (`users/[id]/page`); that key is what the artifact
//! registry resolves. Entries whose name starts with `.` or `_` are skipped.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use super::pattern::RoutePattern;
use super::table::{RouteEntry, RouteKind, RouteTable};
use super::RouteError;

const PAGE_STEM: &str = "page";
const LAYOUT_STEM: &str = "layout";
const API_DIR: &str = "api";

/// An artifact file found during the walk.
#[derive(Debug)]
struct Artifact {
    /// Directory segments relative to the root.
    dirs: Vec<String>,
    stem: String,
}

impl Artifact {
    fn key(&self) -> String {
        let mut parts = self.dirs.clone();
        parts.push(self.stem.clone());
        parts.join("/")
    }

    fn is_api(&self) -> bool {
        self.dirs.first().map(String::as_str) == Some(API_DIR)
    }
}

/// Scan `root` and build the ordered route table.
///
/// Only files whose extension is listed in `extensions` are artifacts.
pub fn build_route_table(root: &Path, extensions: &[String]) -> Result<RouteTable, RouteError> {
    if !root.is_dir() {
        return Err(RouteError::MissingRoot(root.to_path_buf()));
    }

    let artifacts = collect_artifacts(root, extensions)?;

    let layout_dirs: HashSet<Vec<String>> = artifacts
        .iter()
        .filter(|a| !a.is_api() && a.stem == LAYOUT_STEM)
        .map(|a| a.dirs.clone())
        .collect();

    let mut entries = Vec::new();
    for artifact in &artifacts {
        if artifact.is_api() {
            let key = artifact.key();
            let pattern = RoutePattern::parse(&format!("/{key}"))?;
            entries.push(RouteEntry::new(pattern, RouteKind::Api, key));
        } else if artifact.stem == PAGE_STEM {
            let pattern = RoutePattern::parse(&format!("/{}", artifact.dirs.join("/")))?;
            let layouts = layouts_for(&artifact.dirs, &layout_dirs);
            entries.push(
                RouteEntry::new(pattern, RouteKind::Page, artifact.key()).with_layouts(layouts),
            );
        }
    }

    let table = RouteTable::from_entries(entries);
    info!(root = %root.display(), routes = table.len(), "route table built");
    Ok(table)
}

/// Layout keys from the root down to `dirs`, root first.
fn layouts_for(dirs: &[String], layout_dirs: &HashSet<Vec<String>>) -> Vec<String> {
    (0..=dirs.len())
        .map(|depth| dirs[..depth].to_vec())
        .filter(|prefix| layout_dirs.contains(prefix))
        .map(|prefix| {
            let mut parts = prefix;
            parts.push(LAYOUT_STEM.to_string());
            parts.join("/")
        })
        .collect()
}

fn collect_artifacts(root: &Path, extensions: &[String]) -> Result<Vec<Artifact>, RouteError> {
    let mut artifacts = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }

        let Some(artifact) = to_artifact(root, entry.path()) else {
            continue;
        };
        debug!(key = %artifact.key(), "found artifact");
        artifacts.push(artifact);
    }

    Ok(artifacts)
}

fn to_artifact(root: &Path, path: &Path) -> Option<Artifact> {
    let relative = path.strip_prefix(root).ok()?;
    let stem = relative.file_stem()?.to_str()?.to_string();
    let dirs = relative
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| c.as_os_str().to_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Some(Artifact { dirs, stem })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.') || name.starts_with('_'))
        .unwrap_or(false)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e == ext))
        .unwrap_or(false)
}

/// Check whether a changed path can affect the route table.
pub fn is_artifact_path(path: &Path, extensions: &[String]) -> bool {
    has_extension(path, extensions)
}

/// Resolve the artifact key for a file under `root`, if it is one.
pub fn artifact_key(root: &Path, path: &Path) -> Option<String> {
    to_artifact(root, path).map(|artifact| artifact.key())
}
