//! Trellis Core
//!
//! This crate provides the runtime of the Trellis server-driven web
//! framework. Pages render on the server; a live connection then keeps the
//! client in sync with fine-grained reactive state by pushing patches for
//! the parts of the page that changed.
//!
//! # Architecture
//!
//! - `reactive`: signals, computeds, effects and batching, one graph per
//!   session
//! - `routing`: file-convention route table, path matching, layouts
//! - `session`: per-connection contexts, islands, event dispatch and
//!   reconciliation
//! - `protocol`: the messages exchanged over a live connection
//! - `app`: initial renders, API routes and session hydration
//! - `server`: the live connection server
//! - `watch`: development-mode rebuild and reload
//!
//! # Example
//!
//! ```rust
//! use trellis_core::session::Session;
//! use trellis_core::view::text;
//!
//! let session = Session::ephemeral();
//! let count = session.runtime().signal(0);
//!
//! let view = session.island("counter", text(count.get()));
//! session.register_island("counter", {
//!     let count = count.clone();
//!     move || text(count.get())
//! });
//! session.on("inc", "click", {
//!     let count = count.clone();
//!     move |_, _| {
//!         count.update(|n| *n += 1);
//!         Ok(())
//!     }
//! });
//!
//! assert_eq!(view.render(), r#"<div data-island="counter">0</div>"#);
//!
//! count.set(1);
//! let patches = session.reconcile();
//! assert_eq!(patches.len(), 1);
//! ```

pub mod app;
pub mod artifact;
pub mod config;
pub mod error;
pub mod http;
pub mod protocol;
pub mod reactive;
pub mod routing;
pub mod server;
pub mod session;
pub mod view;
pub mod watch;

pub use app::App;
pub use artifact::{ApiReply, ApiRequest, ArtifactRegistry, PageContext};
pub use config::AppConfig;
pub use error::{BoxError, Error, Result};
pub use server::Server;
pub use session::Session;
