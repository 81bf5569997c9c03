//! Reactive Primitives
//!
//! This module implements the reactive graph each session owns: signals,
//! computeds, and effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! while an observer (a computed or an effect) is evaluating, the signal
//! registers that observer as a dependent. When the value changes, all
//! dependents are notified.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. A change upstream
//! marks it dirty immediately, but it only re-evaluates when next read.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs eagerly whenever
//! one of its dependencies notifies, unless a batch defers it.
//!
//! # Implementation Notes
//!
//! Every primitive belongs to a [`Runtime`]. The runtime's tracking context
//! records which observer is evaluating, so dependency discovery is
//! automatic but scoped to one graph: two sessions never observe each
//! other's reads.
//!
//! There is no cycle detection. A computed that (transitively) depends on
//! itself recurses without bound on notification.

mod computed;
mod context;
mod effect;
mod observer;
mod runtime;
mod signal;

pub use computed::Computed;
pub use effect::Effect;
pub use observer::NodeId;
pub use runtime::Runtime;
pub use signal::Signal;
