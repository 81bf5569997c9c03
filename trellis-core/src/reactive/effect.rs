//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency notifies, the effect re-runs at once. There is no
//!    laziness and no coalescing, except inside a batch, where the effect is
//!    queued (once) and runs when the outermost batch exits.
//!
//! 3. Before re-running, the effect drops its old subscriptions and tracks
//!    new ones during execution.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager.
//! - Effects have no dependents.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tracing::warn;

use super::observer::{NodeId, Observer, Source, Sources};
use super::runtime::{Runtime, WeakRuntime};
use crate::error::{panic_message, Error};

pub(crate) struct EffectInner {
    id: NodeId,
    run: Box<dyn Fn() + Send + Sync>,
    sources: Sources,
    disposed: AtomicBool,
    run_count: AtomicUsize,
    runtime: WeakRuntime,
    this: Weak<EffectInner>,
}

impl EffectInner {
    fn as_observer(&self) -> Observer {
        Observer::Effect {
            id: self.id,
            node: self.this.clone(),
        }
    }

    /// React to a dependency change.
    pub(crate) fn notify(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        if let Some(runtime) = self.runtime.upgrade() {
            if runtime.is_batching() {
                runtime.tracking().defer(self.id, self.this.clone());
                return;
            }
        }

        self.execute();
    }

    /// Execute the effect function, re-establishing dependencies.
    pub(crate) fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        self.sources.release(self.id);

        let result = match self.runtime.upgrade() {
            Some(runtime) => {
                let _scope = runtime.tracking().enter(Some(self.as_observer()));
                catch_unwind(AssertUnwindSafe(|| (self.run)()))
            }
            None => catch_unwind(AssertUnwindSafe(|| (self.run)())),
        };

        if let Err(payload) = result {
            let error = Error::Effect {
                node: self.id,
                message: panic_message(payload.as_ref()),
            };
            warn!(%error, "effect recovered");
        }

        self.run_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_source(&self, id: NodeId, source: Weak<dyn Source>) {
        self.sources.record(id, source);
    }

    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.sources.release(self.id);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// let effect = rt.effect({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect and run it once.
    pub(crate) fn new<F>(runtime: &Runtime, run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this| EffectInner {
            id: NodeId::new(),
            run: Box::new(run),
            sources: Sources::default(),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            runtime: runtime.downgrade(),
            this: this.clone(),
        });

        inner.execute();

        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<EffectInner> {
        &self.inner
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again and holds no
    /// subscriptions.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.len()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
