//! Reactive Runtime
//!
//! The runtime is the per-session reactive graph. It is the factory for
//! signals, computeds and effects, owns the tracking context they share, and
//! keeps every computed and effect it created alive until it is disposed.
//!
//! # How It Works
//!
//! 1. A signal read checks the runtime's tracking context. If an observer is
//!    evaluating, the signal records it as a dependent and the observer
//!    records the signal as a source.
//!
//! 2. A signal write notifies its dependents:
//!    a. Computeds are marked dirty and forward the notification
//!    b. Effects re-run immediately, or are queued while a batch is open
//!    c. Computeds recompute lazily, on their next `get`
//!
//! 3. Disposing the runtime drops every owned node, which releases all
//!    subscriptions. Nodes only hold a weak reference back to the runtime,
//!    so a session that drops its runtime drops the whole graph.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::computed::{Computed, ComputedNodeHandle};
use super::context::TrackingContext;
use super::effect::{Effect, EffectInner};
use super::observer::Observer;
use super::signal::Signal;

/// A node kept alive by its runtime.
enum Owned {
    Computed(ComputedNodeHandle),
    Effect(Arc<EffectInner>),
}

pub(crate) struct RuntimeInner {
    tracking: TrackingContext,
    owned: Mutex<Vec<Owned>>,
    disposed: AtomicBool,
}

/// Handle to a reactive graph.
///
/// Cloning the handle shares the graph.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(1);
/// let doubled = rt.computed({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// count.set(5);
/// assert_eq!(doubled.get(), Some(10));
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

/// Weak reference from a node back to its runtime.
#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                tracking: TrackingContext::new(),
                owned: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.inner))
    }

    pub(crate) fn tracking(&self) -> &TrackingContext {
        &self.inner.tracking
    }

    /// The observer a read should register, if any.
    pub(crate) fn current_observer(&self) -> Option<Observer> {
        self.inner.tracking.current()
    }

    /// Create a signal holding `value`.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        Signal::new(self, value)
    }

    /// Create a computed. The derivation runs once immediately.
    pub fn computed<T, F>(&self, derive: F) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let computed = Computed::new(self, derive);
        self.adopt(Owned::Computed(computed.node_handle()));
        computed
    }

    /// Create an effect. The function runs once immediately.
    pub fn effect<F>(&self, run: F) -> Effect
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Effect::new(self, run);
        self.adopt(Owned::Effect(effect.inner().clone()));
        effect
    }

    /// Run `f` with effect execution deferred until the outermost batch
    /// exits. Each deferred effect then runs once, in first-queued order.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = self.inner.tracking.begin_batch();
        f()
    }

    /// Run `f` without registering any reads as dependencies.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _scope = self.inner.tracking.enter(None);
        f()
    }

    /// Check if a batch is open.
    pub fn is_batching(&self) -> bool {
        self.inner.tracking.is_batching()
    }

    /// Check if an observer is currently evaluating.
    pub fn is_tracking(&self) -> bool {
        self.current_observer().is_some()
    }

    /// Number of computeds and effects owned by this graph.
    pub fn owned_count(&self) -> usize {
        self.inner.owned.lock().len()
    }

    /// Release every node this graph owns.
    ///
    /// Effects are disposed so they never run again. The runtime itself
    /// stays usable; new nodes may be created afterwards.
    pub fn dispose(&self) {
        let owned = std::mem::take(&mut *self.inner.owned.lock());
        self.inner.tracking.clear_pending();
        for node in owned {
            if let Owned::Effect(effect) = node {
                effect.dispose();
            }
        }
    }

    /// Dispose and refuse further ownership.
    pub(crate) fn shutdown(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.dispose();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn adopt(&self, node: Owned) {
        if self.is_shut_down() {
            if let Owned::Effect(effect) = &node {
                effect.dispose();
            }
            return;
        }
        self.inner.owned.lock().push(node);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("owned", &self.owned_count())
            .field("batching", &self.is_batching())
            .finish()
    }
}
