//! Computed Implementation
//!
//! A Computed is a cached derived value. It is a push-pull hybrid:
//! notifications are pushed eagerly (a changed source marks the computed
//! dirty and the dirtiness cascades to its own dependents), but the value is
//! pulled lazily, recomputing only on the next `get`.
//!
//! # How Computeds Work
//!
//! 1. On creation, the derivation runs once to establish dependencies.
//!
//! 2. When accessed and clean, the cached value is returned with no
//!    re-execution.
//!
//! 3. When a source changes, the computed is marked dirty and notifies its
//!    dependents. Nothing is recomputed yet.
//!
//! 4. On the next access, the old subscriptions are dropped, the derivation
//!    re-runs and records its sources from scratch.
//!
//! # Failures
//!
//! A derivation that panics is caught at this boundary. The value becomes
//! absent (`get` returns `None`) and the computed is marked clean, so it is
//! not retried until a source changes again.

use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::warn;

use super::observer::{ComputedNode, Dependents, NodeId, Observer, Source, Sources};
use super::runtime::{Runtime, WeakRuntime};
use crate::error::{panic_message, Error};

/// Type-erased strong handle, used by the runtime to keep computeds alive.
pub(crate) type ComputedNodeHandle = Arc<dyn ComputedNode>;

pub(crate) struct ComputedInner<T> {
    id: NodeId,
    derive: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    dirty: AtomicBool,
    dependents: Dependents,
    sources: Sources,
    runtime: WeakRuntime,
    this: Weak<ComputedInner<T>>,
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn as_observer(&self) -> Observer {
        let node: Weak<dyn ComputedNode> = self.this.clone() as Weak<dyn ComputedNode>;
        Observer::Computed { id: self.id, node }
    }

    /// Run the derivation with this computed as the current observer.
    fn evaluate(&self) {
        self.sources.release(self.id);

        let result = match self.runtime.upgrade() {
            Some(runtime) => {
                let _scope = runtime.tracking().enter(Some(self.as_observer()));
                catch_unwind(AssertUnwindSafe(|| (self.derive)()))
            }
            None => catch_unwind(AssertUnwindSafe(|| (self.derive)())),
        };

        match result {
            Ok(value) => *self.value.write() = Some(value),
            Err(payload) => {
                let error = Error::Derivation {
                    node: self.id,
                    message: panic_message(payload.as_ref()),
                };
                warn!(%error, "value is absent until a dependency changes");
                *self.value.write() = None;
            }
        }

        self.dirty.store(false, Ordering::SeqCst);
    }

    fn track(&self) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        if let Some(observer) = runtime.current_observer() {
            let source: Weak<dyn Source> = self.this.clone() as Weak<dyn Source>;
            observer.record_source(self.id, source);
            self.dependents.insert(observer);
        }
    }
}

impl<T> ComputedNode for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn invalidate(&self) {
        self.dirty.store(true, Ordering::SeqCst);
        self.dependents.notify_all();
    }

    fn record_source(&self, id: NodeId, source: Weak<dyn Source>) {
        self.sources.record(id, source);
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn unsubscribe(&self, observer: NodeId) {
        self.dependents.remove(observer);
    }
}

/// A cached derived value that recomputes only when read after a change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync.
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new computed and evaluate it once.
    ///
    /// Prefer [`Runtime::computed`], which also ties the node's lifetime to
    /// the runtime.
    pub(crate) fn new<F>(runtime: &Runtime, derive: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this| ComputedInner {
            id: NodeId::new(),
            derive: Box::new(derive),
            value: RwLock::new(None),
            dirty: AtomicBool::new(true),
            dependents: Dependents::default(),
            sources: Sources::default(),
            runtime: runtime.downgrade(),
            this: this.clone(),
        });

        inner.evaluate();

        Self { inner }
    }

    pub(crate) fn node_handle(&self) -> ComputedNodeHandle {
        self.inner.clone() as ComputedNodeHandle
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value, recomputing if a source changed.
    ///
    /// Returns `None` if the last derivation failed.
    pub fn get(&self) -> Option<T> {
        self.inner.track();

        if self.inner.dirty.load(Ordering::SeqCst) {
            self.inner.evaluate();
        }

        self.inner.value.read().clone()
    }

    /// Get the cached value without tracking or recomputing.
    pub fn get_untracked(&self) -> Option<T> {
        self.inner.value.read().clone()
    }

    /// Check if a source changed since the last evaluation.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.len()
    }

    /// Get the number of sources read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.len()
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.is_dirty())
            .field("value", &self.get_untracked())
            .field("dependent_count", &self.dependent_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
