//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which observers depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while an observer is evaluating on the same
//!    runtime, the signal registers that observer as a dependent.
//!
//! 2. When a signal is set to a value that differs from the current one,
//!    every current dependent is notified. Setting an equal value does
//!    nothing.
//!
//! 3. Dependents are held weakly and keyed by identity, so re-reading a
//!    signal never duplicates a subscription.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::observer::{Dependents, NodeId, Source};
use super::runtime::{Runtime, WeakRuntime};

pub(crate) struct SignalInner<T> {
    id: NodeId,
    value: RwLock<T>,
    dependents: Dependents,
    runtime: WeakRuntime,
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync,
{
    fn unsubscribe(&self, observer: NodeId) {
        self.dependents.remove(observer);
    }
}

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. `PartialEq` is used to
///   skip notifications when a write does not change the value.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal on `runtime` with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: NodeId::new(),
                value: RwLock::new(value),
                dependents: Dependents::default(),
                runtime: runtime.downgrade(),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called while an observer is evaluating, this also registers that
    /// observer as a dependent.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.read().clone()
    }

    /// Read the current value through `f`, tracking like [`Signal::get`].
    ///
    /// `f` sees a snapshot, so it may write to this signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        let value = self.inner.value.read().clone();
        f(&value)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and notify dependents.
    ///
    /// A value equal to the current one is ignored.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return;
            }
            *guard = value;
        }

        self.inner.dependents.notify_all();
    }

    /// Modify a copy of the value in place, then store it like
    /// [`Signal::set`].
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.get_untracked();
        f(&mut value);
        self.set(value);
    }

    /// Get the number of dependents.
    pub fn subscriber_count(&self) -> usize {
        self.inner.dependents.len()
    }

    fn track(&self) {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return;
        };
        if let Some(observer) = runtime.current_observer() {
            let source: Weak<dyn Source> = Arc::downgrade(&self.inner) as Weak<dyn Source>;
            observer.record_source(self.inner.id, source);
            self.inner.dependents.insert(observer);
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
