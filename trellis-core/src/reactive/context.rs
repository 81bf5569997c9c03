//! Tracking Context
//!
//! The tracking context records which observer is currently evaluating, so
//! that a signal read can register that observer as a dependent. It also
//! owns the batch depth and the queue of effects deferred by a batch.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns exactly one context; there is no
//! process-wide stack. Entering an evaluation pushes onto the stack and
//! returns a guard that pops on drop, so the stack stays balanced even when
//! the evaluated closure panics. Nested evaluations (a computed reading
//! another computed) simply push deeper.

use std::sync::Weak;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use super::effect::EffectInner;
use super::observer::{NodeId, Observer};

#[derive(Default)]
struct TrackingState {
    /// `None` entries come from `untrack` and hide the observer below.
    stack: Vec<Option<Observer>>,
    batch_depth: usize,
    /// Effects deferred by an open batch, deduplicated, first-queued order.
    pending: IndexMap<NodeId, Weak<EffectInner>>,
}

/// Per-runtime tracking state.
#[derive(Default)]
pub(crate) struct TrackingContext {
    state: Mutex<TrackingState>,
}

impl TrackingContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make `observer` current until the returned guard drops.
    ///
    /// Passing `None` suspends tracking for the guard's lifetime.
    pub(crate) fn enter(&self, observer: Option<Observer>) -> EvalScope<'_> {
        let id = observer.as_ref().map(Observer::id);
        self.state.lock().stack.push(observer);
        EvalScope { context: self, id }
    }

    /// The observer that signal reads should register, if any.
    pub(crate) fn current(&self) -> Option<Observer> {
        self.state.lock().stack.last().cloned().flatten()
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.state.lock().stack.is_empty()
    }

    /// Open a batch. Effects notified before the outermost guard drops are
    /// queued instead of run.
    pub(crate) fn begin_batch(&self) -> BatchScope<'_> {
        self.state.lock().batch_depth += 1;
        BatchScope { context: self }
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.state.lock().batch_depth > 0
    }

    pub(crate) fn batch_depth(&self) -> usize {
        self.state.lock().batch_depth
    }

    /// Queue an effect for the end of the current batch.
    pub(crate) fn defer(&self, id: NodeId, effect: Weak<EffectInner>) {
        self.state.lock().pending.entry(id).or_insert(effect);
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub(crate) fn clear_pending(&self) {
        self.state.lock().pending.clear();
    }
}

/// Guard returned by [`TrackingContext::enter`].
pub(crate) struct EvalScope<'a> {
    context: &'a TrackingContext,
    id: Option<NodeId>,
}

impl Drop for EvalScope<'_> {
    fn drop(&mut self) {
        let popped = self.context.state.lock().stack.pop();

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.as_ref().map(Observer::id),
                self.id,
                "tracking stack mismatch"
            );
        }
    }
}

/// Guard returned by [`TrackingContext::begin_batch`].
///
/// Dropping the outermost guard drains the pending queue once, also when the
/// batch is unwinding from a panic. Effects catch their own panics, so the
/// drain never unwinds a second time.
pub(crate) struct BatchScope<'a> {
    context: &'a TrackingContext,
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        let drained = {
            let mut state = self.context.state.lock();
            state.batch_depth = state.batch_depth.saturating_sub(1);
            if state.batch_depth == 0 {
                std::mem::take(&mut state.pending)
            } else {
                IndexMap::new()
            }
        };

        if std::thread::panicking() && !drained.is_empty() {
            debug!(pending = drained.len(), "batch unwound, draining anyway");
        }

        for effect in drained.into_values() {
            if let Some(effect) = effect.upgrade() {
                effect.execute();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer() -> Observer {
        Observer::Effect {
            id: NodeId::new(),
            node: Weak::new(),
        }
    }

    #[test]
    fn context_tracks_observer() {
        let context = TrackingContext::new();
        let observer = observer();
        let id = observer.id();

        assert!(!context.is_active());
        assert!(context.current().is_none());

        {
            let _scope = context.enter(Some(observer));

            assert!(context.is_active());
            assert_eq!(context.current().map(|o| o.id()), Some(id));
        }

        // Stack should be cleaned up after drop
        assert!(!context.is_active());
        assert!(context.current().is_none());
    }

    #[test]
    fn nested_contexts() {
        let context = TrackingContext::new();
        let outer = observer();
        let inner = observer();
        let (outer_id, inner_id) = (outer.id(), inner.id());

        {
            let _outer = context.enter(Some(outer));
            assert_eq!(context.current().map(|o| o.id()), Some(outer_id));

            {
                let _inner = context.enter(Some(inner));
                assert_eq!(context.current().map(|o| o.id()), Some(inner_id));
            }

            // After inner scope drops, outer should be current
            assert_eq!(context.current().map(|o| o.id()), Some(outer_id));
        }

        assert!(context.current().is_none());
    }

    #[test]
    fn untracked_scope_hides_observer() {
        let context = TrackingContext::new();
        let _outer = context.enter(Some(observer()));

        {
            let _untracked = context.enter(None);
            assert!(context.is_active());
            assert!(context.current().is_none());
        }

        assert!(context.current().is_some());
    }

    #[test]
    fn batch_depth_is_balanced() {
        let context = TrackingContext::new();
        assert!(!context.is_batching());

        {
            let _outer = context.begin_batch();
            {
                let _inner = context.begin_batch();
                assert_eq!(context.batch_depth(), 2);
            }
            assert_eq!(context.batch_depth(), 1);
        }

        assert_eq!(context.batch_depth(), 0);
    }

    #[test]
    fn defer_deduplicates_by_identity() {
        let context = TrackingContext::new();
        let id = NodeId::new();

        let _batch = context.begin_batch();
        context.defer(id, Weak::new());
        context.defer(id, Weak::new());
        context.defer(NodeId::new(), Weak::new());

        assert_eq!(context.pending_count(), 2);
    }

    #[test]
    fn stack_survives_panicking_evaluation() {
        let context = TrackingContext::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = context.enter(Some(observer()));
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(!context.is_active());
    }
}
