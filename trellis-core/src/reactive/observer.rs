//! Observer types for the reactive graph.
//!
//! An Observer is any computation that depends on reactive values. There are
//! exactly two kinds: computeds (lazy, cached) and effects (eager, no value).
//! Both expose a single capability, [`Observer::run`], which is what a source
//! calls when it changes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::effect::EffectInner;

/// Unique identifier for a node in a reactive graph.
///
/// Signals, computeds and effects all draw from the same counter, so an id
/// identifies a node regardless of its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something an observer can read from: a signal or a computed.
///
/// Observers remember their sources so that stale subscriptions can be
/// dropped before the next evaluation.
pub(crate) trait Source: Send + Sync {
    fn unsubscribe(&self, observer: NodeId);
}

/// Type-erased view of a computed, used by [`Observer::Computed`].
pub(crate) trait ComputedNode: Send + Sync {
    /// Mark dirty and cascade to dependents without recomputing.
    fn invalidate(&self);

    fn record_source(&self, id: NodeId, source: Weak<dyn Source>);
}

/// A dependent of a signal or computed.
///
/// Held weakly: being subscribed never keeps an observer alive.
#[derive(Clone)]
pub(crate) enum Observer {
    Computed {
        id: NodeId,
        node: Weak<dyn ComputedNode>,
    },
    Effect {
        id: NodeId,
        node: Weak<EffectInner>,
    },
}

impl Observer {
    pub(crate) fn id(&self) -> NodeId {
        match self {
            Observer::Computed { id, .. } | Observer::Effect { id, .. } => *id,
        }
    }

    /// Notify the observer that one of its sources changed.
    ///
    /// A computed becomes dirty and passes the notification on; an effect
    /// re-executes (or is queued while a batch is open).
    pub(crate) fn run(&self) {
        match self {
            Observer::Computed { node, .. } => {
                if let Some(node) = node.upgrade() {
                    node.invalidate();
                }
            }
            Observer::Effect { node, .. } => {
                if let Some(node) = node.upgrade() {
                    node.notify();
                }
            }
        }
    }

    pub(crate) fn record_source(&self, id: NodeId, source: Weak<dyn Source>) {
        match self {
            Observer::Computed { node, .. } => {
                if let Some(node) = node.upgrade() {
                    node.record_source(id, source);
                }
            }
            Observer::Effect { node, .. } => {
                if let Some(node) = node.upgrade() {
                    node.record_source(id, source);
                }
            }
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Observer::Computed { node, .. } => node.strong_count() > 0,
            Observer::Effect { node, .. } => node.strong_count() > 0,
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observer::Computed { id, .. } => write!(f, "Computed({id})"),
            Observer::Effect { id, .. } => write!(f, "Effect({id})"),
        }
    }
}

/// Identity-keyed set of observers, kept in subscription order.
#[derive(Default)]
pub(crate) struct Dependents {
    observers: Mutex<IndexMap<NodeId, Observer>>,
}

impl Dependents {
    /// Insert an observer. Re-inserting an existing id keeps its position.
    pub(crate) fn insert(&self, observer: Observer) {
        self.observers.lock().insert(observer.id(), observer);
    }

    pub(crate) fn remove(&self, id: NodeId) {
        self.observers.lock().shift_remove(&id);
    }

    /// Live observers, in subscription order. Dead entries are pruned.
    pub(crate) fn snapshot(&self) -> Vec<Observer> {
        let mut observers = self.observers.lock();
        observers.retain(|_, observer| observer.is_alive());
        observers.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.lock().len()
    }

    /// Notify every current dependent.
    pub(crate) fn notify_all(&self) {
        for observer in self.snapshot() {
            observer.run();
        }
    }
}

/// The set of sources an observer read during its last evaluation.
#[derive(Default)]
pub(crate) struct Sources {
    sources: Mutex<IndexMap<NodeId, Weak<dyn Source>>>,
}

impl Sources {
    pub(crate) fn record(&self, id: NodeId, source: Weak<dyn Source>) {
        self.sources.lock().insert(id, source);
    }

    /// Unsubscribe `owner` from every recorded source and forget them.
    pub(crate) fn release(&self, owner: NodeId) {
        let sources = std::mem::take(&mut *self.sources.lock());
        for source in sources.into_values() {
            if let Some(source) = source.upgrade() {
                source.unsubscribe(owner);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sources.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Probe {
        removed: Mutex<Vec<NodeId>>,
    }

    impl Source for Probe {
        fn unsubscribe(&self, observer: NodeId) {
            self.removed.lock().push(observer);
        }
    }

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        let id3 = NodeId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn dependents_ignore_duplicates() {
        let dependents = Dependents::default();
        let id = NodeId::new();
        let observer = Observer::Effect {
            id,
            node: Weak::new(),
        };

        dependents.insert(observer.clone());
        dependents.insert(observer);
        assert_eq!(dependents.len(), 1);

        dependents.remove(id);
        assert_eq!(dependents.len(), 0);
    }

    #[test]
    fn dead_observers_are_pruned_on_snapshot() {
        let dependents = Dependents::default();
        dependents.insert(Observer::Effect {
            id: NodeId::new(),
            node: Weak::new(),
        });

        assert!(dependents.snapshot().is_empty());
        assert_eq!(dependents.len(), 0);
    }

    #[test]
    fn release_unsubscribes_owner_once_per_source() {
        let probe = Arc::new(Probe {
            removed: Mutex::new(Vec::new()),
        });
        let source_id = NodeId::new();
        let owner = NodeId::new();

        let sources = Sources::default();
        let weak: Weak<dyn Source> = Arc::downgrade(&probe) as Weak<dyn Source>;
        sources.record(source_id, weak.clone());
        sources.record(source_id, weak);
        assert_eq!(sources.len(), 1);

        sources.release(owner);
        assert_eq!(*probe.removed.lock(), vec![owner]);
        assert_eq!(sources.len(), 0);
    }
}
