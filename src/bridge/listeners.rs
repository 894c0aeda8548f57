//! Host-side event listener registry.
//!
//! Listeners are invoked from a snapshot taken under the lock, so a listener
//! may freely register, remove or emit without deadlocking. `once` entries
//! are removed in the same critical section that snapshots them, so they
//! run at most once even under concurrent emits.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::codec::Value;
use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Event listener callback.
///
/// Receives the event's positional arguments.
pub type Listener = Arc<dyn Fn(&[Value]) + Send + Sync>;

struct Entry {
    id: ListenerId,
    listener: Listener,
    once: bool,
}

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Named multi-listener registry.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    events: Mutex<FxHashMap<String, Vec<Entry>>>,
}

impl ListenerRegistry {
    /// Registers a listener.
    pub fn add(&self, event: &str, listener: Listener, once: bool) -> ListenerId {
        let id = ListenerId::next();
        self.events
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Entry { id, listener, once });
        id
    }

    /// Removes one listener, or every listener of `event` when `id` is `None`.
    ///
    /// Returns the number removed.
    pub fn remove(&self, event: &str, id: Option<ListenerId>) -> usize {
        let mut events = self.events.lock();
        let Some(entries) = events.get_mut(event) else {
            return 0;
        };

        let removed = match id {
            Some(id) => {
                let before = entries.len();
                entries.retain(|entry| entry.id != id);
                before - entries.len()
            }
            None => entries.len(),
        };

        if id.is_none() || entries.is_empty() {
            events.remove(event);
        }
        removed
    }

    /// Invokes every listener of `event` with `args`.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, args: &[Value]) -> usize {
        let snapshot: Vec<Listener> = {
            let mut events = self.events.lock();
            let Some(entries) = events.get_mut(event) else {
                return 0;
            };

            let snapshot = entries.iter().map(|e| Arc::clone(&e.listener)).collect();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                events.remove(event);
            }
            snapshot
        };

        for listener in &snapshot {
            listener(args);
        }
        snapshot.len()
    }

    /// Returns the number of listeners of `event`.
    pub fn count(&self, event: &str) -> usize {
        self.events.lock().get(event).map_or(0, Vec::len)
    }

    /// Removes every listener.
    pub fn clear(&self) {
        // Dropped outside the lock; listener captures may own other handles.
        let drained = std::mem::take(&mut *self.events.lock());
        drop(drained);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let listener: Listener = Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, listener)
    }

    #[test]
    fn test_emit_calls_in_order() {
        let registry = ListenerRegistry::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            registry.add("e", Arc::new(move |_| order.lock().push(n)), false);
        }

        assert_eq!(registry.emit("e", &[]), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_once_runs_once() {
        let registry = ListenerRegistry::default();
        let (hits, listener) = counter();
        registry.add("e", listener, true);

        registry.emit("e", &[]);
        registry.emit("e", &[]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.count("e"), 0);
    }

    #[test]
    fn test_remove_by_id() {
        let registry = ListenerRegistry::default();
        let (hits_a, a) = counter();
        let (hits_b, b) = counter();
        let id_a = registry.add("e", a, false);
        registry.add("e", b, false);

        assert_eq!(registry.remove("e", Some(id_a)), 1);
        registry.emit("e", &[]);
        assert_eq!(hits_a.load(Ordering::SeqCst), 0);
        assert_eq!(hits_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_all_of_event() {
        let registry = ListenerRegistry::default();
        let (_, a) = counter();
        let (_, b) = counter();
        registry.add("e", a, false);
        registry.add("e", b, true);

        assert_eq!(registry.remove("e", None), 2);
        assert_eq!(registry.emit("e", &[]), 0);
    }

    #[test]
    fn test_listener_may_reenter() {
        let registry = Arc::new(ListenerRegistry::default());
        let inner = Arc::clone(&registry);
        let (hits, counted) = counter();
        registry.add("second", counted, false);
        registry.add(
            "first",
            Arc::new(move |args| {
                inner.emit("second", args);
            }),
            false,
        );

        registry.emit("first", &[Value::Null]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        registry.clear();
    }

    #[test]
    fn test_clear() {
        let registry = ListenerRegistry::default();
        let (_, a) = counter();
        registry.add("e", a, false);
        registry.clear();
        assert_eq!(registry.count("e"), 0);
    }
}
