//! Typed publish/subscribe table.
//!
//! Listeners are keyed by event name and invoked synchronously in
//! registration order. Listener identity is `Arc` pointer identity:
//! registering the same `Arc` twice for one event is a no-op.
//!
//! # Example
//!
//! ```ignore
//! let router: EventRouter<String> = EventRouter::new();
//! let print = listener(|msg: &String| println!("{msg}"));
//!
//! router.on("greeting", print.clone());
//! router.on("greeting", print.clone()); // warns, no second registration
//! router.emit("greeting", &"hello".to_string()); // prints once
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{error, trace, warn};

use crate::identifiers::{ListenerId, OwnerId};

// ============================================================================
// Types
// ============================================================================

/// Shared listener callback.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Wraps a closure as a [`Listener`].
#[inline]
pub fn listener<E, F>(f: F) -> Listener<E>
where
    F: Fn(&E) + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Registration<E> {
    id: ListenerId,
    listener: Listener<E>,
    owner: Option<OwnerId>,
    once: bool,
}

struct RouterTable<E> {
    by_event: FxHashMap<String, Vec<Registration<E>>>,
    by_owner: FxHashMap<OwnerId, FxHashSet<(String, ListenerId)>>,
}

impl<E> Default for RouterTable<E> {
    fn default() -> Self {
        Self {
            by_event: FxHashMap::default(),
            by_owner: FxHashMap::default(),
        }
    }
}

impl<E> RouterTable<E> {
    fn unindex_owner(&mut self, owner: &OwnerId, event: &str, id: ListenerId) {
        if let Some(set) = self.by_owner.get_mut(owner) {
            set.remove(&(event.to_string(), id));
            if set.is_empty() {
                self.by_owner.remove(owner);
            }
        }
    }

    fn remove_where(&mut self, event: &str, pred: impl Fn(&Registration<E>) -> bool) -> usize {
        let Some(list) = self.by_event.get_mut(event) else {
            return 0;
        };

        let mut removed = Vec::new();
        list.retain(|r| {
            if pred(r) {
                removed.push((r.id, r.owner.clone()));
                false
            } else {
                true
            }
        });
        if list.is_empty() {
            self.by_event.remove(event);
        }

        for (id, owner) in &removed {
            if let Some(owner) = owner {
                self.unindex_owner(owner, event, *id);
            }
        }
        removed.len()
    }
}

// ============================================================================
// EventRouter
// ============================================================================

/// Event name → ordered listeners, with an owner secondary index.
pub struct EventRouter<E> {
    table: Mutex<RouterTable<E>>,
}

impl<E> Default for EventRouter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventRouter<E> {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(RouterTable::default()),
        }
    }

    /// Registers a listener.
    ///
    /// Returns the existing registration's ID if this exact listener is
    /// already registered for `event`.
    pub fn on(&self, event: impl Into<String>, listener: Listener<E>) -> ListenerId {
        self.register(event.into(), listener, None, false)
    }

    /// Registers a listener removed after its first invocation.
    pub fn once(&self, event: impl Into<String>, listener: Listener<E>) -> ListenerId {
        self.register(event.into(), listener, None, true)
    }

    /// Registers a listener tagged with an owner for bulk removal.
    pub fn on_owned(
        &self,
        owner: impl Into<OwnerId>,
        event: impl Into<String>,
        listener: Listener<E>,
    ) -> ListenerId {
        self.register(event.into(), listener, Some(owner.into()), false)
    }

    fn register(
        &self,
        event: String,
        listener: Listener<E>,
        owner: Option<OwnerId>,
        once: bool,
    ) -> ListenerId {
        let mut table = self.table.lock();
        let list = table.by_event.entry(event.clone()).or_default();

        if let Some(existing) = list.iter().find(|r| Arc::ptr_eq(&r.listener, &listener)) {
            warn!(event = %event, listener_id = %existing.id, "Listener already registered");
            return existing.id;
        }

        let id = ListenerId::next();
        list.push(Registration {
            id,
            listener,
            owner: owner.clone(),
            once,
        });

        if let Some(owner) = owner {
            table.by_owner.entry(owner).or_default().insert((event, id));
        }
        id
    }

    /// Removes a listener by identity. Returns `true` if it was registered.
    pub fn off(&self, event: &str, listener: &Listener<E>) -> bool {
        self.table
            .lock()
            .remove_where(event, |r| Arc::ptr_eq(&r.listener, listener))
            > 0
    }

    /// Removes a registration by ID.
    pub fn off_id(&self, id: ListenerId) -> bool {
        let mut table = self.table.lock();
        let event = table
            .by_event
            .iter()
            .find(|(_, list)| list.iter().any(|r| r.id == id))
            .map(|(event, _)| event.clone());

        match event {
            Some(event) => table.remove_where(&event, |r| r.id == id) > 0,
            None => false,
        }
    }

    /// Removes every listener registered under `owner`. Returns the count.
    pub fn off_owner(&self, owner: &OwnerId) -> usize {
        let mut table = self.table.lock();
        let Some(entries) = table.by_owner.remove(owner) else {
            return 0;
        };

        let mut removed = 0;
        for (event, id) in entries {
            removed += table.remove_where(&event, |r| r.id == id);
        }
        trace!(owner = %owner, removed, "Removed owner listeners");
        removed
    }

    /// Removes every listener for `event`. Returns the count.
    pub fn off_event(&self, event: &str) -> usize {
        self.table.lock().remove_where(event, |_| true)
    }

    /// Removes every listener.
    pub fn clear(&self) {
        let mut table = self.table.lock();
        table.by_event.clear();
        table.by_owner.clear();
    }

    /// Number of listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.table.lock().by_event.get(event).map_or(0, Vec::len)
    }

    /// Number of listeners registered under `owner`.
    #[must_use]
    pub fn owner_count(&self, owner: &OwnerId) -> usize {
        self.table.lock().by_owner.get(owner).map_or(0, FxHashSet::len)
    }

    /// Invokes every listener for `event` in registration order.
    ///
    /// The table lock is released before listeners run, so listeners may
    /// register or remove listeners. A panicking listener is logged and
    /// does not stop delivery. Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, data: &E) -> usize {
        let snapshot: Vec<(ListenerId, Listener<E>)> = {
            let mut table = self.table.lock();
            let Some(list) = table.by_event.get(event) else {
                return 0;
            };
            let snapshot = list
                .iter()
                .map(|r| (r.id, Arc::clone(&r.listener)))
                .collect();
            table.remove_where(event, |r| r.once);
            snapshot
        };

        for (id, listener) in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(data))).is_err() {
                error!(event = %event, listener_id = %id, "Listener panicked");
            }
        }
        snapshot.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Listener<u32>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (
            count,
            listener(move |_: &u32| {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_duplicate_registration_is_suppressed() {
        let router = EventRouter::new();
        let (count, l) = counter();

        let first = router.on("tick", Arc::clone(&l));
        let second = router.on("tick", Arc::clone(&l));
        assert_eq!(first, second);
        assert_eq!(router.listener_count("tick"), 1);

        router.emit("tick", &1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_listener_on_two_events() {
        let router = EventRouter::new();
        let (count, l) = counter();
        router.on("a", Arc::clone(&l));
        router.on("b", Arc::clone(&l));

        router.emit("a", &0);
        router.emit("b", &0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_registration_order() {
        let router: EventRouter<u32> = EventRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            router.on("e", listener(move |_: &u32| order.lock().push(n)));
        }

        assert_eq!(router.emit("e", &0), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let router = EventRouter::new();
        let (count, l) = counter();
        router.on("e", listener(|_: &u32| panic!("listener bug")));
        router.on("e", l);

        assert_eq!(router.emit("e", &0), 2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_once_runs_once() {
        let router = EventRouter::new();
        let (count, l) = counter();
        router.once("e", l);

        router.emit("e", &0);
        router.emit("e", &0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(router.listener_count("e"), 0);
    }

    #[test]
    fn test_off_by_identity_and_id() {
        let router = EventRouter::new();
        let (_, a) = counter();
        let (_, b) = counter();
        router.on("e", Arc::clone(&a));
        let b_id = router.on("e", b);

        assert!(router.off("e", &a));
        assert!(!router.off("e", &a));
        assert!(router.off_id(b_id));
        assert!(!router.off_id(b_id));
        assert_eq!(router.listener_count("e"), 0);
    }

    #[test]
    fn test_off_owner_removes_everything_it_registered() {
        let router = EventRouter::new();
        let owner = OwnerId::new("kanban-board");
        let (count, l) = counter();
        let (_, other) = counter();

        router.on_owned(owner.clone(), "connect", Arc::clone(&l));
        router.on_owned(owner.clone(), "disconnect", Arc::clone(&l));
        router.on_owned(owner.clone(), "status_update", listener(|_: &u32| {}));
        router.on("connect", other);
        assert_eq!(router.owner_count(&owner), 3);

        assert_eq!(router.off_owner(&owner), 3);
        assert_eq!(router.owner_count(&owner), 0);
        assert_eq!(router.listener_count("connect"), 1);
        assert_eq!(router.listener_count("disconnect"), 0);

        router.emit("connect", &0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_off_keeps_owner_index_consistent() {
        let router = EventRouter::new();
        let owner = OwnerId::new("card-7");
        let (_, l) = counter();
        router.on_owned(owner.clone(), "e", Arc::clone(&l));

        assert!(router.off("e", &l));
        assert_eq!(router.owner_count(&owner), 0);
        assert_eq!(router.off_owner(&owner), 0);
    }

    #[test]
    fn test_listener_may_register_during_emit() {
        let router: Arc<EventRouter<u32>> = Arc::new(EventRouter::new());
        let r = Arc::clone(&router);
        router.on(
            "e",
            listener(move |_: &u32| {
                r.on("late", listener(|_: &u32| {}));
            }),
        );

        router.emit("e", &0);
        assert_eq!(router.listener_count("late"), 1);
    }
}
