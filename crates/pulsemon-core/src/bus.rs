// ── In-process event bus ──
//
// Synchronous publish/subscribe keyed by `EventKind`. Listeners run on the
// publisher's stack in priority order. The registry lock is never held
// while a listener runs, so listeners may freely subscribe, unsubscribe,
// or publish from inside a callback.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::error::ListenerError;
use crate::event::{BusEvent, EventKind};

const TAP_CHANNEL_SIZE: usize = 256;

/// A subscriber callback. Returning `Err` is logged and does not affect
/// other listeners or the publisher.
pub type Listener = Arc<dyn Fn(&BusEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&BusEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registration options for [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Remove the listener after its first invocation.
    pub once: bool,
    /// Higher runs first. Equal priorities run in subscription order.
    pub priority: i32,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            priority: 0,
        }
    }

    pub fn with_priority(priority: i32) -> Self {
        Self {
            once: false,
            priority,
        }
    }
}

struct ListenerEntry {
    id: u64,
    callback: Listener,
    /// Set for `once` entries. Claimed before the first invocation, so a
    /// nested publish that still sees the entry cannot run it again.
    spent: Option<Arc<AtomicBool>>,
    priority: i32,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// Kinds with no listeners are removed, never kept as empty vecs.
    listeners: HashMap<EventKind, Vec<ListenerEntry>>,
}

impl Registry {
    fn remove_ids(&mut self, kind: EventKind, ids: &[u64]) {
        if let Some(entries) = self.listeners.get_mut(&kind) {
            entries.retain(|e| !ids.contains(&e.id));
            if entries.is_empty() {
                self.listeners.remove(&kind);
            }
        }
    }
}

struct BusInner {
    registry: Mutex<Registry>,
    /// Mirror of every published event. Independent of the registry, so it
    /// keeps delivering after `clear()`.
    tap: broadcast::Sender<Arc<BusEvent>>,
}

/// Synchronous publish/subscribe registry shared by the dashboard
/// components.
///
/// Cheaply cloneable; clones share one registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry();
        f.debug_struct("EventBus")
            .field("kinds", &registry.listeners.len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tap, _) = broadcast::channel(TAP_CHANNEL_SIZE);
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                tap,
            }),
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register `callback` for `kind`.
    ///
    /// The returned [`Subscription`] removes exactly this registration.
    /// Dropping it leaves the listener registered.
    pub fn subscribe(
        &self,
        kind: EventKind,
        callback: Listener,
        options: SubscribeOptions,
    ) -> Subscription {
        let mut registry = self.registry();
        let id = registry.next_id;
        registry.next_id += 1;

        let entries = registry.listeners.entry(kind).or_default();
        // Insert after every entry of equal or higher priority.
        let at = entries
            .iter()
            .position(|e| e.priority < options.priority)
            .unwrap_or(entries.len());
        entries.insert(
            at,
            ListenerEntry {
                id,
                callback,
                spent: options.once.then(|| Arc::new(AtomicBool::new(false))),
                priority: options.priority,
            },
        );
        trace!(event = %kind, id, priority = options.priority, once = options.once, "listener subscribed");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Register a listener that is removed after its first invocation.
    pub fn subscribe_once(&self, kind: EventKind, callback: Listener) -> Subscription {
        self.subscribe(kind, callback, SubscribeOptions::once())
    }

    /// Remove the first listener registered for `kind` with this exact
    /// callback. Returns `false` if none was registered.
    pub fn unsubscribe(&self, kind: EventKind, callback: &Listener) -> bool {
        let mut registry = self.registry();
        let Some(entries) = registry.listeners.get(&kind) else {
            return false;
        };
        let Some(id) = entries
            .iter()
            .find(|e| Arc::ptr_eq(&e.callback, callback))
            .map(|e| e.id)
        else {
            return false;
        };
        registry.remove_ids(kind, &[id]);
        true
    }

    /// Remove all listeners for `kind`, or for every kind when `None`.
    pub fn clear(&self, kind: Option<EventKind>) {
        let mut registry = self.registry();
        match kind {
            Some(kind) => {
                registry.listeners.remove(&kind);
            }
            None => registry.listeners.clear(),
        }
    }

    /// Remove every listener whose kind matches `predicate`.
    pub fn clear_where(&self, predicate: impl Fn(EventKind) -> bool) {
        self.registry().listeners.retain(|kind, _| !predicate(*kind));
    }

    /// Number of listeners currently registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.registry().listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Receive a copy of every event published from now on, regardless of
    /// listener registration.
    pub fn tap(&self) -> broadcast::Receiver<Arc<BusEvent>> {
        self.inner.tap.subscribe()
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Invoke every listener registered for the event's kind, in priority
    /// order, and return how many ran.
    ///
    /// Listeners added during this pass are not invoked until the next
    /// publish. `once` listeners run at most one time, even when a listener
    /// re-publishes the same kind, and are removed after the full pass.
    pub fn publish(&self, event: BusEvent) -> usize {
        let kind = event.kind();
        let event = Arc::new(event);
        // Ignore send errors: no tap receivers is the common case.
        let _ = self.inner.tap.send(Arc::clone(&event));

        let snapshot: Vec<(u64, Listener, Option<Arc<AtomicBool>>)> = {
            let registry = self.registry();
            registry.listeners.get(&kind).map_or_else(Vec::new, |entries| {
                entries
                    .iter()
                    .map(|e| (e.id, Arc::clone(&e.callback), e.spent.clone()))
                    .collect()
            })
        };

        if snapshot.is_empty() {
            trace!(event = %kind, "published with no listeners");
            return 0;
        }

        let mut ran = 0;
        let mut fired_once = Vec::new();
        for (id, callback, spent) in &snapshot {
            if let Some(spent) = spent {
                if spent.swap(true, Ordering::AcqRel) {
                    continue;
                }
                fired_once.push(*id);
            }
            ran += 1;
            match panic::catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(event = %kind, listener = id, error = %e, "listener failed"),
                Err(_) => warn!(event = %kind, listener = id, "listener panicked"),
            }
        }

        if !fired_once.is_empty() {
            self.registry().remove_ids(kind, &fired_once);
        }

        ran
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the listener this handle was issued for. Returns `false` if
    /// it was already gone (fired as `once`, cleared, or bus dropped).
    pub fn unsubscribe(self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let mut registry = inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let present = registry
            .listeners
            .get(&self.kind)
            .is_some_and(|entries| entries.iter().any(|e| e.id == self.id));
        if present {
            registry.remove_ids(self.kind, &[self.id]);
        }
        present
    }
}
