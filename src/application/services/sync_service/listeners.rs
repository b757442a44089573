use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Registration returned by the engine's `on_*` methods.
///
/// Dropping the handle leaves the listener registered; call
/// [`ListenerHandle::unsubscribe`] to remove it.
#[must_use = "keep the handle to unsubscribe later"]
pub struct ListenerHandle {
    id: ListenerId,
    detach: Box<dyn FnOnce(ListenerId) -> bool + Send + Sync>,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Returns false when the listener was already gone (registry cleared).
    pub fn unsubscribe(self) -> bool {
        (self.detach)(self.id)
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

pub(crate) struct ListenerRegistry<F: ?Sized> {
    name: &'static str,
    next_id: AtomicU64,
    listeners: Mutex<BTreeMap<ListenerId, Arc<F>>>,
}

impl<F> ListenerRegistry<F>
where
    F: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(BTreeMap::new()),
        }
    }

    pub(crate) fn register(self: &Arc<Self>, listener: Arc<F>) -> ListenerHandle {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(id, listener);

        let registry: Weak<Self> = Arc::downgrade(self);
        ListenerHandle {
            id,
            detach: Box::new(move |id| {
                registry
                    .upgrade()
                    .is_some_and(|registry| registry.remove(id))
            }),
        }
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Calls every listener outside the lock. A panicking listener is logged
    /// and the rest still run.
    pub(crate) fn notify(&self, call: impl Fn(&F)) {
        let listeners: Vec<(ListenerId, Arc<F>)> = self
            .lock()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))).is_err() {
                tracing::error!(
                    target: "sync::engine",
                    registry = self.name,
                    listener = %id,
                    "listener panicked"
                );
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ListenerId, Arc<F>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
