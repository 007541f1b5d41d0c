use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`Listeners::add`], used to remove the listener later.
///
/// Ids are unique across every listener list in the process, so a handle can
/// be offered to several lists and only the owning one will match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// An ordered list of callbacks that all receive every emitted event.
///
/// Registering a listener never replaces an earlier one. Callbacks are
/// invoked in registration order, outside the internal lock, so a callback
/// may add or remove listeners on the same list.
pub struct Listeners<E> {
    entries: Mutex<Vec<(ListenerId, Callback<E>)>>,
}

impl<E> Listeners<E> {
    /// Create an empty listener list.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append a callback and return its id.
    pub fn add(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.entries.lock().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Remove every callback.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Deliver `event` to every registered callback.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Callback<E>> = self
            .entries
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no callback is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_all_listeners_receive_event() {
        let listeners: Listeners<u32> = Listeners::new();
        let total = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let total = total.clone();
            listeners.add(move |v| {
                total.fetch_add(*v as usize, Ordering::SeqCst);
            });
        }
        listeners.emit(&2);
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_remove_single_listener() {
        let listeners: Listeners<()> = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h1 = hits.clone();
        let first = listeners.add(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        listeners.add(move |_| {
            h2.fetch_add(10, Ordering::SeqCst);
        });

        assert!(listeners.remove(first));
        assert!(!listeners.remove(first));
        listeners.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_ids_do_not_collide_across_lists() {
        let a: Listeners<()> = Listeners::new();
        let b: Listeners<()> = Listeners::new();
        let id = a.add(|_| {});
        b.add(|_| {});
        assert!(!b.remove(id));
        assert_eq!(b.len(), 1);
        assert!(a.remove(id));
    }

    #[test]
    fn test_clear() {
        let listeners: Listeners<()> = Listeners::new();
        listeners.add(|_| {});
        listeners.add(|_| {});
        listeners.clear();
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_emit_preserves_registration_order() {
        let listeners: Listeners<()> = Listeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = order.clone();
            listeners.add(move |_| order.lock().push(i));
        }
        listeners.emit(&());
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_callback_may_remove_itself() {
        let listeners = Arc::new(Listeners::<()>::new());
        let slot = Arc::new(Mutex::new(None));
        let inner = listeners.clone();
        let slot_inner = slot.clone();
        let id = listeners.add(move |_| {
            if let Some(id) = *slot_inner.lock() {
                inner.remove(id);
            }
        });
        *slot.lock() = Some(id);
        listeners.emit(&());
        assert!(listeners.is_empty());
    }
}
