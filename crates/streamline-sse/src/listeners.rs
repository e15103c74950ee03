use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerSet<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Ordered subscriber list for one event kind
///
/// Callbacks run in registration order, outside the internal lock, so a
/// callback may subscribe or unsubscribe without deadlocking.
pub struct Listeners<T> {
    inner: Arc<Mutex<ListenerSet<T>>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ListenerSet {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut set = lock(&self.inner);
            let id = set.next_id;
            set.next_id += 1;
            set.entries.push((id, Arc::new(callback)));
            id
        };

        let weak = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner).entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    pub fn emit(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = lock(&self.inner)
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in callbacks {
            callback(value);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Capability returned by every subscription; consuming it removes the
/// callback. Dropping it without calling `unsubscribe` keeps the callback.
pub struct Unsubscribe {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    fn new(remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe").finish_non_exhaustive()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order() {
        let listeners = Listeners::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            let _ = listeners.subscribe(move |value| seen.lock().unwrap().push(format!("{}{}", tag, value)));
        }

        listeners.emit(&1);
        assert_eq!(*seen.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_its_callback() {
        let listeners = Listeners::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let seen = Arc::clone(&seen);
            listeners.subscribe(move |value| seen.lock().unwrap().push(*value))
        };
        let _second = {
            let seen = Arc::clone(&seen);
            listeners.subscribe(move |value| seen.lock().unwrap().push(value * 10))
        };

        first.unsubscribe();
        listeners.emit(&2);

        assert_eq!(*seen.lock().unwrap(), vec![20]);
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_callback_can_subscribe_during_emit() {
        let listeners = Arc::new(Listeners::<u32>::new());
        let inner = Arc::clone(&listeners);

        let _ = listeners.subscribe(move |_| {
            let _ = inner.subscribe(|_| {});
        });

        listeners.emit(&0);
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn test_unsubscribe_after_list_dropped() {
        let listeners = Listeners::<u32>::new();
        let handle = listeners.subscribe(|_| {});
        drop(listeners);
        handle.unsubscribe();
    }
}
