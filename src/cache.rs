//! Keyed single-flight cache

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

/// A memo table in which each key is computed at most once.
///
/// The map lock is held only to fetch a key's slot. Concurrent callers for the
/// same key block on that slot while one of them runs the initializer; callers
/// for other keys proceed in parallel. A failed initialization is not stored:
/// the next caller retries, and a slot nobody else is waiting on is removed.
///
/// An initializer must not request its own key.
pub struct SingleFlight<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the value for `key`, running `init` if no value exists yet.
    pub fn get_or_try_init<E>(
        &self,
        key: K,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let result = slot.get_or_try_init(init).cloned();
        if result.is_err() {
            self.evict_empty(&key, &slot);
        }
        result
    }

    /// Drop `slot` from the map if it is still empty and only this caller holds it.
    fn evict_empty(&self, key: &K, slot: &Arc<OnceCell<V>>) {
        let mut slots = self.slots.lock();
        let idle = slots.get(key).map_or(false, |held| {
            Arc::ptr_eq(held, slot) && held.get().is_none() && Arc::strong_count(held) == 2
        });
        if idle {
            slots.remove(key);
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let slots = self.slots.lock();
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Number of initialized entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.lock();
        slots.values().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("slots", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn computes_once_per_key() {
        let cache: SingleFlight<&str, usize> = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache.get_or_try_init("a", || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(7)
            });
            assert_eq!(value, Ok(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&"a"), Some(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache: SingleFlight<u32, String> = SingleFlight::new();

        let first = cache.get_or_try_init(1, || Err("boom"));
        assert_eq!(first, Err("boom"));
        assert!(cache.is_empty());

        let second = cache.get_or_try_init(1, || Ok::<_, &str>("ok".to_string()));
        assert_eq!(second.as_deref(), Ok("ok"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failing_keys_leave_no_slots() {
        let cache: SingleFlight<u32, u32> = SingleFlight::new();
        for key in 0..16 {
            for _ in 0..3 {
                assert!(cache.get_or_try_init(key, || Err::<u32, _>("unregistered")).is_err());
            }
        }
        assert_eq!(cache.slots.lock().len(), 0);

        cache.get_or_try_init(3, || Ok::<_, ()>(9)).unwrap();
        assert_eq!(cache.slots.lock().len(), 1);
    }

    #[test]
    fn concurrent_callers_share_one_computation() {
        let cache: SingleFlight<u8, Arc<String>> = SingleFlight::new();
        let calls = AtomicUsize::new(0);

        let results: Vec<Arc<String>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        cache
                            .get_or_try_init(0, || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(20));
                                Ok::<_, ()>(Arc::new("shared".to_string()))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn clear_forgets_values() {
        let cache: SingleFlight<u8, u8> = SingleFlight::new();
        cache.get_or_try_init(1, || Ok::<_, ()>(1)).unwrap();
        cache.clear();
        assert_eq!(cache.get(&1), None);
    }
}
