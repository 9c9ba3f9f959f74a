use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::ops::Deref;
use std::sync::{Arc, Mutex, Weak};

use rustc_hash::FxBuildHasher;

/// The key/value pair shared between all handles of one cache entry.
#[derive(Debug)]
pub struct SharedEntry<K, V> {
    key: K,
    value: V,
}

impl<K, V> SharedEntry<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }
}

/// A shared handle to a cached value.
///
/// The value stays alive for exactly as long as at least one handle exists;
/// once the last one is dropped, the value is destroyed and its slot in the
/// owning [`ResourceCache`] becomes eligible for reuse.
pub struct CacheHandle<K, V> {
    entry: Arc<SharedEntry<K, V>>,
}

impl<K, V> CacheHandle<K, V> {
    pub fn key(&self) -> &K {
        self.entry.key()
    }
}

impl<K, V> Clone for CacheHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            entry: Arc::clone(&self.entry),
        }
    }
}

impl<K, V> Deref for CacheHandle<K, V> {
    type Target = V;

    fn deref(&self) -> &V {
        self.entry.value()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for CacheHandle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHandle")
            .field("key", self.key())
            .field("value", self.entry.value())
            .finish()
    }
}

struct Slot<K, V> {
    hash: u64,
    entry: Weak<SharedEntry<K, V>>,
}

/// A thread-safe map from key to a shared, reference-counted value slot.
///
/// Lookups and insertions scan the slot table under a single coarse lock;
/// value access through a [`CacheHandle`] is lock-free afterwards. A key is
/// only findable while at least one handle to its value exists. Slots whose
/// value has been dropped are reused in place before the table grows, so the
/// table size is bounded by the peak number of simultaneously live entries.
pub struct ResourceCache<K, V, S = FxBuildHasher> {
    slots: Mutex<Vec<Slot<K, V>>>,
    hasher: S,
}

impl<K, V, S: Default> Default for ResourceCache<K, V, S> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            hasher: S::default(),
        }
    }
}

impl<K, V> ResourceCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: Eq + Hash, V, S: BuildHasher> ResourceCache<K, V, S> {
    /// Looks up a live entry by key.
    pub fn find<Q>(&self, key: &Q) -> Option<CacheHandle<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hasher.hash_one(key);
        let slots = self.slots.lock().unwrap();

        find_slot(&slots, hash, key)
    }

    /// Returns a handle to the entry for `key`, constructing the value with
    /// `init` if no live entry exists.
    ///
    /// `init` runs at most once, and only when the returned boolean is
    /// `true`; concurrent calls with the same key all receive handles to the
    /// single value that won.
    pub fn try_emplace<F>(&self, key: K, init: F) -> (bool, CacheHandle<K, V>)
    where
        F: FnOnce() -> V,
    {
        let hash = self.hasher.hash_one(&key);
        let mut slots = self.slots.lock().unwrap();

        if let Some(existing) = find_slot(&slots, hash, &key) {
            return (false, existing);
        }

        let entry = Arc::new(SharedEntry { value: init(), key });
        let slot = Slot {
            hash,
            entry: Arc::downgrade(&entry),
        };

        // Reuse a slot whose value has died before growing the table.
        match slots.iter_mut().find(|slot| slot.entry.strong_count() == 0) {
            Some(free) => *free = slot,
            None => slots.push(slot),
        }

        (true, CacheHandle { entry })
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}

fn find_slot<K, V, Q>(slots: &[Slot<K, V>], hash: u64, key: &Q) -> Option<CacheHandle<K, V>>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    slots
        .iter()
        .filter(|slot| slot.hash == hash)
        .find_map(|slot| {
            // Upgrading first means the entry cannot be destroyed while we
            // compare keys.
            let entry = slot.entry.upgrade()?;
            (entry.key().borrow() == key).then_some(CacheHandle { entry })
        })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_emplace_and_find() {
        let cache: ResourceCache<String, u32> = ResourceCache::new();

        let (inserted, handle) = cache.try_emplace("a".to_owned(), || 1);
        assert!(inserted);
        assert_eq!(*handle, 1);

        let found = cache.find("a").expect("entry should be live");
        assert_eq!(*found, 1);
        assert_eq!(found.key(), "a");
    }

    #[test]
    fn test_try_emplace_is_idempotent() {
        let cache: ResourceCache<String, u32> = ResourceCache::new();

        let (_, first) = cache.try_emplace("a".to_owned(), || 1);
        let (inserted, second) = cache.try_emplace("a".to_owned(), || {
            panic!("init must not run for an existing key")
        });

        assert!(!inserted);
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_entry_dies_with_last_handle() {
        let cache: ResourceCache<String, u32> = ResourceCache::new();

        let (_, handle) = cache.try_emplace("a".to_owned(), || 1);
        let copy = handle.clone();
        drop(handle);
        assert!(cache.find("a").is_some());

        drop(copy);
        assert!(cache.find("a").is_none());
    }

    #[test]
    fn test_dead_slots_are_reused() {
        let cache: ResourceCache<String, u32> = ResourceCache::new();

        for round in 0..100 {
            let (inserted, handle) = cache.try_emplace(format!("key-{round}"), || round);
            assert!(inserted);
            drop(handle);
        }

        // Every insertion above happened into the same reusable slot.
        assert_eq!(cache.slot_count(), 1);

        let (_, _held) = cache.try_emplace("held".to_owned(), || 0);
        let (_, _other) = cache.try_emplace("other".to_owned(), || 0);
        assert_eq!(cache.slot_count(), 2);
    }

    #[test]
    fn test_concurrent_emplace_constructs_once() {
        let cache: Arc<ResourceCache<String, u32>> = Arc::new(ResourceCache::new());
        let constructions = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let constructions = Arc::clone(&constructions);
                std::thread::spawn(move || {
                    let (_, handle) = cache.try_emplace("shared".to_owned(), || {
                        constructions.fetch_add(1, Ordering::SeqCst);
                        42
                    });
                    *handle
                })
            })
            .collect();

        for thread in threads {
            assert_eq!(thread.join().unwrap(), 42);
        }
        assert_eq!(constructions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_handle_churn() {
        let cache: Arc<ResourceCache<u32, Vec<u8>>> = Arc::new(ResourceCache::new());

        let threads: Vec<_> = (0..4)
            .map(|thread| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for round in 0..500u32 {
                        let key = (thread + round) % 16;
                        let (_, handle) = cache.try_emplace(key, || vec![key as u8; 64]);
                        assert_eq!(handle.len(), 64);
                        if let Some(found) = cache.find(&key) {
                            assert_eq!(found[0], key as u8);
                        }
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }
    }
}
