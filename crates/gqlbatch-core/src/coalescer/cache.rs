//! Result cache that lets identical submissions share one pending slot.

use std::hash::Hash;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::types::{PendingResult, Settlement};

/// Result of looking a key up in the cache.
pub(crate) enum CacheSlot<V> {
    /// An earlier submission owns the slot; share its result.
    Hit(PendingResult<V>),
    /// First submission of this key. The caller must enqueue it and settle
    /// the slot through the settlement.
    Miss(Settlement<V>, PendingResult<V>),
}

/// Pending and settled results keyed by request key.
pub(crate) struct ResultCache<K, V>
where
    K: Hash + Eq,
{
    entries: DashMap<K, PendingResult<V>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Atomically returns the existing slot for `key` or registers a new one.
    pub fn acquire(&self, key: K) -> CacheSlot<V> {
        match self.entries.entry(key) {
            Entry::Occupied(entry) => CacheSlot::Hit(entry.get().clone()),
            Entry::Vacant(entry) => {
                let (settlement, pending) = PendingResult::channel();
                entry.insert(pending.clone());
                CacheSlot::Miss(settlement, pending)
            }
        }
    }

    /// Removes `key` only if it still maps to `slot`.
    pub fn evict(&self, key: &K, slot: &PendingResult<V>) {
        self.entries
            .remove_if(key, |_, cached| cached.same_slot(slot));
    }

    pub fn remove(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

/// RAII guard over the cache entries of one in-flight batch.
///
/// Entries are evicted when their outcome is a failure, and all of them are
/// evicted if the batch task unwinds before completing.
pub(crate) struct EvictionGuard<'a, K, V>
where
    K: Hash + Eq,
{
    cache: &'a ResultCache<K, V>,
    slots: Vec<(K, PendingResult<V>)>,
    completed: bool,
}

impl<'a, K, V> EvictionGuard<'a, K, V>
where
    K: Hash + Eq,
{
    pub fn new(cache: &'a ResultCache<K, V>, slots: Vec<(K, PendingResult<V>)>) -> Self {
        Self {
            cache,
            slots,
            completed: false,
        }
    }

    /// Evicts the slots at indices for which `failed` holds.
    pub fn complete(mut self, failed: impl Fn(usize) -> bool) {
        for (index, (key, slot)) in self.slots.iter().enumerate() {
            if failed(index) {
                self.cache.evict(key, slot);
            }
        }
        self.completed = true;
    }
}

impl<K, V> Drop for EvictionGuard<'_, K, V>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        if !self.completed {
            for (key, slot) in &self.slots {
                self.cache.evict(key, slot);
            }
        }
    }
}
