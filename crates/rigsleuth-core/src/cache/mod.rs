/// Time-to-live cache around the whole gather.
///
/// One [`CacheManager`] per engine holds at most one entry: the store of
/// the latest gather and the instant it started. The entry is replaced as
/// soon as a new gather begins, while its workers are still filling it.
use crate::snapshot::SnapshotStore;

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    stamped: Instant,
    store: SnapshotStore,
}

#[derive(Debug)]
pub struct CacheManager {
    ttl: Duration,
    entry: Mutex<Option<CacheEntry>>,
}

impl CacheManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entry: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached store if it is younger than the TTL.
    pub fn lookup(&self) -> Option<SnapshotStore> {
        self.lookup_at(Instant::now())
    }

    /// [`Self::lookup`] against an explicit clock reading.
    pub fn lookup_at(&self, now: Instant) -> Option<SnapshotStore> {
        let guard = self.entry.lock();
        let entry = guard.as_ref()?;
        let age = now.saturating_duration_since(entry.stamped);
        if age < self.ttl {
            debug!("Cache hit ({:.1}s old)", age.as_secs_f64());
            Some(entry.store.clone())
        } else {
            debug!("Cache entry expired ({:.1}s old)", age.as_secs_f64());
            None
        }
    }

    /// Replace the entry, stamped now.
    pub fn store(&self, store: SnapshotStore) {
        self.store_at(store, Instant::now());
    }

    pub fn store_at(&self, store: SnapshotStore, stamped: Instant) {
        *self.entry.lock() = Some(CacheEntry { stamped, store });
    }

    /// Run `f` with the entry lock held, so a check-then-replace is atomic
    /// with respect to other gathers.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut CacheSlot<'_>) -> R) -> R {
        let mut guard = self.entry.lock();
        let mut slot = CacheSlot {
            ttl: self.ttl,
            entry: &mut *guard,
        };
        f(&mut slot)
    }

    pub fn clear(&self) {
        *self.entry.lock() = None;
    }
}

/// The cache entry while [`CacheManager::with_lock`] holds it.
pub struct CacheSlot<'a> {
    ttl: Duration,
    entry: &'a mut Option<CacheEntry>,
}

impl CacheSlot<'_> {
    pub fn fresh(&self, now: Instant) -> Option<SnapshotStore> {
        self.entry
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.stamped) < self.ttl)
            .map(|e| e.store.clone())
    }

    pub fn replace(&mut self, store: SnapshotStore, stamped: Instant) {
        *self.entry = Some(CacheEntry { stamped, store });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_misses() {
        let cache = CacheManager::new(Duration::from_secs(300));
        assert!(cache.lookup().is_none());
    }

    #[test]
    fn entry_expires_at_ttl() {
        let cache = CacheManager::new(Duration::from_secs(300));
        let t0 = Instant::now();
        cache.store_at(SnapshotStore::new(1), t0);

        assert!(cache.lookup_at(t0 + Duration::from_secs(299)).is_some());
        assert!(cache.lookup_at(t0 + Duration::from_secs(300)).is_none());
    }

    #[test]
    fn hit_shares_the_live_store() {
        let cache = CacheManager::new(Duration::from_secs(60));
        let store = SnapshotStore::new(7);
        cache.store(store.clone());
        let hit = cache.lookup().unwrap();
        assert_eq!(hit.generation(), 7);
    }

    #[test]
    fn slot_replace_is_seen_by_lookup() {
        let cache = CacheManager::new(Duration::from_secs(60));
        let now = Instant::now();
        cache.with_lock(|slot| {
            assert!(slot.fresh(now).is_none());
            slot.replace(SnapshotStore::new(3), now);
        });
        assert_eq!(cache.lookup_at(now).map(|s| s.generation()), Some(3));
        cache.clear();
        assert!(cache.lookup().is_none());
    }
}
