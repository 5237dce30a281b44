//! In-memory expiring store.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{CacheError, CacheResult};
use crate::store::ExpiringStore;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Writes between sweeps of expired entries.
const DEFAULT_PURGE_INTERVAL: usize = 256;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Concurrent in-process [`ExpiringStore`].
///
/// Backed by a sharded [`DashMap`]: operations lock only the shard that
/// owns the key, so work on one key never blocks unrelated keys.
/// Expired entries are swept every `purge_interval` writes, and before a
/// bounded store rejects a write for being full.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, StoredValue>>,
    clock: Clock,
    max_entries: Option<usize>,
    writes: Arc<AtomicUsize>,
    purge_interval: usize,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .field("purge_interval", &self.purge_interval)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an unbounded store using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock: Arc::new(Utc::now),
            max_entries: None,
            writes: Arc::new(AtomicUsize::new(0)),
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }

    /// Sweeps expired entries every `writes` writes (at least one).
    #[must_use]
    pub fn with_purge_interval(mut self, writes: usize) -> Self {
        self.purge_interval = writes.max(1);
        self
    }

    /// Limits the number of stored entries, expired ones included.
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Replaces the clock used to judge expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Number of stored entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn sweep(&self) -> usize {
        let now = self.now();
        let mut purged = 0usize;
        self.entries.retain(|_, entry| {
            let live = entry.is_live(now);
            if !live {
                purged += 1;
            }
            live
        });
        if purged > 0 {
            tracing::debug!(purged, "purged expired store entries");
        }
        purged
    }

    /// Counts a write and sweeps when the interval is reached or the store
    /// is full. Must not be called while holding an entry guard.
    fn before_write(&self, key: &str) -> CacheResult<()> {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let full = self.max_entries.is_some_and(|max| self.entries.len() >= max);
        if full || writes % self.purge_interval == 0 {
            self.sweep();
        }
        self.ensure_capacity(key)
    }

    fn ensure_capacity(&self, key: &str) -> CacheResult<()> {
        match self.max_entries {
            Some(max) if self.entries.len() >= max && !self.entries.contains_key(key) => {
                tracing::warn!(max_entries = max, "expiring store full, rejecting insert");
                Err(CacheError::CapacityExceeded(max))
            }
            _ => Ok(()),
        }
    }
}

impl ExpiringStore for MemoryStore {
    fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = self.now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    fn insert(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> CacheResult<()> {
        self.before_write(key)?;
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn insert_if_absent(
        &self,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> CacheResult<bool> {
        self.before_write(key)?;
        let now = self.now();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at,
        };

        // The shard stays write-locked for the whole match.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(stored);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(stored);
                Ok(true)
            }
        }
    }

    fn take(&self, key: &str) -> CacheResult<Option<String>> {
        let now = self.now();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(_, entry)| entry.value))
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn purge_expired(&self) -> CacheResult<usize> {
        Ok(self.sweep())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Mutex;

    fn fixed_clock() -> (MemoryStore, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(Utc::now()));
        let handle = Arc::clone(&now);
        let store = MemoryStore::new().with_clock(move || *handle.lock().unwrap());
        (store, now)
    }

    #[test]
    fn insert_and_get() {
        let store = MemoryStore::new();
        store
            .insert("k", "v", Utc::now() + Duration::minutes(1))
            .unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn expired_entries_are_invisible() {
        let (store, now) = fixed_clock();
        let start = *now.lock().unwrap();
        store.insert("k", "v", start + Duration::seconds(10)).unwrap();

        *now.lock().unwrap() = start + Duration::seconds(10);
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.take("k").unwrap(), None);
    }

    #[test]
    fn insert_if_absent_rejects_live_duplicate() {
        let store = MemoryStore::new();
        let expires = Utc::now() + Duration::minutes(1);
        assert!(store.insert_if_absent("id", "1", expires).unwrap());
        assert!(!store.insert_if_absent("id", "2", expires).unwrap());
        assert_eq!(store.get("id").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn insert_if_absent_replaces_expired_entry() {
        let (store, now) = fixed_clock();
        let start = *now.lock().unwrap();
        assert!(store.insert_if_absent("id", "1", start + Duration::seconds(1)).unwrap());

        *now.lock().unwrap() = start + Duration::seconds(5);
        assert!(store.insert_if_absent("id", "2", start + Duration::seconds(60)).unwrap());
        assert_eq!(store.get("id").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn take_consumes_once() {
        let store = MemoryStore::new();
        store
            .insert("k", "v", Utc::now() + Duration::minutes(1))
            .unwrap();
        assert_eq!(store.take("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.take("k").unwrap(), None);
    }

    #[test]
    fn remove_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove("nothing").is_ok());
    }

    #[test]
    fn purge_counts_expired() {
        let (store, now) = fixed_clock();
        let start = *now.lock().unwrap();
        store.insert("a", "", start + Duration::seconds(1)).unwrap();
        store.insert("b", "", start + Duration::seconds(1)).unwrap();
        store.insert("c", "", start + Duration::seconds(100)).unwrap();

        *now.lock().unwrap() = start + Duration::seconds(2);
        assert_eq!(store.purge_expired().unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn writes_sweep_expired_entries() {
        let (store, now) = fixed_clock();
        let store = store.with_purge_interval(2);
        let start = *now.lock().unwrap();
        store.insert("a", "", start + Duration::seconds(1)).unwrap();
        store.insert("b", "", start + Duration::seconds(1)).unwrap();
        assert_eq!(store.len(), 2);

        *now.lock().unwrap() = start + Duration::seconds(2);
        store.insert("c", "", start + Duration::seconds(100)).unwrap();
        assert!(store.insert_if_absent("d", "", start + Duration::seconds(100)).unwrap());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("c").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn full_store_makes_room_from_expired_entries() {
        let (store, now) = fixed_clock();
        let store = store.with_max_entries(1);
        let start = *now.lock().unwrap();
        store.insert("a", "", start + Duration::seconds(1)).unwrap();

        *now.lock().unwrap() = start + Duration::seconds(2);
        assert!(store.insert("b", "", start + Duration::seconds(100)).is_ok());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn capacity_limit() {
        let store = MemoryStore::new().with_max_entries(1);
        let expires = Utc::now() + Duration::minutes(1);
        store.insert("a", "", expires).unwrap();
        assert_eq!(
            store.insert("b", "", expires),
            Err(CacheError::CapacityExceeded(1))
        );
        // Overwriting an existing key does not grow the store.
        assert!(store.insert("a", "again", expires).is_ok());
    }

    #[test]
    fn concurrent_insert_if_absent_has_single_winner() {
        let store = MemoryStore::new();
        let expires = Utc::now() + Duration::minutes(1);

        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let store = store.clone();
                    scope.spawn(move || store.insert_if_absent("race", "", expires).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });

        assert_eq!(winners, 1);
    }
}
