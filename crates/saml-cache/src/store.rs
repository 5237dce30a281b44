//! Expiring store trait.

use chrono::{DateTime, Utc};

use crate::error::CacheResult;

/// Key-value store whose entries carry an absolute expiry.
///
/// Implementations must be thread-safe. Operations on one key must be
/// atomic with respect to each other, and an entry whose expiry has passed
/// must behave exactly like an absent entry.
pub trait ExpiringStore: Send + Sync {
    /// Gets a live value.
    fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Inserts or replaces a value.
    fn insert(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> CacheResult<()>;

    /// Inserts a value only if no live entry exists.
    ///
    /// Returns `true` if the value was stored, `false` if a live entry
    /// already existed. The check and the insert happen atomically.
    fn insert_if_absent(
        &self,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> CacheResult<bool>;

    /// Atomically removes and returns a live value.
    fn take(&self, key: &str) -> CacheResult<Option<String>>;

    /// Removes a value.
    ///
    /// Returns `Ok(())` even if the key doesn't exist.
    fn remove(&self, key: &str) -> CacheResult<()>;

    /// Drops every expired entry and returns how many were dropped.
    fn purge_expired(&self) -> CacheResult<usize>;
}
