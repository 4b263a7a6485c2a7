use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;

use super::LockStore;
use crate::StoreError;

#[derive(Debug)]
struct MemoryRecord {
    token:      String,
    expires_at: Instant,
}

impl MemoryRecord {
    #[inline]
    fn new(token: &str, ttl: Duration) -> Self {
        Self {
            token:      String::from(token),
            expires_at: Instant::now() + ttl,
        }
    }

    #[inline]
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    #[inline]
    fn is_owned_by(&self, token: &str) -> bool {
        !self.is_expired() && self.token == token
    }
}

#[derive(Debug, Default)]
struct StatsCollector {
    set_if_absent:      AtomicU64,
    get:                AtomicU64,
    compare_and_delete: AtomicU64,
    compare_and_extend: AtomicU64,
}

/// Number of commands a [`MemoryStore`] has executed, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub set_if_absent:      u64,
    pub get:                u64,
    pub compare_and_delete: u64,
    pub compare_and_extend: u64,
}

#[derive(Debug)]
struct MemoryStoreInner {
    records:     DashMap<String, MemoryRecord>,
    stats:       StatsCollector,
    unavailable: AtomicBool,
}

/// An in-process [`LockStore`] with the same semantics as the Redis one, including TTL expiry.
///
/// It only coordinates locks within one process. Clones share the same records. Expiry follows the Tokio clock, so a paused clock in tests controls it too.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl Default for MemoryStore {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryStoreInner {
                records:     DashMap::new(),
                stats:       StatsCollector::default(),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Makes every command fail with [`StoreError::Unavailable`] until it is set back to `true`.
    #[inline]
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Sets `key` to `token` unconditionally, like a plain `SET key token PX ttl`. This overwrites whoever holds the key.
    pub fn set(&self, key: impl Into<String>, token: impl AsRef<str>, ttl: Duration) {
        self.inner.records.insert(key.into(), MemoryRecord::new(token.as_ref(), ttl));
    }

    /// Gets the current value of `key` without going through the fault injection or the statistics. An expired record is dropped.
    pub fn peek(&self, key: &str) -> Option<String> {
        let record = self
            .inner
            .records
            .get(key)
            .map(|record| (record.token.clone(), record.is_expired()));

        match record {
            Some((token, false)) => Some(token),
            Some((_, true)) => {
                self.inner.records.remove_if(key, |_, record| record.is_expired());

                None
            },
            None => None,
        }
    }

    /// Drops every expired record, such as the ones left by holders which never came back.
    pub fn purge_expired(&self) {
        self.inner.records.retain(|_, record| !record.is_expired());
    }

    /// Number of records, including expired ones which have not been dropped yet.
    pub fn record_count(&self) -> usize {
        self.inner.records.len()
    }

    /// Remaining TTL of `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.inner
            .records
            .get(key)
            .filter(|record| !record.is_expired())
            .map(|record| record.expires_at - Instant::now())
    }

    /// Command counters.
    pub fn stats(&self) -> MemoryStoreStats {
        let stats = &self.inner.stats;

        MemoryStoreStats {
            set_if_absent:      stats.set_if_absent.load(Ordering::Relaxed),
            get:                stats.get.load(Ordering::Relaxed),
            compare_and_delete: stats.compare_and_delete.load(Ordering::Relaxed),
            compare_and_extend: stats.compare_and_extend.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn check_available(&self, counter: &AtomicU64) -> Result<(), StoreError> {
        counter.fetch_add(1, Ordering::Relaxed);

        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(String::from("the memory store is switched off")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available(&self.inner.stats.set_if_absent)?;

        match self.inner.records.entry(String::from(key)) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired() {
                    entry.insert(MemoryRecord::new(token, ttl));

                    Ok(true)
                } else {
                    Ok(false)
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(MemoryRecord::new(token, ttl));

                Ok(true)
            },
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available(&self.inner.stats.get)?;

        Ok(self.peek(key))
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        self.check_available(&self.inner.stats.compare_and_delete)?;

        Ok(self.inner.records.remove_if(key, |_, record| record.is_owned_by(token)).is_some())
    }

    async fn compare_and_extend(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_available(&self.inner.stats.compare_and_extend)?;

        match self.inner.records.get_mut(key) {
            Some(mut record) if record.is_owned_by(token) => {
                record.expires_at = Instant::now() + ttl;

                Ok(true)
            },
            _ => Ok(false),
        }
    }
}
