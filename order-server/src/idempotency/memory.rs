//! In-process idempotency cache

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{IdempotencyRecord, IdempotencyResult, IdempotencyStore};

struct CacheEntry {
    record: IdempotencyRecord,
    expires_at: Instant,
}

/// DashMap-backed cache. Expired entries are invisible to reads and are
/// removed by [`IdempotencyStore::evict_expired`].
#[derive(Default)]
pub struct MemoryIdempotencyStore {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn get(&self, key: &str) -> IdempotencyResult<Option<IdempotencyRecord>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.record.clone()))
    }

    async fn set(
        &self,
        key: &str,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> IdempotencyResult<()> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                record: record.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        record: &IdempotencyRecord,
        ttl: Duration,
    ) -> IdempotencyResult<bool> {
        let now = Instant::now();
        let fresh = CacheEntry {
            record: record.clone(),
            expires_at: now + ttl,
        };

        // Entry holds the shard lock, so check-and-insert is atomic
        let claimed = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    false
                } else {
                    occupied.insert(fresh);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        };
        Ok(claimed)
    }

    async fn evict_expired(&self) -> IdempotencyResult<u64> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}
