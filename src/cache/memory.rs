//! Process-local cache tier with passive expiry and LRU capacity limit

use crate::cache::{
    clock::Clock,
    entry::CacheEntry,
    pattern::KeyPattern,
    types::{CacheKey, CacheValue},
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// In-process key → entry map
///
/// This implementation provides:
/// - Thread-safe async access via RwLock
/// - Passive expiry on read plus [`sweep`](Self::sweep)
/// - LRU eviction once `max_entries` is reached
pub struct MemoryTier {
    store: RwLock<MemoryStore>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

/// Internal storage
struct MemoryStore {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry>,

    /// LRU tracking: front is least recently used
    lru_queue: VecDeque<CacheKey>,

    /// Entries dropped to stay under `max_entries`
    evictions: u64,
}

impl MemoryStore {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.lru_queue.iter().position(|k| k == key) {
            if let Some(k) = self.lru_queue.remove(pos) {
                self.lru_queue.push_back(k);
            }
        }
    }

    fn remove_where<F>(&mut self, predicate: F) -> Vec<CacheKey>
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let keys: Vec<CacheKey> = self
            .entries
            .values()
            .filter(|entry| predicate(entry))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &keys {
            self.entries.remove(key);
        }
        if !keys.is_empty() {
            self.lru_queue.retain(|k| self.entries.contains_key(k));
        }
        keys
    }
}

impl MemoryTier {
    pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        Self {
            store: RwLock::new(MemoryStore {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                evictions: 0,
            }),
            clock,
            max_entries: max_entries.max(1),
        }
    }

    /// Live value for `key`; an expired entry is removed and reported absent
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        let now = self.clock.now();
        let mut store = self.store.write().await;

        let expired = match store.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return None,
        };

        if expired {
            debug!("Memory entry expired: {}", key);
            store.remove(key);
            return None;
        }

        store.touch(key);
        store.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Store `value` for `ttl`
    pub async fn set(&self, key: CacheKey, value: CacheValue, ttl: Duration) {
        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        self.insert(entry).await;
    }

    /// Store a fully built entry, replacing any previous one
    pub async fn insert(&self, entry: CacheEntry) {
        if entry.is_expired(self.clock.now()) {
            return;
        }

        let mut store = self.store.write().await;
        let key = entry.key.clone();

        if store.entries.insert(key.clone(), entry).is_some() {
            store.touch(&key);
            return;
        }
        store.lru_queue.push_back(key);

        while store.entries.len() > self.max_entries {
            match store.lru_queue.pop_front() {
                Some(oldest) => {
                    debug!("Evicting memory entry due to max_entries limit: {}", oldest);
                    store.entries.remove(&oldest);
                    store.evictions += 1;
                }
                None => break,
            }
        }
    }

    /// Remove a single key
    pub async fn delete(&self, key: &str) -> bool {
        self.store.write().await.remove(key).is_some()
    }

    /// Remove every entry whose key or tag matches `pattern`
    pub async fn delete_matching(&self, pattern: &KeyPattern) -> usize {
        let mut store = self.store.write().await;
        let removed = store.remove_where(|entry| pattern.matches_entry(&entry.key, &entry.tags));
        debug!("Removed {} memory entries matching {}", removed.len(), pattern);
        removed.len()
    }

    /// Remove every entry whose key matches `pattern`; tags are ignored
    pub async fn delete_matching_keys(&self, pattern: &KeyPattern) -> usize {
        let mut store = self.store.write().await;
        store.remove_where(|entry| pattern.matches(&entry.key)).len()
    }

    /// Live keys matching `pattern`, sorted
    pub async fn keys(&self, pattern: &KeyPattern) -> Vec<CacheKey> {
        let now = self.clock.now();
        let store = self.store.read().await;
        let mut keys: Vec<CacheKey> = store
            .entries
            .values()
            .filter(|entry| !entry.is_expired(now) && pattern.matches(&entry.key))
            .map(|entry| entry.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remove all expired entries, returning their keys
    pub async fn sweep(&self) -> Vec<CacheKey> {
        let now = self.clock.now();
        let mut store = self.store.write().await;
        let removed = store.remove_where(|entry| entry.is_expired(now));

        if !removed.is_empty() {
            debug!("Swept {} expired memory entries", removed.len());
        }
        removed
    }

    /// Remove everything
    pub async fn clear(&self) -> usize {
        let mut store = self.store.write().await;
        let count = store.entries.len();
        store.entries.clear();
        store.lru_queue.clear();
        info!("Cleared {} entries from memory tier", count);
        count
    }

    /// Number of stored entries (expired ones included until swept)
    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    /// Check for a key without touching LRU order or expiry
    pub async fn contains_key(&self, key: &str) -> bool {
        self.store.read().await.entries.contains_key(key)
    }

    /// Entries dropped by the capacity limit so far
    pub async fn evictions(&self) -> u64 {
        self.store.read().await.evictions
    }
}
