//! Persistent cache tier
//!
//! The tier itself owns no storage engine. It talks to an external row store
//! through [`PersistentStore`], a get/put/delete interface that any backend
//! (a SQL table, a key-value service) can implement. [`InMemoryStore`] is the
//! in-process reference backend used by tests and demos.

use crate::cache::{
    clock::Clock,
    entry::PersistentCacheRecord,
    pattern::KeyPattern,
};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Row selector for deletions
#[derive(Debug, Clone, PartialEq)]
pub enum RecordFilter {
    /// Exactly one cache key
    Key(String),
    /// Every row owned by a tool
    Tool(String),
    /// Rows whose key or tags match a glob pattern
    Pattern(KeyPattern),
    /// Rows with `expires_at <= at`
    ExpiredAt(DateTime<Utc>),
    /// Every row
    All,
}

impl RecordFilter {
    pub fn matches(&self, record: &PersistentCacheRecord) -> bool {
        match self {
            RecordFilter::Key(key) => &record.cache_key == key,
            RecordFilter::Tool(tool) => &record.tool_name == tool,
            RecordFilter::Pattern(pattern) => pattern.matches_entry(&record.cache_key, &record.tags),
            RecordFilter::ExpiredAt(at) => !record.is_live(*at),
            RecordFilter::All => true,
        }
    }
}

/// External row store backing the persistent tier
///
/// Implementations rely on the backend's own concurrency control; `upsert`
/// must be atomic per `cache_key`.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Row for `key` only if `expires_at > now`; the filter belongs to the store
    async fn fetch(&self, key: &str, now: DateTime<Utc>) -> Result<Option<PersistentCacheRecord>>;

    /// Insert or replace the row keyed by `record.cache_key`
    async fn upsert(&self, record: PersistentCacheRecord) -> Result<()>;

    /// Delete matching rows, returning how many were removed
    async fn delete_where(&self, filter: RecordFilter) -> Result<usize>;

    /// Bump hit count and last access time; missing rows are ignored
    async fn touch(&self, key: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Client over a [`PersistentStore`] exposing the tier operations
#[derive(Clone)]
pub struct PersistentTier {
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn Clock>,
}

impl PersistentTier {
    pub fn new(store: Arc<dyn PersistentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Live record for `key`
    pub async fn get(&self, key: &str) -> Result<Option<PersistentCacheRecord>> {
        self.store.fetch(key, self.clock.now()).await
    }

    /// Upsert; repopulation resets access metadata
    pub async fn put(&self, mut record: PersistentCacheRecord) -> Result<()> {
        record.hit_count = 1;
        record.last_accessed_at = self.clock.now();
        self.store.upsert(record).await
    }

    /// Delete the rows selected by `filter`
    pub async fn delete_where(&self, filter: RecordFilter) -> Result<usize> {
        self.store.delete_where(filter).await
    }

    pub async fn delete_by_tool(&self, tool_name: &str) -> Result<usize> {
        self.store.delete_where(RecordFilter::Tool(tool_name.to_string())).await
    }

    pub async fn delete_matching(&self, pattern: &KeyPattern) -> Result<usize> {
        // exact patterns still go through Pattern so tagged rows are covered too
        self.store
            .delete_where(RecordFilter::Pattern(pattern.clone()))
            .await
    }

    pub async fn delete_expired(&self) -> Result<usize> {
        self.store.delete_where(RecordFilter::ExpiredAt(self.clock.now())).await
    }

    pub async fn increment_hit(&self, key: &str) -> Result<()> {
        self.increment_hit_at(key, self.clock.now()).await
    }

    pub(crate) async fn increment_hit_at(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.store.touch(key, at).await
    }

    pub async fn clear(&self) -> Result<usize> {
        self.store.delete_where(RecordFilter::All).await
    }
}

/// Row map behind a mutex, with a switch to simulate outages
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<HashMap<String, PersistentCacheRecord>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`CacheError::StoreUnavailable`]
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Raw row, ignoring expiry (inspection helper)
    pub fn row(&self, key: &str) -> Option<PersistentCacheRecord> {
        self.lock_rows().ok()?.get(key).cloned()
    }

    /// Number of stored rows, expired ones included
    pub fn row_count(&self) -> usize {
        self.lock_rows().map(|rows| rows.len()).unwrap_or(0)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(CacheError::StoreUnavailable(
                "in-memory store switched off".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn lock_rows(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, PersistentCacheRecord>>> {
        self.rows
            .lock()
            .map_err(|_| CacheError::StoreError("row lock poisoned".to_string()))
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn fetch(&self, key: &str, now: DateTime<Utc>) -> Result<Option<PersistentCacheRecord>> {
        self.check_available()?;
        let rows = self.lock_rows()?;
        Ok(rows.get(key).filter(|record| record.is_live(now)).cloned())
    }

    async fn upsert(&self, record: PersistentCacheRecord) -> Result<()> {
        self.check_available()?;
        let mut rows = self.lock_rows()?;
        rows.insert(record.cache_key.clone(), record);
        Ok(())
    }

    async fn delete_where(&self, filter: RecordFilter) -> Result<usize> {
        self.check_available()?;
        let mut rows = self.lock_rows()?;
        let before = rows.len();
        rows.retain(|_, record| !filter.matches(record));
        let removed = before - rows.len();
        debug!("Deleted {} persistent rows ({:?})", removed, filter);
        Ok(removed)
    }

    async fn touch(&self, key: &str, at: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        let mut rows = self.lock_rows()?;
        if let Some(record) = rows.get_mut(key) {
            record.mark_accessed(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use serde_json::json;
    use std::time::Duration;

    fn record(key: &str, tool: &str, clock: &ManualClock, ttl_secs: i64) -> PersistentCacheRecord {
        let now = clock.now();
        PersistentCacheRecord::new(
            key.to_string(),
            tool,
            "h",
            json!({"key": key}),
            now + chrono::Duration::seconds(ttl_secs),
            now,
        )
    }

    fn tier() -> (PersistentTier, Arc<InMemoryStore>, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = Arc::new(InMemoryStore::new());
        let tier = PersistentTier::new(store.clone(), Arc::new(clock.clone()));
        (tier, store, clock)
    }

    #[tokio::test]
    async fn test_get_filters_expired_rows_at_store() {
        let (tier, store, clock) = tier();
        tier.put(record("k1", "get_projects", &clock, 10)).await.unwrap();

        assert!(tier.get("k1").await.unwrap().is_some());

        clock.advance(Duration::from_secs(10));
        assert!(tier.get("k1").await.unwrap().is_none());
        // not swept yet, but never served
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_put_resets_access_metadata() {
        let (tier, store, clock) = tier();
        tier.put(record("k1", "get_projects", &clock, 60)).await.unwrap();
        tier.increment_hit("k1").await.unwrap();
        tier.increment_hit("k1").await.unwrap();
        assert_eq!(store.row("k1").unwrap().hit_count, 3);

        clock.advance(Duration::from_secs(5));
        tier.put(record("k1", "get_projects", &clock, 60)).await.unwrap();

        let row = store.row("k1").unwrap();
        assert_eq!(row.hit_count, 1);
        assert_eq!(row.last_accessed_at, clock.now());
    }

    #[tokio::test]
    async fn test_delete_by_tool_and_pattern() {
        let (tier, store, clock) = tier();
        tier.put(record("get_projects:{}", "get_projects", &clock, 60)).await.unwrap();
        tier.put(record(r#"get_projects:{"status":"active"}"#, "get_projects", &clock, 60)).await.unwrap();
        tier.put(record("projects:list:all", "projects", &clock, 60)).await.unwrap();
        tier.put(record("project:p1:stats", "project", &clock, 60)).await.unwrap();

        assert_eq!(tier.delete_by_tool("get_projects").await.unwrap(), 2);
        assert_eq!(tier.delete_matching(&KeyPattern::new("projects:list:*")).await.unwrap(), 1);
        assert_eq!(store.row_count(), 1);
        assert!(store.row("project:p1:stats").is_some());
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let (tier, store, clock) = tier();
        tier.put(record("short", "t", &clock, 1)).await.unwrap();
        tier.put(record("long", "t", &clock, 600)).await.unwrap();

        clock.advance(Duration::from_secs(2));
        assert_eq!(tier.delete_expired().await.unwrap(), 1);
        assert_eq!(store.row_count(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let (tier, store, clock) = tier();
        store.set_available(false);

        let err = tier.put(record("k", "t", &clock, 60)).await.unwrap_err();
        assert!(err.is_tier_error());
        assert!(tier.get("k").await.is_err());

        store.set_available(true);
        assert!(tier.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_missing_row_is_noop() {
        let (tier, store, _clock) = tier();
        tier.increment_hit("nope").await.unwrap();
        assert_eq!(store.row_count(), 0);
    }
}
