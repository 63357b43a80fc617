//! Two-tier read-through cache
//!
//! Lookups try the memory tier, then the persistent tier, then run the
//! caller's producer. Successful producer results populate both tiers;
//! failures propagate and are never cached. The persistent tier is optional
//! and any fault it raises degrades to a miss.

use crate::cache::{
    clock::{add_duration, Clock, SystemClock},
    config::CacheConfig,
    entry::{CacheEntry, PersistentCacheRecord},
    invalidation::{InvalidationEvent, InvalidationReason},
    key::{derive_key, hash_params, rolling_hash, tool_name_of},
    memory::MemoryTier,
    pattern::KeyPattern,
    persistent::{PersistentStore, PersistentTier, RecordFilter},
    ttl::TtlClass,
    types::{CacheKey, CacheStats, CacheTier, CacheValue},
    write_behind::PersistQueue,
};
use crate::error::Result;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the manager needs to store one produced value
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRequest {
    pub key: CacheKey,
    pub tool_name: String,
    pub parameters_hash: String,
    pub tags: Vec<String>,
    pub ttl: Duration,
}

impl CacheRequest {
    /// Request for an entity key such as `project:p1:stats`
    pub fn for_key(key: impl Into<CacheKey>, ttl: Duration) -> Self {
        let key = key.into();
        let tool_name = tool_name_of(&key).to_string();
        let parameters_hash = rolling_hash(&key[tool_name.len()..]);

        Self {
            key,
            tool_name,
            parameters_hash,
            tags: Vec::new(),
            ttl,
        }
    }

    /// Request for a tool result keyed by its canonical parameters
    pub fn for_tool<P: Serialize + ?Sized>(tool_name: &str, params: &P, ttl: Duration) -> Result<Self> {
        Ok(Self {
            key: derive_key(tool_name, params)?,
            tool_name: tool_name.to_string(),
            parameters_hash: hash_params(params)?,
            tags: Vec::new(),
            ttl,
        })
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Builder wiring clock and persistent store into a [`CacheManager`]
pub struct CacheManagerBuilder {
    config: CacheConfig,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn PersistentStore>>,
}

impl CacheManagerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Back the manager with a persistent tier
    pub fn persistent_store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration and build the manager
    ///
    /// With a persistent store in background write mode this must run inside
    /// a tokio runtime, since the write-behind worker is spawned here;
    /// outside of one it returns [`CacheError::ConfigError`](crate::error::CacheError::ConfigError).
    pub fn build(self) -> Result<CacheManager> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let errors = Arc::new(AtomicU64::new(0));

        let persistent = match self.store {
            Some(store) => {
                let tier = PersistentTier::new(store, clock.clone());
                let writer = PersistQueue::new(tier.clone(), self.config.write_mode, errors.clone())?;
                Some((tier, writer))
            }
            None => None,
        };

        info!(
            "Cache manager ready (max_memory_entries: {}, persistent tier: {})",
            self.config.max_memory_entries,
            persistent.is_some()
        );

        Ok(CacheManager {
            memory: MemoryTier::new(clock.clone(), self.config.max_memory_entries),
            persistent,
            pending_deletes: Mutex::new(Vec::new()),
            clock,
            config: self.config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors,
            memory_hits: AtomicU64::new(0),
            persistent_hits: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        })
    }
}

/// Explicit cache instance shared by the dispatcher and data-access services
pub struct CacheManager {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    memory: MemoryTier,
    persistent: Option<(PersistentTier, PersistQueue)>,
    /// Persistent deletes that failed; matching rows are not served until they succeed
    pending_deletes: Mutex<Vec<RecordFilter>>,

    hits: AtomicU64,
    misses: AtomicU64,
    errors: Arc<AtomicU64>,
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheManager {
    /// Memory-only manager on the system clock
    pub fn new(config: CacheConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Self {
            memory: MemoryTier::new(clock.clone(), config.max_memory_entries),
            persistent: None,
            pending_deletes: Mutex::new(Vec::new()),
            clock,
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: Arc::new(AtomicU64::new(0)),
            memory_hits: AtomicU64::new(0),
            persistent_hits: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn builder(config: CacheConfig) -> CacheManagerBuilder {
        CacheManagerBuilder {
            config,
            clock: None,
            store: None,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    pub fn has_persistent_tier(&self) -> bool {
        self.persistent.is_some()
    }

    /// Duration for a TTL class with configured jitter, `None` for [`TtlClass::None`]
    pub fn ttl_for(&self, class: TtlClass) -> Option<Duration> {
        self.config.ttl.duration_with_jitter(class)
    }

    /// Cached value for `key`, if either tier has a live one
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        match self.lookup(key).await {
            Some((value, _)) => Some(value),
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Return the cached value for `key`, or run `producer` and cache its result
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: &str,
        producer: F,
        ttl: Duration,
    ) -> std::result::Result<CacheValue, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<CacheValue, E>>,
    {
        self.get_or_set_request(CacheRequest::for_key(key, ttl), producer)
            .await
    }

    /// [`get_or_set`](Self::get_or_set) with tool metadata and tags for the stored entry
    pub async fn get_or_set_request<F, Fut, E>(
        &self,
        request: CacheRequest,
        producer: F,
    ) -> std::result::Result<CacheValue, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<CacheValue, E>>,
    {
        if let Some((value, _)) = self.lookup(&request.key).await {
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss: {}", request.key);

        // producer errors propagate before anything is stored
        let value = producer().await?;
        self.populate(&request, value.clone()).await;

        Ok(value)
    }

    async fn lookup(&self, key: &str) -> Option<(CacheValue, CacheTier)> {
        if let Some(value) = self.memory.get(key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit (memory): {}", key);
            return Some((value, CacheTier::Memory));
        }

        let (tier, writer) = self.persistent.as_ref()?;
        self.retry_pending_deletes(tier).await;

        match tier.get(key).await {
            Ok(Some(record)) => {
                if self.is_pending_delete(&record).await {
                    debug!("Skipping persistent row awaiting invalidation: {}", key);
                    return None;
                }

                // refill memory with the remaining lifetime, not a fresh TTL
                self.memory.insert(record.to_entry()).await;
                writer.record_hit(key, self.clock.now()).await;

                self.hits.fetch_add(1, Ordering::Relaxed);
                self.persistent_hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit (persistent): {}", key);
                Some((record.result, CacheTier::Persistent))
            }
            Ok(None) => None,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Persistent cache lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn populate(&self, request: &CacheRequest, value: CacheValue) {
        if request.ttl.is_zero() {
            return;
        }

        let now = self.clock.now();
        let expires_at = add_duration(now, request.ttl);

        if let Some((_, writer)) = &self.persistent {
            let record = PersistentCacheRecord::new(
                request.key.clone(),
                request.tool_name.clone(),
                request.parameters_hash.clone(),
                value.clone(),
                expires_at,
                now,
            )
            .with_tags(request.tags.clone());
            writer.put(record).await;
        }

        let entry = CacheEntry::with_expiration(request.key.clone(), value, expires_at)
            .with_tags(request.tags.clone());
        self.memory.insert(entry).await;

        debug!("Cached {} for {:?}", request.key, request.ttl);
    }

    /// Store `value` in both tiers without consulting them first
    pub async fn set(&self, key: impl Into<CacheKey>, value: CacheValue, ttl: Duration) {
        self.populate(&CacheRequest::for_key(key, ttl), value).await;
    }

    /// Values for several keys, in input order
    pub async fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Option<CacheValue>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key.as_ref()).await);
        }
        values
    }

    /// Store several `(key, value, ttl)` entries
    pub async fn set_many<K, I>(&self, entries: I)
    where
        K: Into<CacheKey>,
        I: IntoIterator<Item = (K, CacheValue, Duration)>,
    {
        for (key, value, ttl) in entries {
            self.set(key, value, ttl).await;
        }
    }

    /// Cache `value` while `persist` writes it to the system of record
    ///
    /// Both run concurrently. If `persist` fails the cached copy is removed
    /// again and the error is returned.
    pub async fn write_through<F, Fut, E>(
        &self,
        key: impl Into<CacheKey>,
        value: CacheValue,
        persist: F,
        ttl: Duration,
    ) -> std::result::Result<(), E>
    where
        F: FnOnce(CacheValue) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
    {
        let key = key.into();
        let (_, persisted) = tokio::join!(self.set(key.clone(), value.clone(), ttl), persist(value));

        if persisted.is_err() {
            warn!("Write-through persist failed for {}, dropping cached copy", key);
            self.invalidate_pattern(KeyPattern::new(key)).await;
        }
        persisted
    }

    /// Live memory-tier keys matching `pattern`
    pub async fn keys(&self, pattern: impl Into<KeyPattern>) -> Vec<CacheKey> {
        self.memory.keys(&pattern.into()).await
    }

    /// Remove every entry whose key or tag matches `pattern` from both tiers
    ///
    /// Returns the number of memory entries removed.
    pub async fn invalidate(&self, pattern: impl Into<KeyPattern>) -> usize {
        self.invalidate_pattern(pattern).await.memory_removed
    }

    /// [`invalidate`](Self::invalidate) reporting both tiers
    pub async fn invalidate_pattern(&self, pattern: impl Into<KeyPattern>) -> InvalidationEvent {
        let pattern = pattern.into();
        let memory_removed = self.memory.delete_matching(&pattern).await;

        let persistent_removed = match &self.persistent {
            Some((tier, writer)) => {
                // queued puts must land before the delete or they would resurrect entries
                writer.flush().await;
                self.delete_persistent(tier, RecordFilter::Pattern(pattern.clone()), "invalidate")
                    .await
            }
            None => 0,
        };

        let event = InvalidationEvent::new(
            InvalidationReason::Pattern {
                pattern: pattern.to_string(),
            },
            memory_removed,
            persistent_removed,
        );
        self.record_invalidation(&event);
        event
    }

    /// Remove every result of one tool from both tiers
    pub async fn invalidate_tool(&self, tool_name: &str) -> InvalidationEvent {
        // keys only, matching the persistent tool_name column
        let pattern = KeyPattern::new(format!("{}:*", tool_name));
        let memory_removed = self.memory.delete_matching_keys(&pattern).await;

        let persistent_removed = match &self.persistent {
            Some((tier, writer)) => {
                writer.flush().await;
                self.delete_persistent(tier, RecordFilter::Tool(tool_name.to_string()), "invalidate_tool")
                    .await
            }
            None => 0,
        };

        let event = InvalidationEvent::new(
            InvalidationReason::Tool {
                tool_name: tool_name.to_string(),
            },
            memory_removed,
            persistent_removed,
        );
        self.record_invalidation(&event);
        event
    }

    /// Drop expired entries from both tiers
    pub async fn sweep(&self) -> InvalidationEvent {
        let memory_removed = self.memory.sweep().await.len();

        let persistent_removed = match &self.persistent {
            Some((tier, _)) => {
                self.retry_pending_deletes(tier).await;
                self.recover(tier.delete_expired().await, "sweep")
            }
            None => 0,
        };

        if memory_removed + persistent_removed > 0 {
            debug!(
                "Swept {} memory / {} persistent expired entries",
                memory_removed, persistent_removed
            );
        }

        InvalidationEvent::new(InvalidationReason::Expired, memory_removed, persistent_removed)
    }

    /// Empty both tiers
    pub async fn clear(&self) -> InvalidationEvent {
        let memory_removed = self.memory.clear().await;

        let persistent_removed = match &self.persistent {
            Some((tier, writer)) => {
                writer.flush().await;
                self.delete_persistent(tier, RecordFilter::All, "clear").await
            }
            None => 0,
        };

        let event = InvalidationEvent::new(InvalidationReason::Cleared, memory_removed, persistent_removed);
        self.record_invalidation(&event);
        event
    }

    /// Wait for queued persistent writes to be applied
    pub async fn flush(&self) {
        if let Some((_, writer)) = &self.persistent {
            writer.flush().await;
        }
    }

    /// Snapshot of the counters
    pub async fn get_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.persistent_hits.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.memory.len().await,
        }
    }

    /// Failed invalidations still waiting to reach the persistent tier
    pub async fn pending_invalidations(&self) -> usize {
        self.pending_deletes.lock().await.len()
    }

    async fn delete_persistent(&self, tier: &PersistentTier, filter: RecordFilter, operation: &str) -> usize {
        match tier.delete_where(filter.clone()).await {
            Ok(removed) => removed,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Persistent cache {} failed, will retry: {}", operation, e);
                self.pending_deletes.lock().await.push(filter);
                0
            }
        }
    }

    async fn retry_pending_deletes(&self, tier: &PersistentTier) {
        let mut pending = self.pending_deletes.lock().await;
        if pending.is_empty() {
            return;
        }

        let mut failed = Vec::new();
        for filter in pending.drain(..) {
            match tier.delete_where(filter.clone()).await {
                Ok(removed) => info!("Applied deferred invalidation {:?} ({} rows)", filter, removed),
                Err(e) => {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    debug!("Deferred invalidation {:?} still failing: {}", filter, e);
                    failed.push(filter);
                }
            }
        }
        *pending = failed;
    }

    async fn is_pending_delete(&self, record: &PersistentCacheRecord) -> bool {
        self.pending_deletes
            .lock()
            .await
            .iter()
            .any(|filter| filter.matches(record))
    }

    fn recover(&self, result: Result<usize>, operation: &str) -> usize {
        match result {
            Ok(removed) => removed,
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!("Persistent cache {} failed: {}", operation, e);
                0
            }
        }
    }

    fn record_invalidation(&self, event: &InvalidationEvent) {
        let removed = event.total_removed();
        self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            info!("Invalidated {} cache entries ({})", removed, event.reason);
        }
    }
}

/// Spawn the periodic sweep task
///
/// Returns `None` when auto sweep is disabled. The task holds a weak
/// reference and stops once the manager is dropped.
pub fn start_auto_sweep(cache: &Arc<CacheManager>) -> Option<JoinHandle<()>> {
    if !cache.config.enable_auto_sweep {
        return None;
    }

    let interval = cache.config.sweep_interval;
    let weak: Weak<CacheManager> = Arc::downgrade(cache);

    info!("Starting automatic cache sweep task (interval: {:?})", interval);

    Some(tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = weak.upgrade() else {
                debug!("Cache manager dropped, stopping sweep task");
                break;
            };

            let event = cache.sweep().await;
            if event.total_removed() > 0 {
                debug!("Auto sweep removed {} entries", event.total_removed());
            }
        }
    }))
}
