//! # Two-Tier Query Result Cache
//!
//! Read-through caching for tool results and data-access queries.
//!
//! ## Features
//!
//! - **Deterministic Keys**: `"<tool>:<canonicalJSON>"` with recursively sorted parameters
//! - **Memory Tier**: process-local map with passive expiry and LRU capacity limit
//! - **Persistent Tier**: pluggable row store shared across processes, faults degrade to misses
//! - **TTL Classes**: short / medium / long durations chosen per operation
//! - **Pattern Invalidation**: `*` globs over keys and entry tags, both tiers at once
//! - **Domain Triggers**: writes mapped to the key patterns they make stale
//!
//! ## Example
//!
//! ```rust
//! use tool_cache::cache::{CacheConfig, CacheManager};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = CacheManager::new(CacheConfig::testing());
//!
//! let stats = cache
//!     .get_or_set(
//!         "project:p1:stats",
//!         || async { Ok::<_, anyhow::Error>(json!({"staff": 4})) },
//!         Duration::from_secs(180),
//!     )
//!     .await?;
//! assert_eq!(stats["staff"], 4);
//!
//! cache.invalidate("project:p1:*").await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod entry;
pub mod invalidation;
pub mod key;
pub mod manager;
pub mod memory;
pub mod pattern;
pub mod persistent;
pub mod ttl;
pub mod types;
pub mod write_behind;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, PersistentCacheRecord};
pub use invalidation::{CacheInvalidator, DomainMutation, InvalidationEvent, InvalidationReason};
pub use key::{derive_key, hash_params, KeyBuilder};
pub use manager::{start_auto_sweep, CacheManager, CacheManagerBuilder, CacheRequest};
pub use memory::MemoryTier;
pub use pattern::KeyPattern;
pub use persistent::{InMemoryStore, PersistentStore, PersistentTier, RecordFilter};
pub use ttl::{TtlClass, TtlPolicy};
pub use types::{CacheKey, CacheStats, CacheTier, CacheValue};
pub use write_behind::WriteMode;
