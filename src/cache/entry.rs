//! Cache entries held by the memory tier and records held by the persistent tier

use crate::cache::clock::{add_duration, remaining};
use crate::cache::types::{CacheKey, CacheValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A memory-tier entry with absolute expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key
    pub key: CacheKey,

    /// The cached value
    pub value: CacheValue,

    /// When the entry stops being served
    pub expires_at: DateTime<Utc>,

    /// Secondary names used by pattern invalidation (e.g. `project:p1:get_project_stats`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl CacheEntry {
    /// Create an entry expiring `ttl` after `now`
    pub fn new(key: CacheKey, value: CacheValue, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self::with_expiration(key, value, add_duration(now, ttl))
    }

    /// Create an entry with a fixed expiration time
    pub fn with_expiration(key: CacheKey, value: CacheValue, expires_at: DateTime<Utc>) -> Self {
        Self {
            key,
            value,
            expires_at,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        for tag in tags {
            self.add_tag(tag);
        }
        self
    }

    /// Expired once `now` reaches `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self, now: DateTime<Utc>) -> Option<Duration> {
        remaining(now, self.expires_at)
    }

    /// Add a tag to the entry for pattern invalidation
    pub fn add_tag(&mut self, tag: String) {
        if !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
    }

    /// Check if entry has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A persistent-tier row
///
/// Logical schema: `cache_key (unique), tool_name, parameters_hash, result,
/// expires_at, last_accessed_at, hit_count`, plus the entry tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentCacheRecord {
    pub cache_key: CacheKey,
    pub tool_name: String,
    pub parameters_hash: String,
    pub result: CacheValue,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub hit_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl PersistentCacheRecord {
    /// Fresh record as written on population; access metadata starts over
    pub fn new(
        cache_key: CacheKey,
        tool_name: impl Into<String>,
        parameters_hash: impl Into<String>,
        result: CacheValue,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            cache_key,
            tool_name: tool_name.into(),
            parameters_hash: parameters_hash.into(),
            result,
            expires_at,
            last_accessed_at: now,
            hit_count: 1,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Live rows have `expires_at > now`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Record a persistent-tier hit
    pub fn mark_accessed(&mut self, at: DateTime<Utc>) {
        self.hit_count = self.hit_count.saturating_add(1);
        self.last_accessed_at = at;
    }

    /// Memory-tier copy of this record
    pub fn to_entry(&self) -> CacheEntry {
        CacheEntry::with_expiration(self.cache_key.clone(), self.result.clone(), self.expires_at)
            .with_tags(self.tags.clone())
    }
}
