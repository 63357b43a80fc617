//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type: `"<toolName>:<canonicalParamsJSON>"` or a colon-separated entity key
pub type CacheKey = String;

/// Cache value type: an opaque JSON payload produced by a tool or data-access call
pub type CacheValue = serde_json::Value;

/// Statistics for cache performance monitoring
///
/// Counters are monotonic for the lifetime of the owning [`CacheManager`](crate::cache::CacheManager).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheStats {
    /// Total number of cache hits (either tier)
    pub hits: u64,

    /// Total number of cache misses (producer executed)
    pub misses: u64,

    /// Persistent tier faults recovered as misses or dropped writes
    pub errors: u64,

    /// Hits served by the memory tier
    pub memory_hits: u64,

    /// Hits served by the persistent tier
    pub persistent_hits: u64,

    /// Number of entries removed by invalidation calls
    pub invalidations: u64,

    /// Number of entries currently in the memory tier
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from cache, `0.0` before any lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total number of lookups
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, errors: {}, hit_rate: {:.2}%, entries: {} }}",
            self.hits,
            self.misses,
            self.errors,
            self.hit_rate() * 100.0,
            self.entries
        )
    }
}

/// Tier that answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    /// Process-local map
    Memory,

    /// External row store
    Persistent,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::Memory => write!(f, "memory"),
            CacheTier::Persistent => write!(f, "persistent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 0.8);
        assert_eq!(stats.requests(), 100);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            errors: 2,
            entries: 4,
            ..Default::default()
        };

        let display = format!("{}", stats);
        assert!(display.contains("hits: 3"));
        assert!(display.contains("misses: 1"));
        assert!(display.contains("hit_rate: 75.00%"));
    }

    #[test]
    fn test_cache_tier_display() {
        assert_eq!(format!("{}", CacheTier::Memory), "memory");
        assert_eq!(format!("{}", CacheTier::Persistent), "persistent");
    }
}
