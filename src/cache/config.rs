//! Configuration for the cache system

use crate::cache::{ttl::TtlPolicy, write_behind::WriteMode};
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Configuration for the two-tier cache
///
/// Defaults:
/// - TTL classes: short 1 min, medium 3 min, long 1 hour
/// - Sweep every minute
/// - Persistent writes queued in the background
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries held by the memory tier
    pub max_memory_entries: usize,

    /// Durations for each TTL class
    pub ttl: TtlPolicy,

    /// How persistent-tier writes are issued
    pub write_mode: WriteMode,

    /// Run the periodic sweep task
    pub enable_auto_sweep: bool,

    /// Interval between sweeps
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_entries: 10_000,
            ttl: TtlPolicy::default(),
            write_mode: WriteMode::Background,
            enable_auto_sweep: true,
            // Sweep every minute
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_memory_entries == 0 {
            return Err(CacheError::ConfigError(
                "max_memory_entries must be greater than 0".to_string(),
            ));
        }

        if self.enable_auto_sweep && self.sweep_interval.is_zero() {
            return Err(CacheError::ConfigError(
                "sweep_interval must be greater than 0 when auto sweep is enabled".to_string(),
            ));
        }

        self.ttl.validate().map_err(CacheError::ConfigError)
    }

    /// Load configuration from `TOOL_CACHE_*` environment variables (and `.env`)
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `TOOL_CACHE_MAX_ENTRIES` | memory tier capacity |
    /// | `TOOL_CACHE_TTL_SHORT_SECS` / `_MEDIUM_SECS` / `_LONG_SECS` | TTL classes |
    /// | `TOOL_CACHE_TTL_JITTER` | jitter fraction |
    /// | `TOOL_CACHE_WRITE_MODE` | `inline` or `background` |
    /// | `TOOL_CACHE_AUTO_SWEEP` | `true` / `false` |
    /// | `TOOL_CACHE_SWEEP_INTERVAL_SECS` | sweep interval |
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(n) = parse_var::<usize, _>(&lookup, "TOOL_CACHE_MAX_ENTRIES") {
            builder = builder.max_memory_entries(n);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "TOOL_CACHE_TTL_SHORT_SECS") {
            builder = builder.short_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "TOOL_CACHE_TTL_MEDIUM_SECS") {
            builder = builder.medium_ttl(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "TOOL_CACHE_TTL_LONG_SECS") {
            builder = builder.long_ttl(Duration::from_secs(secs));
        }
        if let Some(jitter) = parse_var::<f64, _>(&lookup, "TOOL_CACHE_TTL_JITTER") {
            builder = builder.ttl_jitter(jitter);
        }
        if let Some(raw) = lookup("TOOL_CACHE_WRITE_MODE") {
            match raw.parse::<WriteMode>() {
                Ok(mode) => builder = builder.write_mode(mode),
                Err(e) => warn!("invalid TOOL_CACHE_WRITE_MODE: {}; using default", e),
            }
        }
        if let Some(enable) = parse_var::<bool, _>(&lookup, "TOOL_CACHE_AUTO_SWEEP") {
            builder = builder.enable_auto_sweep(enable);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "TOOL_CACHE_SWEEP_INTERVAL_SECS") {
            builder = builder.sweep_interval(Duration::from_secs(secs));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("invalid {} '{}'; using default", name, raw);
            None
        }
    }
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    max_memory_entries: Option<usize>,
    short_ttl: Option<Duration>,
    medium_ttl: Option<Duration>,
    long_ttl: Option<Duration>,
    ttl_jitter: Option<f64>,
    write_mode: Option<WriteMode>,
    enable_auto_sweep: Option<bool>,
    sweep_interval: Option<Duration>,
}

impl CacheConfigBuilder {
    /// Set memory tier capacity
    pub fn max_memory_entries(mut self, max: usize) -> Self {
        self.max_memory_entries = Some(max);
        self
    }

    pub fn short_ttl(mut self, ttl: Duration) -> Self {
        self.short_ttl = Some(ttl);
        self
    }

    pub fn medium_ttl(mut self, ttl: Duration) -> Self {
        self.medium_ttl = Some(ttl);
        self
    }

    pub fn long_ttl(mut self, ttl: Duration) -> Self {
        self.long_ttl = Some(ttl);
        self
    }

    /// Set TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = Some(mode);
        self
    }

    /// Enable or disable the periodic sweep
    pub fn enable_auto_sweep(mut self, enable: bool) -> Self {
        self.enable_auto_sweep = Some(enable);
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            max_memory_entries: self.max_memory_entries.unwrap_or(defaults.max_memory_entries),
            ttl: TtlPolicy {
                short: self.short_ttl.unwrap_or(defaults.ttl.short),
                medium: self.medium_ttl.unwrap_or(defaults.ttl.medium),
                long: self.long_ttl.unwrap_or(defaults.ttl.long),
                jitter: self.ttl_jitter.unwrap_or(defaults.ttl.jitter),
            },
            write_mode: self.write_mode.unwrap_or(defaults.write_mode),
            enable_auto_sweep: self.enable_auto_sweep.unwrap_or(defaults.enable_auto_sweep),
            sweep_interval: self.sweep_interval.unwrap_or(defaults.sweep_interval),
        }
    }
}

/// Preset configurations for common use cases
impl CacheConfig {
    /// Dashboards over rapidly changing data
    pub fn realtime() -> Self {
        Self {
            ttl: TtlPolicy {
                short: Duration::from_secs(30),
                medium: Duration::from_secs(60),
                long: Duration::from_secs(600),
                jitter: 0.10,
            },
            sweep_interval: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Memory-constrained environments
    pub fn small() -> Self {
        Self {
            max_memory_entries: 500,
            ..Default::default()
        }
    }

    /// Deterministic settings for tests: inline writes, no jitter, no sweeper
    pub fn testing() -> Self {
        Self {
            write_mode: WriteMode::Inline,
            enable_auto_sweep: false,
            ..Default::default()
        }
    }
}
