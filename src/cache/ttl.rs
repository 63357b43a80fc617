//! TTL classes and their concrete durations

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Named expiry category assigned per tool or operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlClass {
    /// Time-sensitive lookups (upcoming deadlines, availability)
    Short,
    /// Default for uncategorized reads
    Medium,
    /// Aggregates and statistics
    Long,
    /// Never cached
    None,
}

impl TtlClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtlClass::Short => "short",
            TtlClass::Medium => "medium",
            TtlClass::Long => "long",
            TtlClass::None => "none",
        }
    }

}

impl FromStr for TtlClass {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "short" => Ok(TtlClass::Short),
            "medium" | "default" => Ok(TtlClass::Medium),
            "long" => Ok(TtlClass::Long),
            "none" => Ok(TtlClass::None),
            _ => Err(CacheError::ConfigError(format!("unknown TTL class '{}'", s))),
        }
    }
}

impl fmt::Display for TtlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping from [`TtlClass`] to durations, with optional jitter
///
/// Jitter spreads expiries of entries populated together so they do not all
/// miss at the same instant. It is a fraction of the base TTL (0.0 - 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtlPolicy {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
    pub jitter: f64,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            // 1 minute for time-sensitive data
            short: Duration::from_secs(60),
            // 3 minutes for ordinary lists
            medium: Duration::from_secs(180),
            // 1 hour for statistics
            long: Duration::from_secs(3600),
            jitter: 0.0,
        }
    }
}

impl TtlPolicy {
    /// Base duration for a class, `None` for [`TtlClass::None`]
    pub fn duration(&self, class: TtlClass) -> Option<Duration> {
        match class {
            TtlClass::Short => Some(self.short),
            TtlClass::Medium => Some(self.medium),
            TtlClass::Long => Some(self.long),
            TtlClass::None => None,
        }
    }

    /// Duration for a class with jitter applied
    pub fn duration_with_jitter(&self, class: TtlClass) -> Option<Duration> {
        self.duration(class).map(|base| apply_jitter(base, self.jitter))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.short.is_zero() || self.medium.is_zero() || self.long.is_zero() {
            return Err("ttl durations must be greater than 0".to_string());
        }

        if self.short > self.medium || self.medium > self.long {
            return Err("ttl durations must satisfy short <= medium <= long".to_string());
        }

        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("ttl jitter must be between 0.0 and 1.0".to_string());
        }

        Ok(())
    }
}

/// Randomly vary `base` by up to `jitter * base` in either direction
pub fn apply_jitter(base: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return base;
    }

    let base_secs = base.as_secs_f64();
    let jitter_range = base_secs * jitter;
    let offset = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
    let final_secs = (base_secs + offset).max(1.0);

    Duration::from_secs_f64(final_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.duration(TtlClass::Short), Some(Duration::from_secs(60)));
        assert_eq!(policy.duration(TtlClass::Medium), Some(Duration::from_secs(180)));
        assert_eq!(policy.duration(TtlClass::Long), Some(Duration::from_secs(3600)));
        assert_eq!(policy.duration(TtlClass::None), None);
    }

    #[test]
    fn test_validate() {
        assert!(TtlPolicy::default().validate().is_ok());

        let inverted = TtlPolicy {
            short: Duration::from_secs(600),
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let bad_jitter = TtlPolicy {
            jitter: 1.5,
            ..Default::default()
        };
        assert!(bad_jitter.validate().is_err());
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_secs(3600);
        let ttl = apply_jitter(base, 0.1);

        assert!(ttl.as_secs_f64() >= 3600.0 - 360.0);
        assert!(ttl.as_secs_f64() <= 3600.0 + 360.0);
        assert_eq!(apply_jitter(base, 0.0), base);
    }

    #[test]
    fn test_class_parsing() {
        assert_eq!("LONG".parse::<TtlClass>().unwrap(), TtlClass::Long);
        assert_eq!("default".parse::<TtlClass>().unwrap(), TtlClass::Medium);
        assert!(matches!(
            "forever".parse::<TtlClass>(),
            Err(CacheError::ConfigError(_))
        ));
        assert_eq!(TtlClass::Short.to_string(), "short");
    }
}
